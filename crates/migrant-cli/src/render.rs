use std::io::IsTerminal;
use std::time::{Duration, Instant};

use anstyle::{AnsiColor, Effects, Style};
use indicatif::{HumanCount, ProgressBar, ProgressStyle};
use migrant_core::{AppInfo, CatalogPackage, EntryStatus, OutdatedPackage};
use migrant_installer::{WorkerEvent, WorkerStats};
use migrant_inventory::ScanReport;
use migrant_plan::MigrationPlan;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

#[derive(Copy, Clone, Debug)]
pub(crate) struct TerminalRenderer {
    style: OutputStyle,
}

pub(crate) struct TerminalProgress {
    style: OutputStyle,
    label: String,
    total: u64,
    current: u64,
    progress_bar: Option<ProgressBar>,
    started_at: Instant,
}

impl TerminalRenderer {
    pub(crate) fn from_style(style: OutputStyle) -> Self {
        Self { style }
    }

    pub(crate) fn current() -> Self {
        Self::from_style(current_output_style())
    }

    pub(crate) fn style(self) -> OutputStyle {
        self.style
    }

    pub(crate) fn print_status(self, status: &str, message: &str) {
        println!("{}", render_status_line(self.style, status, message));
    }

    pub(crate) fn print_section(self, title: &str) {
        if self.style == OutputStyle::Rich {
            println!();
            println!("{}", colorize(section_style(), &format!("== {title} ==")));
        }
    }

    pub(crate) fn print_lines(self, lines: &[String]) {
        for line in lines {
            println!("{line}");
        }
    }

    pub(crate) fn start_progress(self, label: &str, total: u64) -> TerminalProgress {
        let progress_bar = if self.style == OutputStyle::Rich {
            let progress_bar = ProgressBar::new(total.max(1));
            let template = concat!(
                "{spinner:.cyan.bold} {msg:<12} [{bar:20.cyan/blue}] ",
                "{pos:>3}/{len:3} {elapsed_precise}"
            );
            if let Ok(style) = ProgressStyle::with_template(template) {
                progress_bar.set_style(style.tick_chars(".oO@* ").progress_chars("=>-"));
            }
            progress_bar.set_message(label.to_string());
            progress_bar.enable_steady_tick(Duration::from_millis(80));
            Some(progress_bar)
        } else {
            None
        };

        TerminalProgress {
            style: self.style,
            label: label.to_string(),
            total,
            current: 0,
            progress_bar,
            started_at: Instant::now(),
        }
    }
}

impl TerminalProgress {
    pub(crate) fn set(&mut self, current: u64) {
        self.current = current.min(self.total);

        let Some(progress_bar) = &self.progress_bar else {
            return;
        };
        let safe_total = self.total.max(1);
        progress_bar.set_length(safe_total);
        progress_bar.set_position(self.current.min(safe_total));
    }

    /// Prints above the bar so status lines do not tear it.
    pub(crate) fn println(&self, line: &str) {
        match &self.progress_bar {
            Some(progress_bar) => progress_bar.println(line),
            None => println!("{line}"),
        }
    }

    pub(crate) fn finish_success(mut self) {
        let Some(progress_bar) = self.progress_bar.take() else {
            return;
        };

        progress_bar.finish_and_clear();
        if let Some(line) = render_progress_line(
            self.style,
            &self.label,
            self.current,
            self.total,
            Some(self.started_at.elapsed()),
        ) {
            println!("{line}");
        }
    }

    pub(crate) fn finish_abandon(mut self) {
        if let Some(progress_bar) = self.progress_bar.take() {
            progress_bar.finish_and_clear();
        }
    }
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool, _stderr_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(
        std::io::stdout().is_terminal(),
        std::io::stderr().is_terminal(),
    )
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    if style == OutputStyle::Plain {
        return message.to_string();
    }

    let badge = match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        "skip" => "[--]",
        _ => "[..]",
    };
    format!("{badge} {message}")
}

pub(crate) fn format_scan_lines(report: &ScanReport) -> Vec<String> {
    let mut lines = report.apps.iter().map(format_app_line).collect::<Vec<_>>();
    for (source, count) in &report.per_source {
        lines.push(format!("source {source}: {count} applications"));
    }
    for (source, reason) in &report.failed_sources {
        lines.push(format!("source {source} failed: {reason}"));
    }
    lines.push(format!("total: {} applications", report.apps.len()));
    lines
}

fn format_app_line(app: &AppInfo) -> String {
    let version = if app.version.is_empty() {
        String::new()
    } else {
        format!(" {}", app.version)
    };
    format!("{}{version} ({})", app.name, app.origin.as_str())
}

pub(crate) fn format_plan_summary(plan: &MigrationPlan) -> Vec<String> {
    let distribution = plan
        .match_type_distribution()
        .into_iter()
        .map(|(match_type, count)| format!("{}={count}", match_type.as_str()))
        .collect::<Vec<_>>()
        .join(" ");
    vec![
        format!(
            "plan summary: apps={} matched={} unmatched={} selected={} match-rate={:.1}%",
            plan.len(),
            plan.matched_count(),
            plan.unmatched_count(),
            plan.selected_count(),
            plan.match_rate() * 100.0
        ),
        format!("match types: {distribution}"),
    ]
}

pub(crate) fn format_selected_lines(plan: &MigrationPlan) -> Vec<String> {
    plan.selected_entries()
        .into_iter()
        .map(|(index, entry)| {
            let version = entry
                .requested_version()
                .map(|version| format!(" --version {version}"))
                .unwrap_or_default();
            format!(
                "[{index}] {} -> {}{version} ({} {:.0}%)",
                entry.app_name,
                entry.catalog_package_id,
                entry.match_type.as_str(),
                entry.confidence * 100.0
            )
        })
        .collect()
}

pub(crate) fn format_search_lines(packages: &[CatalogPackage]) -> Vec<String> {
    if packages.is_empty() {
        return vec!["no packages found".to_string()];
    }
    packages
        .iter()
        .map(|package| format!("{} {}", package.id, package.version))
        .collect()
}

pub(crate) fn format_outdated_lines(packages: &[OutdatedPackage]) -> Vec<String> {
    if packages.is_empty() {
        return vec!["all packages are up to date".to_string()];
    }
    packages
        .iter()
        .map(|package| {
            let pinned = if package.pinned { " (pinned)" } else { "" };
            format!(
                "{} {} -> {}{pinned}",
                package.id, package.current_version, package.available_version
            )
        })
        .collect()
}

/// One terminal line per interesting worker event; chatter returns `None`.
pub(crate) fn format_worker_event(style: OutputStyle, event: &WorkerEvent) -> Option<String> {
    match event {
        WorkerEvent::Started { total } => Some(render_status_line(
            style,
            "step",
            &format!("installing {total} packages"),
        )),
        WorkerEvent::JobStatusChanged { job, .. } => match job.status {
            EntryStatus::Success => Some(render_status_line(
                style,
                "ok",
                &format!("installed {} ({})", job.package_id, job.app_name),
            )),
            EntryStatus::Failed => Some(render_status_line(
                style,
                "err",
                &format!("{} failed: {}", job.package_id, job.error_message),
            )),
            EntryStatus::Cancelled => Some(render_status_line(
                style,
                "skip",
                &format!("{} cancelled", job.package_id),
            )),
            _ => None,
        },
        WorkerEvent::JobRetrying {
            entry_index,
            attempt,
            delay,
        } => Some(render_status_line(
            style,
            "warn",
            &format!(
                "entry {entry_index}: retry {attempt} in {}",
                format_elapsed(*delay)
            ),
        )),
        WorkerEvent::Paused => Some(render_status_line(style, "warn", "migration paused")),
        WorkerEvent::Resumed => Some(render_status_line(style, "step", "migration resumed")),
        WorkerEvent::Cancelled => Some(render_status_line(style, "warn", "migration cancelled")),
        WorkerEvent::JobProgress { .. } | WorkerEvent::Completed { .. } => None,
    }
}

pub(crate) fn format_worker_summary(stats: &WorkerStats) -> String {
    format!(
        "install summary: success={} failed={} cancelled={} skipped={} total={}",
        stats.success, stats.failed, stats.cancelled, stats.skipped, stats.total
    )
}

fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let millis = elapsed.subsec_millis();
    format!("{secs}.{millis:03}s")
}

fn render_progress_line(
    style: OutputStyle,
    label: &str,
    current: u64,
    total: u64,
    elapsed: Option<Duration>,
) -> Option<String> {
    if style == OutputStyle::Plain {
        return None;
    }

    let width = 18_usize;
    let safe_total = total.max(1);
    let bounded_current = current.min(safe_total);
    let filled = ((bounded_current as usize) * width) / (safe_total as usize);
    let bar = format!(
        "{}{}",
        "=".repeat(filled),
        "-".repeat(width.saturating_sub(filled))
    );
    let percent = (bounded_current * 100) / safe_total;
    let counts = format!("{}/{}", HumanCount(current), HumanCount(total));
    let suffix = elapsed
        .map(|value| format!(" complete in {}", format_elapsed(value)))
        .unwrap_or_default();

    Some(format!(
        "{} [{}] {:>3}% {}{}",
        colorize(progress_label_style(), label),
        colorize(progress_bar_style(), &bar),
        percent,
        counts,
        suffix
    ))
}

fn section_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightBlue.into()))
        .effects(Effects::BOLD)
}

fn progress_label_style() -> Style {
    Style::new()
        .fg_color(Some(AnsiColor::BrightCyan.into()))
        .effects(Effects::BOLD)
}

fn progress_bar_style() -> Style {
    Style::new().fg_color(Some(AnsiColor::BrightBlue.into()))
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}
