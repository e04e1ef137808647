use std::fmt::Write as _;

use anyhow::{Context, Result};
use csv::{Terminator, WriterBuilder};
use migrant_core::MatchType;

use crate::entry::format_timestamp;
use crate::{MigrationPlan, PlanEntry};

pub const CSV_HEADER: [&str; 15] = [
    "App Name",
    "Version",
    "Publisher",
    "Install Location",
    "Install Date",
    "Chocolatey Package",
    "Confidence",
    "Match Type",
    "Available",
    "Available Version",
    "Selected",
    "Version Lock",
    "Notes",
    "Status",
    "Error Message",
];

const HTML_STYLE: &str = "\
body { font-family: Arial, sans-serif; margin: 20px; background-color: #f5f5f5; }
h1 { color: #333; }
.metadata, .stats { background: white; padding: 20px; margin-bottom: 20px; border-radius: 5px; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
.metadata table { width: 100%; border-collapse: collapse; }
.metadata td { padding: 8px; border-bottom: 1px solid #eee; }
.metadata td:first-child { font-weight: bold; width: 200px; }
.stats-grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 15px; }
.stat-box { text-align: center; padding: 15px; background: #f8f9fa; border-radius: 5px; }
.stat-value { font-size: 32px; font-weight: bold; color: #007bff; }
.stat-label { color: #666; margin-top: 5px; }
table { width: 100%; border-collapse: collapse; background: white; box-shadow: 0 2px 4px rgba(0,0,0,0.1); }
th { background: #007bff; color: white; padding: 12px; text-align: left; font-weight: bold; }
td { padding: 10px; border-bottom: 1px solid #eee; }
tr:hover { background: #f8f9fa; }
.selected { color: #28a745; font-weight: bold; }
.unmatched { color: #dc3545; }
.exact { background: #d4edda; }
.fuzzy { background: #fff3cd; }
.confidence { font-weight: bold; }
";

fn yes_no(value: bool) -> &'static str {
    if value {
        "Yes"
    } else {
        "No"
    }
}

fn csv_row(entry: &PlanEntry) -> [String; 15] {
    [
        entry.app_name.clone(),
        entry.app_version.clone(),
        entry.app_publisher.clone(),
        entry.install_location.clone(),
        entry
            .install_date
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_default(),
        entry.catalog_package_id.clone(),
        format!("{:.2}", entry.confidence),
        entry.match_type.as_str().to_string(),
        yes_no(entry.available).to_string(),
        entry.available_version.clone(),
        yes_no(entry.selected).to_string(),
        yes_no(entry.version_lock).to_string(),
        entry.notes.clone(),
        entry.status.as_str().to_string(),
        entry.error_message.clone(),
    ]
}

pub(crate) fn render_csv(plan: &MigrationPlan) -> Result<String> {
    let mut writer = WriterBuilder::new()
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer
        .write_record(CSV_HEADER)
        .context("failed to write CSV header")?;
    for (index, entry) in plan.entries().iter().enumerate() {
        writer
            .write_record(csv_row(entry))
            .with_context(|| format!("failed to write CSV row {index}"))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("failed to flush CSV output: {}", err.error()))?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

pub(crate) fn render_html(plan: &MigrationPlan) -> String {
    let metadata = plan.metadata();
    let created_at = metadata
        .created_at
        .map(|value| value.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default();

    let mut out = String::new();
    out.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n");
    out.push_str("<title>Application Migration Report</title>\n<style>\n");
    out.push_str(HTML_STYLE);
    out.push_str("</style>\n</head>\n<body>\n<h1>Application Migration Report</h1>\n");

    out.push_str("<div class=\"metadata\">\n<h2>Source System Information</h2>\n<table>\n");
    let rows = [
        ("Machine Name", metadata.source_machine.clone()),
        (
            "Operating System",
            format!("{} {}", metadata.source_os, metadata.source_os_version)
                .trim()
                .to_string(),
        ),
        ("Created By", metadata.created_by.clone()),
        ("Created At", created_at),
        ("Report Version", metadata.report_schema_version.clone()),
    ];
    for (label, value) in rows {
        let _ = writeln!(
            out,
            "<tr><td>{label}:</td><td>{}</td></tr>",
            escape_html(&value)
        );
    }
    out.push_str("</table>\n</div>\n");

    out.push_str("<div class=\"stats\">\n<h2>Migration Statistics</h2>\n");
    out.push_str("<div class=\"stats-grid\">\n");
    let stats = [
        (metadata.total_apps.to_string(), "Total Apps"),
        (metadata.matched_apps.to_string(), "Matched Apps"),
        (metadata.selected_apps.to_string(), "Selected Apps"),
        (format!("{:.1}%", metadata.match_rate * 100.0), "Match Rate"),
    ];
    for (value, label) in stats {
        let _ = writeln!(
            out,
            concat!(
                "<div class=\"stat-box\"><div class=\"stat-value\">{value}</div>",
                "<div class=\"stat-label\">{label}</div></div>"
            ),
            value = value,
            label = label
        );
    }
    out.push_str("</div>\n</div>\n");

    out.push_str("<h2>Application List</h2>\n<table>\n<thead>\n<tr>\n");
    out.push_str("<th>App Name</th><th>Version</th><th>Publisher</th><th>Chocolatey Package</th>");
    out.push_str("<th>Confidence</th><th>Match Type</th><th>Selected</th><th>Status</th>\n");
    out.push_str("</tr>\n</thead>\n<tbody>\n");

    for entry in plan.entries() {
        let row_class = match entry.match_type {
            MatchType::Exact => " class=\"exact\"",
            MatchType::Fuzzy => " class=\"fuzzy\"",
            _ => "",
        };
        let package = if entry.is_matched() {
            escape_html(&entry.catalog_package_id)
        } else {
            "<span class=\"unmatched\">No match</span>".to_string()
        };
        let selected = if entry.selected {
            "<span class=\"selected\">&#10003; Yes</span>"
        } else {
            "No"
        };

        let _ = writeln!(out, "<tr{row_class}>");
        let _ = writeln!(out, "<td>{}</td>", escape_html(&entry.app_name));
        let _ = writeln!(out, "<td>{}</td>", escape_html(&entry.app_version));
        let _ = writeln!(out, "<td>{}</td>", escape_html(&entry.app_publisher));
        let _ = writeln!(out, "<td>{package}</td>");
        let _ = writeln!(
            out,
            "<td class=\"confidence\">{:.0}%</td>",
            entry.confidence * 100.0
        );
        let _ = writeln!(out, "<td>{}</td>", entry.match_type.as_str());
        let _ = writeln!(out, "<td>{selected}</td>");
        let _ = writeln!(out, "<td>{}</td>", entry.status.as_str());
        out.push_str("</tr>\n");
    }

    out.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    out
}
