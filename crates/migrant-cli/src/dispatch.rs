use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{bail, Context, Result};
use migrant_core::PackageCatalog;
use migrant_installer::WorkerEvent;
use migrant_plan::MigrationPlan;

use crate::completion::{resolve_completion_shell, write_completions_script};
use crate::config::{default_state_prefix, MigrantConfig, StateLayout};
use crate::orchestrator::{Orchestrator, SourceSelection};
use crate::render::{
    format_outdated_lines, format_plan_summary, format_scan_lines, format_search_lines,
    format_selected_lines, format_worker_event, format_worker_summary, TerminalRenderer,
};
use crate::{
    CatalogCommands, Cli, Commands, ExportFormat, MappingCommands, SelectionArgs, SourceArgs,
};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let layout = StateLayout::new(default_state_prefix()?);
    let config_path = cli.config.clone().unwrap_or_else(|| layout.config_path());
    let config = MigrantConfig::load(&config_path)?;
    let orchestrator = Orchestrator::new(config, layout, cli.catalog_root.clone());
    let renderer = TerminalRenderer::current();

    match cli.command {
        Commands::Scan { sources, snapshot } => {
            let catalog = catalog_for_scan(&orchestrator, &sources);
            let inventory = orchestrator.scan(&source_selection(&sources), catalog)?;
            renderer.print_lines(&format_scan_lines(&inventory.report));
            if let Some(path) = snapshot {
                orchestrator.write_snapshot(&inventory, &path)?;
                renderer.print_status("ok", &format!("snapshot written to {}", path.display()));
            }
        }
        Commands::Plan {
            out,
            sources,
            csv,
            html,
            sequential,
        } => {
            orchestrator.layout().ensure_base_dirs()?;
            let catalog = orchestrator.try_open_catalog();
            let scan_catalog = catalog
                .clone()
                .filter(|_| sources.from_snapshot.is_none())
                .map(|catalog| catalog as Arc<dyn PackageCatalog>);
            let inventory = orchestrator.scan(&source_selection(&sources), scan_catalog)?;

            renderer.print_section("match");
            let matcher = orchestrator.matcher(sequential)?;
            let plan = orchestrator.build_plan(
                &inventory.host,
                &inventory.report.apps,
                &matcher,
                catalog
                    .as_deref()
                    .map(|catalog| catalog as &dyn PackageCatalog),
            );

            let out = out.unwrap_or_else(|| orchestrator.layout().default_plan_path());
            plan.export_json(&out)?;
            if let Some(path) = csv {
                plan.export_csv(&path)?;
            }
            if let Some(path) = html {
                plan.export_html(&path)?;
            }
            renderer.print_lines(&format_plan_summary(&plan));
            renderer.print_status("ok", &format!("plan written to {}", out.display()));
        }
        Commands::Export { plan, format, out } => {
            let plan_path = resolve_plan_path(&orchestrator, plan);
            let plan = MigrationPlan::load(&plan_path)?;
            match format {
                ExportFormat::Json => plan.export_json(&out)?,
                ExportFormat::Csv => plan.export_csv(&out)?,
                ExportFormat::Html => plan.export_html(&out)?,
            }
            renderer.print_status("ok", &format!("exported {}", out.display()));
        }
        Commands::Select {
            plan,
            selection,
            off,
        } => {
            let plan_path = resolve_plan_path(&orchestrator, plan);
            let mut plan = MigrationPlan::load(&plan_path)?;
            apply_selection(&mut plan, &selection, off)?;
            plan.export_json(&plan_path)?;
            renderer.print_lines(&format_plan_summary(&plan));
        }
        Commands::Lock {
            plan,
            entry,
            version,
        } => {
            let plan_path = resolve_plan_path(&orchestrator, plan);
            let mut plan = MigrationPlan::load(&plan_path)?;
            plan.set_version_lock(entry, Some(&version))?;
            plan.export_json(&plan_path)?;
            renderer.print_status("ok", &format!("entry {entry} locked to {version}"));
        }
        Commands::Unlock { plan, entry } => {
            let plan_path = resolve_plan_path(&orchestrator, plan);
            let mut plan = MigrationPlan::load(&plan_path)?;
            plan.set_version_lock(entry, None)?;
            plan.export_json(&plan_path)?;
            renderer.print_status("ok", &format!("entry {entry} unlocked"));
        }
        Commands::Install {
            plan,
            max_concurrent,
            dry_run,
        } => {
            let plan_path = resolve_plan_path(&orchestrator, plan);
            run_install(&orchestrator, renderer, &plan_path, max_concurrent, dry_run)?;
        }
        Commands::Mappings { command } => run_mappings(&orchestrator, renderer, command)?,
        Commands::Catalog { command } => run_catalog(&orchestrator, renderer, command)?,
        Commands::Completions { shell } => {
            let shell_env = std::env::var("SHELL").ok();
            let shell = resolve_completion_shell(shell, shell_env.as_deref(), cfg!(windows));
            let mut stdout = std::io::stdout();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

fn source_selection(sources: &SourceArgs) -> SourceSelection {
    SourceSelection {
        from_snapshot: sources.from_snapshot.clone(),
        skip_registry: sources.skip_registry,
        skip_store: sources.skip_store,
        skip_catalog: sources.skip_catalog,
    }
}

/// Only a live scan that wants catalog-installed packages needs the catalog.
fn catalog_for_scan(
    orchestrator: &Orchestrator,
    sources: &SourceArgs,
) -> Option<Arc<dyn PackageCatalog>> {
    if sources.from_snapshot.is_some() || sources.skip_catalog {
        return None;
    }
    orchestrator
        .try_open_catalog()
        .map(|catalog| catalog as Arc<dyn PackageCatalog>)
}

fn resolve_plan_path(orchestrator: &Orchestrator, plan: Option<PathBuf>) -> PathBuf {
    plan.unwrap_or_else(|| orchestrator.layout().default_plan_path())
}

pub(crate) fn apply_selection(
    plan: &mut MigrationPlan,
    selection: &SelectionArgs,
    off: bool,
) -> Result<()> {
    if off && selection.entry.is_none() {
        bail!("--off only applies together with --entry");
    }
    if selection.all {
        plan.select_all();
    } else if selection.none {
        plan.deselect_all();
    } else if let Some(min_confidence) = selection.min_confidence {
        if !(0.0..=1.0).contains(&min_confidence) {
            bail!("--min-confidence must be between 0 and 1, got {min_confidence}");
        }
        plan.select_by_confidence(min_confidence);
    } else if let Some(match_type) = selection.match_type {
        plan.select_by_match_type(match_type);
    } else if let Some(entry) = selection.entry {
        plan.select_entry(entry, !off)?;
    } else {
        bail!("no selection given");
    }
    Ok(())
}

fn run_install(
    orchestrator: &Orchestrator,
    renderer: TerminalRenderer,
    plan_path: &Path,
    max_concurrent: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    let plan = MigrationPlan::load(plan_path)?;
    if plan.selected_count() == 0 {
        renderer.print_status("warn", "no entries are selected; nothing to install");
        return Ok(());
    }
    if dry_run {
        renderer.print_section("dry run");
        renderer.print_lines(&format_selected_lines(&plan));
        return Ok(());
    }

    let catalog = orchestrator.open_catalog()?;
    let shared = Arc::new(Mutex::new(plan));
    let (worker, total, events) =
        orchestrator.start_install(shared.clone(), catalog, max_concurrent);
    if total == 0 {
        bail!("installer did not start: the catalog failed its integrity check");
    }

    let mut progress = renderer.start_progress("install", total as u64);
    for event in events.iter() {
        if let Some(line) = format_worker_event(renderer.style(), &event) {
            progress.println(&line);
        }
        if matches!(event, WorkerEvent::JobStatusChanged { .. }) {
            progress.set(worker.stats().finished() as u64);
        }
        if matches!(event, WorkerEvent::Completed { .. }) {
            break;
        }
    }
    let stats = worker.wait();
    if stats.failed == 0 && stats.cancelled == 0 {
        progress.finish_success();
    } else {
        progress.finish_abandon();
    }

    shared
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .export_json(plan_path)
        .with_context(|| format!("failed to write back plan results: {}", plan_path.display()))?;
    renderer.print_status(
        if stats.failed == 0 { "ok" } else { "warn" },
        &format_worker_summary(&stats),
    );
    Ok(())
}

fn run_mappings(
    orchestrator: &Orchestrator,
    renderer: TerminalRenderer,
    command: MappingCommands,
) -> Result<()> {
    let mut table = orchestrator.load_mappings()?;
    match command {
        MappingCommands::List => {
            let lines = table
                .iter()
                .map(|(app, package_id)| format!("{app} -> {package_id}"))
                .collect::<Vec<_>>();
            renderer.print_lines(&lines);
            renderer.print_status("ok", &format!("{} mappings", table.count()));
        }
        MappingCommands::Add { app, package_id } => {
            if !table.add(&app, &package_id) {
                bail!("cannot map '{app}': invalid package id '{package_id}'");
            }
            orchestrator.save_mappings(&table)?;
            renderer.print_status("ok", &format!("mapped '{app}' to {package_id}"));
        }
        MappingCommands::Remove { app } => {
            if !table.remove(&app) {
                bail!("no mapping for '{app}'");
            }
            orchestrator.save_mappings(&table)?;
            renderer.print_status("ok", &format!("removed mapping for '{app}'"));
        }
        MappingCommands::Export { file } => {
            table.export_file(&file)?;
            renderer.print_status(
                "ok",
                &format!("exported {} mappings to {}", table.count(), file.display()),
            );
        }
        MappingCommands::Import { file } => {
            let imported = table.import_file(&file)?;
            orchestrator.save_mappings(&table)?;
            renderer.print_status("ok", &format!("imported {imported} mappings"));
        }
    }
    Ok(())
}

fn run_catalog(
    orchestrator: &Orchestrator,
    renderer: TerminalRenderer,
    command: CatalogCommands,
) -> Result<()> {
    if let CatalogCommands::Doctor = command {
        return run_doctor(orchestrator, renderer);
    }

    let catalog = orchestrator.open_catalog()?;
    match command {
        CatalogCommands::Search { query, limit } => {
            let packages = catalog
                .search(&query, limit)
                .with_context(|| format!("catalog search for '{query}' failed"))?;
            renderer.print_lines(&format_search_lines(&packages));
        }
        CatalogCommands::Outdated => {
            let packages = catalog
                .outdated()
                .context("failed to list outdated packages")?;
            renderer.print_lines(&format_outdated_lines(&packages));
        }
        CatalogCommands::Installed { package_id } => match catalog.installed_version(&package_id) {
            Some(version) => renderer.print_status("ok", &format!("{package_id} {version}")),
            None => renderer.print_status("skip", &format!("{package_id} is not installed")),
        },
        CatalogCommands::Upgrade { package_id } => {
            let outcome = catalog.upgrade(&package_id);
            if !outcome.success {
                bail!("upgrade of {package_id} failed: {}", outcome.error_message);
            }
            renderer.print_status("ok", &format!("upgraded {package_id}"));
        }
        CatalogCommands::Uninstall { package_id } => {
            let outcome = catalog.uninstall(&package_id);
            if !outcome.success {
                bail!("uninstall of {package_id} failed: {}", outcome.error_message);
            }
            renderer.print_status("ok", &format!("uninstalled {package_id}"));
        }
        CatalogCommands::Doctor => {}
    }
    Ok(())
}

fn run_doctor(orchestrator: &Orchestrator, renderer: TerminalRenderer) -> Result<()> {
    let layout = orchestrator.layout();
    println!("state prefix: {}", layout.prefix().display());
    println!("config: {}", layout.config_path().display());
    println!("mappings: {}", layout.mappings_path().display());
    println!("plans: {}", layout.plans_dir().display());
    println!(
        "worker: max_concurrent={} max_retries={}",
        orchestrator.config().worker.max_concurrent,
        orchestrator.config().worker.max_retries
    );

    let Some(root) = orchestrator.catalog_root() else {
        renderer.print_status("warn", "catalog root is not configured");
        return Ok(());
    };
    println!("catalog root: {}", root.display());
    match orchestrator.open_catalog() {
        Ok(catalog) => {
            println!("catalog executable: {}", catalog.executable().display());
            if catalog.verify_integrity() {
                renderer.print_status("ok", &format!("Chocolatey {}", catalog.version()));
            } else {
                renderer.print_status("err", "catalog failed its integrity check");
            }
        }
        Err(err) => renderer.print_status("err", &format!("{err:#}")),
    }
    Ok(())
}
