use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::TimeZone;
use migrant_core::AppOrigin;

use super::*;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

fn clock() -> FixedClock {
    FixedClock(
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0)
            .single()
            .expect("must build fixed timestamp"),
    )
}

fn host() -> HostInfo {
    HostInfo {
        machine_name: "WS-042".to_string(),
        user_name: "jdoe".to_string(),
        os_name: "Windows".to_string(),
        os_version: "11 23H2".to_string(),
    }
}

fn app(name: &str) -> AppInfo {
    AppInfo::new(name, AppOrigin::RegistryHklm)
}

fn matched(
    app_name: &str,
    matched_name: &str,
    id: &str,
    confidence: f64,
    match_type: MatchType,
) -> MatchResult {
    MatchResult {
        app_name: app_name.to_string(),
        matched_name: matched_name.to_string(),
        catalog_package_id: id.to_string(),
        confidence,
        match_type,
        available: Some(true),
        catalog_version: None,
    }
}

fn generated(apps: &[AppInfo], matches: &[MatchResult]) -> MigrationPlan {
    let mut plan = MigrationPlan::new(&host(), &clock());
    plan.generate(apps, matches, &clock());
    plan
}

fn sample_plan() -> MigrationPlan {
    let mut zip = app("7-Zip 22.01")
        .with_version("22.01")
        .with_publisher("Igor Pavlov");
    zip.install_date = "20230415".to_string();
    zip.install_location = r"C:\Program Files\7-Zip".to_string();
    zip.registry_key = r"SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\7-Zip".to_string();

    let apps = vec![zip, app("Google Chrome"), app("AcmeCorp Internal Tool X")];
    let mut chrome = matched(
        "Google Chrome",
        "Google Chrome",
        "googlechrome",
        0.95,
        MatchType::Fuzzy,
    );
    chrome.catalog_version = Some("120.0.6099.110".to_string());
    let matches = vec![
        matched("7-Zip 22.01", "7-Zip", "7zip", 1.0, MatchType::Exact),
        chrome,
    ];
    generated(&apps, &matches)
}

static TEST_PATH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "migrant-plan-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_PATH_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    path
}

fn assert_counters_consistent(plan: &MigrationPlan) {
    let metadata = plan.metadata();
    assert_eq!(metadata.total_apps, plan.entries().len());
    assert_eq!(
        metadata.selected_apps,
        plan.entries().iter().filter(|entry| entry.selected).count()
    );
    assert_eq!(metadata.matched_apps + plan.unmatched_count(), metadata.total_apps);
}

#[test]
fn generate_joins_apps_with_matches() {
    let plan = sample_plan();
    let entries = plan.entries();
    assert_eq!(entries.len(), 3);

    assert_eq!(entries[0].catalog_package_id, "7zip");
    assert_eq!(entries[0].match_type, MatchType::Exact);
    assert!(entries[0].selected);
    assert_eq!(entries[0].status, EntryStatus::Pending);
    assert_eq!(entries[0].app_publisher, "Igor Pavlov");
    assert!(entries[0].install_date.is_some());

    assert_eq!(entries[1].catalog_package_id, "googlechrome");
    assert_eq!(entries[1].available_version, "120.0.6099.110");
    assert!(entries[1].available);
    assert!(entries[1].selected);

    assert!(entries[2].catalog_package_id.is_empty());
    assert_eq!(entries[2].match_type, MatchType::None);
    assert_eq!(entries[2].confidence, 0.0);
    assert!(!entries[2].selected);
    assert!(!entries[2].available);

    let metadata = plan.metadata();
    assert_eq!(metadata.source_machine, "WS-042");
    assert_eq!(metadata.created_by, "jdoe");
    assert_eq!(metadata.report_schema_version, PLAN_SCHEMA_VERSION);
    assert_eq!(metadata.matched_apps, 2);
    assert_eq!(metadata.selected_apps, 2);
    assert!((metadata.match_rate - 2.0 / 3.0).abs() < 1e-12);
    assert_counters_consistent(&plan);
}

#[test]
fn generate_falls_back_to_normalized_name() {
    // A match produced elsewhere only knows the normalized name.
    let mut result = matched("", "Slack", "slack", 0.9, MatchType::Search);
    result.available = None;
    let plan = generated(&[app("Slack 4.36.140")], &[result]);
    assert_eq!(plan.entries()[0].catalog_package_id, "slack");
    assert!(plan.entries()[0].available);
}

#[test]
fn low_confidence_match_is_not_auto_selected() {
    let plan = generated(
        &[app("Paint Tool")],
        &[matched("Paint Tool", "paint.net", "paint.net", 0.62, MatchType::Fuzzy)],
    );
    assert!(!plan.entries()[0].selected);
    assert_eq!(plan.metadata().selected_apps, 0);
}

#[test]
fn unavailable_match_is_flagged() {
    let mut result = matched("Git", "Git", "git", 1.0, MatchType::Exact);
    result.available = Some(false);
    let plan = generated(&[app("Git")], &[result]);
    assert!(!plan.entries()[0].available);
}

#[test]
fn curation_refreshes_counters() {
    let mut plan = sample_plan();

    plan.deselect_all();
    assert_eq!(plan.metadata().selected_apps, 0);
    assert_counters_consistent(&plan);

    plan.select_by_match_type(MatchType::Fuzzy);
    assert_eq!(plan.metadata().selected_apps, 1);
    assert!(plan.entries()[1].selected);

    plan.select_by_match_type(MatchType::Exact);
    assert_eq!(plan.metadata().selected_apps, 2);

    plan.select_all();
    assert_eq!(plan.metadata().selected_apps, 2);
    assert!(!plan.entries()[2].selected);

    plan.select_by_confidence(0.99);
    assert_eq!(plan.metadata().selected_apps, 1);
    assert!(plan.entries()[0].selected);
    assert_counters_consistent(&plan);
}

#[test]
fn select_by_match_type_none_never_selects_unmatched() {
    let mut plan = sample_plan();
    plan.deselect_all();
    plan.select_by_match_type(MatchType::None);
    assert_eq!(plan.selected_count(), 0);
}

#[test]
fn select_entry_rejects_unmatched_and_out_of_range() {
    let mut plan = sample_plan();
    plan.select_entry(1, false).expect("must deselect chrome");
    assert_eq!(plan.metadata().selected_apps, 1);

    let err = plan
        .select_entry(2, true)
        .expect_err("must refuse unmatched");
    assert!(err.to_string().contains("has no package"));

    let err = plan
        .select_entry(9, true)
        .expect_err("must refuse bad index");
    assert!(err.to_string().contains("out of range"));
    assert_counters_consistent(&plan);
}

#[test]
fn update_and_add_enforce_entry_invariants() {
    let mut plan = sample_plan();

    let mut cleared = plan.entries()[0].clone();
    cleared.catalog_package_id = "  ".to_string();
    plan.update_entry(0, cleared).expect("must update entry");
    let entry = &plan.entries()[0];
    assert!(entry.catalog_package_id.is_empty());
    assert_eq!(entry.match_type, MatchType::None);
    assert_eq!(entry.confidence, 0.0);
    assert!(!entry.selected);

    let mut locked = PlanEntry::new("Contoso Reader")
        .with_package("contoso-reader", MatchType::Manual);
    locked.version_lock = true;
    locked.locked_version = "not a version".to_string();
    assert!(plan.add_entry(locked.clone()).is_err());
    assert_eq!(plan.len(), 3);

    locked.locked_version = "2.4.1".to_string();
    locked.selected = true;
    let index = plan.add_entry(locked).expect("must add entry");
    assert_eq!(index, 3);
    assert_eq!(plan.entries()[3].requested_version(), Some("2.4.1"));
    assert_eq!(plan.entries()[3].confidence, 1.0);
    assert_counters_consistent(&plan);

    let removed = plan.remove_entry(2).expect("must remove entry");
    assert_eq!(removed.app_name, "AcmeCorp Internal Tool X");
    assert!(plan.remove_entry(10).is_err());
    assert_counters_consistent(&plan);
}

#[test]
fn version_lock_can_be_set_and_released() {
    let mut plan = sample_plan();
    plan.set_version_lock(0, Some("22.01"))
        .expect("must lock version");
    assert_eq!(plan.entries()[0].requested_version(), Some("22.01"));

    assert!(plan.set_version_lock(0, Some("latest")).is_err());
    assert_eq!(plan.entries()[0].locked_version, "22.01");

    plan.set_version_lock(0, None).expect("must unlock");
    assert!(!plan.entries()[0].version_lock);
    assert_eq!(plan.entries()[0].requested_version(), None);
}

#[test]
fn record_status_writes_execution_fields() {
    let mut plan = sample_plan();
    let at = clock().now();
    plan.record_status(0, EntryStatus::Failed, "Access denied", Some(at))
        .expect("must record status");
    let entry = &plan.entries()[0];
    assert_eq!(entry.status, EntryStatus::Failed);
    assert_eq!(entry.error_message, "Access denied");
    assert_eq!(entry.executed_at, Some(at));

    plan.record_status(0, EntryStatus::Queued, "", None)
        .expect("must record queued");
    assert_eq!(plan.entries()[0].executed_at, Some(at));
    assert!(plan.record_status(7, EntryStatus::Queued, "", None).is_err());
}

#[test]
fn statistics_accessors() {
    let mut plan = sample_plan();
    let distribution = plan.match_type_distribution();
    assert_eq!(distribution.get(&MatchType::Exact), Some(&1));
    assert_eq!(distribution.get(&MatchType::Fuzzy), Some(&1));
    assert_eq!(distribution.get(&MatchType::None), Some(&1));

    let selected = plan.selected_entries();
    assert_eq!(selected.iter().map(|(index, _)| *index).collect::<Vec<_>>(), vec![0, 1]);
    let unmatched = plan.unmatched_entries();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].0, 2);

    plan.clear();
    assert!(plan.is_empty());
    assert_eq!(plan.metadata().total_apps, 0);
    assert_eq!(plan.match_rate(), 0.0);
}

#[test]
fn selection_by_confidence_over_large_plan() {
    let mut apps = Vec::new();
    let mut matches = Vec::new();
    for i in 0..100 {
        let name = format!("Application {i}");
        let id = format!("pkg-{i}");
        if i < 40 {
            let confidence = 0.95 + (i % 5) as f64 * 0.01;
            matches.push(matched(&name, &name, &id, confidence, MatchType::Exact));
        } else if i < 70 {
            let confidence = 0.70 + (i % 20) as f64 * 0.01;
            matches.push(matched(&name, &name, &id, confidence, MatchType::Fuzzy));
        }
        apps.push(app(&name));
    }

    let mut plan = generated(&apps, &matches);
    assert_eq!(plan.metadata().matched_apps, 70);

    plan.select_by_confidence(0.9);
    assert_eq!(plan.metadata().selected_apps, 40);
    assert_counters_consistent(&plan);
}

#[test]
fn generate_drops_matches_with_unusable_package_ids() {
    let apps = vec![app("Foo Tool"), app("Bar Tool")];
    let matches = vec![
        matched("Foo Tool", "Foo Tool", "", 1.0, MatchType::Exact),
        matched("Bar Tool", "Bar Tool", "bad id with spaces!", 1.0, MatchType::Exact),
    ];
    let plan = generated(&apps, &matches);

    for entry in plan.entries() {
        assert!(entry.catalog_package_id.is_empty(), "{entry:?}");
        assert_eq!(entry.match_type, MatchType::None);
        assert_eq!(entry.confidence, 0.0);
        assert!(!entry.selected);
    }
    assert_eq!(plan.selected_count(), 0);

    let json = plan.to_json_string().expect("must serialize");
    let restored = MigrationPlan::from_json_str(&json).expect("must parse");
    assert_eq!(restored, plan);
}

#[test]
fn catalog_title_does_not_claim_another_inventory_app() {
    let apps = vec![app("Google Chrome"), app("Chrome")];
    let matches = vec![matched(
        "Google Chrome",
        "Chrome",
        "googlechrome",
        0.95,
        MatchType::Fuzzy,
    )];
    let plan = generated(&apps, &matches);

    assert_eq!(plan.entries()[0].catalog_package_id, "googlechrome");
    assert!(plan.entries()[0].selected);
    assert!(plan.entries()[1].catalog_package_id.is_empty());
    assert!(!plan.entries()[1].selected);
    assert_eq!(plan.selected_count(), 1);
}

#[test]
fn json_round_trip_is_lossless() {
    let mut plan = sample_plan();
    plan.set_version_lock(0, Some("22.01")).expect("must lock");
    plan.record_status(1, EntryStatus::Success, "", Some(clock().now()))
        .expect("must record");
    let mut annotated = plan.entries()[2].clone();
    annotated.notes = "ask vendor, \"legacy\"\nno public package".to_string();
    plan.update_entry(2, annotated).expect("must annotate");

    let json = plan.to_json_string().expect("must serialize");
    let restored = MigrationPlan::from_json_str(&json).expect("must parse");
    assert_eq!(restored, plan);
}

#[test]
fn json_uses_documented_field_names() {
    let plan = sample_plan();
    let json = plan.to_json_string().expect("must serialize");
    let value: serde_json::Value = serde_json::from_str(&json).expect("must be valid JSON");

    assert_eq!(value["metadata"]["report_version"], "1.0");
    assert_eq!(value["metadata"]["total_apps"], 3);
    let first = &value["entries"][0];
    assert_eq!(first["choco_package"], "7zip");
    assert_eq!(first["match_type"], "exact");
    assert_eq!(first["status"], "pending");
    assert_eq!(first["install_date"], "2023-04-15T00:00:00Z");
    assert!(first.get("executed_at").is_none());
    assert_eq!(value["entries"][2]["install_date"], "");
}

#[test]
fn exact_hit_survives_export_and_import() {
    let dir = test_dir();
    let path = dir.join("plan.json");
    let plan = generated(
        &[app("7-Zip 22.01").with_version("22.01")],
        &[matched("7-Zip 22.01", "7-Zip", "7zip", 1.0, MatchType::Exact)],
    );
    plan.export_json(&path).expect("must export plan");

    let restored = MigrationPlan::load(&path).expect("must import plan");
    assert_eq!(restored.entries()[0].catalog_package_id, "7zip");
    assert!(restored.entries()[0].selected);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn import_is_lenient_about_missing_and_unknown_fields() {
    let json = r#"{
        "metadata": {"source_machine": "OLD-PC", "report_version": "0.9", "future_field": 1},
        "entries": [
            {"app_name": "Git", "choco_package": "git", "confidence": 1.0,
             "match_type": "exact", "selected": true, "install_date": "not a date",
             "status": "teleported", "extra": [1, 2]},
            {"app_name": "Orphan", "selected": true}
        ]
    }"#;

    let plan = MigrationPlan::from_json_str(json).expect("must import leniently");
    assert_eq!(plan.metadata().report_schema_version, "0.9");
    assert_eq!(plan.metadata().source_machine, "OLD-PC");
    assert_eq!(plan.entries()[0].status, EntryStatus::Pending);
    assert!(plan.entries()[0].install_date.is_none());
    assert!(!plan.entries()[1].selected);
    assert_eq!(plan.metadata().total_apps, 2);
    assert_eq!(plan.metadata().selected_apps, 1);
}

#[test]
fn failed_import_leaves_plan_unchanged() {
    let dir = test_dir();
    fs::create_dir_all(&dir).expect("must create test dir");
    let path = dir.join("broken.json");
    fs::write(&path, "{ \"entries\": [ {").expect("must write broken plan");

    let mut plan = sample_plan();
    let before = plan.clone();
    let err = plan
        .import_json(&path)
        .expect_err("must reject malformed JSON");
    assert!(err.to_string().contains("failed to import plan"));
    assert_eq!(plan, before);

    assert!(plan.import_json(&dir.join("missing.json")).is_err());
    assert_eq!(plan, before);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn csv_has_fixed_header_and_lf_rows() {
    let plan = sample_plan();
    let csv = plan.to_csv_string().expect("must render CSV");
    let mut lines = csv.split('\n');
    let header = concat!(
        "App Name,Version,Publisher,Install Location,Install Date,Chocolatey Package,",
        "Confidence,Match Type,Available,Available Version,Selected,Version Lock,Notes,",
        "Status,Error Message"
    );
    let row = concat!(
        r"7-Zip 22.01,22.01,Igor Pavlov,C:\Program Files\7-Zip,2023-04-15T00:00:00Z,",
        "7zip,1.00,exact,Yes,,Yes,No,,pending,"
    );
    assert_eq!(lines.next(), Some(header));
    assert_eq!(lines.next(), Some(row));
    assert!(!csv.contains('\r'));
    assert!(csv.ends_with('\n'));
}

#[test]
fn csv_cells_parse_back_byte_exact() {
    let mut plan = sample_plan();
    let tricky = [
        "comma, inside",
        "quote \" inside",
        "line\nbreak",
        "\"fully quoted\"",
        "  padded  ",
        "",
    ];
    for note in tricky {
        let mut entry = plan.entries()[0].clone();
        entry.notes = note.to_string();
        entry.app_name = format!("{note}-name");
        plan.add_entry(entry).expect("must add tricky entry");
    }

    let csv = plan.to_csv_string().expect("must render CSV");
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(csv.as_bytes());
    let records = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .expect("must parse rendered CSV");

    assert_eq!(records.len(), plan.len());
    for (record, entry) in records.iter().zip(plan.entries()) {
        assert_eq!(&record[0], entry.app_name.as_str());
        assert_eq!(&record[12], entry.notes.as_str());
    }
}

#[test]
fn html_report_is_escaped_and_styled() {
    let mut plan = sample_plan();
    let mut entry = plan.entries()[2].clone();
    entry.app_name = "<script>alert('x')</script> & Co".to_string();
    plan.update_entry(2, entry).expect("must rename");

    let html = plan.to_html_string();
    assert!(html.starts_with("<!DOCTYPE html>"));
    assert!(html.contains("<style>"));
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt; &amp; Co"));
    assert!(html.contains("<tr class=\"exact\">"));
    assert!(html.contains("<tr class=\"fuzzy\">"));
    assert!(html.contains("<span class=\"unmatched\">No match</span>"));
    assert!(html.contains("66.7%"));
    assert!(html.contains("<td class=\"confidence\">100%</td>"));
    assert!(html.contains("2024-03-09 14:05:00"));
    assert!(!html.contains("http"));
}

#[test]
fn exports_create_parent_directories() {
    let dir = test_dir();
    let plan = sample_plan();
    plan.export_csv(&dir.join("nested").join("plan.csv"))
        .expect("must export CSV");
    plan.export_html(&dir.join("nested").join("plan.html"))
        .expect("must export HTML");
    assert!(dir.join("nested").join("plan.csv").exists());
    assert!(dir.join("nested").join("plan.html").exists());
    let _ = fs::remove_dir_all(&dir);
}
