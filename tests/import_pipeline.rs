//! End-to-end import and retrieval against a real SQLite database.

use std::fs;
use std::path::Path;
use tempfile::TempDir;

use triage_harness::config::Config;
use triage_harness::models::{normalize_serial, KbQuery, LookupField};
use triage_harness::store::{ImportLedger, InventoryStore, KnowledgeStore};
use triage_harness::workspace::Workspace;

fn write_dataset(root: &Path) {
    fs::write(
        root.join("kb_corpus.jsonl"),
        concat!(
            r#"{"id":"KB-100","title":"Outlook login loop on Mac","text":"1. Quit Outlook\n2. Open Keychain Access and delete the Exchange entries\n3. Relaunch Outlook and sign in"}"#,
            "\n",
            r#"{"id":"KB-101","title":"VPN disconnects","text":"Quit GlobalProtect. Remove the VPN profile. Reconnect to the portal."}"#,
            "\n"
        ),
    )
    .unwrap();
    fs::write(
        root.join("managed_macs.jsonl"),
        r#"{"serial_number":"C02ABC12345","username":"jane.doe","device_name":"Jane's MacBook Pro","os_version":"14.4","model":"MacBook Pro"}"#,
    )
    .unwrap();
    fs::write(
        root.join("managed_mobile_devices.jsonl"),
        r#"{"Serial Number":"DNPX1234ABCD","Username":"john.roe","Phone Number":"+1 555 0100"}"#,
    )
    .unwrap();
    fs::write(
        root.join("assets.jsonl"),
        r#"{"serial":"C02ABC12345","asset_tag":"TC-0042","owner":"jane.doe"}"#,
    )
    .unwrap();
    fs::write(
        root.join("apple_intake_filtered.jsonl"),
        r#"{"serial_number":"F2LXYZ98765","email":"sam.poe@example.com","model":"iPad Air"}"#,
    )
    .unwrap();
}

fn config(dir: &TempDir) -> Config {
    let root = dir.path().join("dataset");
    fs::create_dir_all(&root).unwrap();
    write_dataset(&root);
    Config::for_paths(dir.path().join("data/triage.sqlite"), root)
}

#[tokio::test]
async fn five_file_dataset_imports_and_links() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let workspace = Workspace::open(&config).await.unwrap();

    let report = workspace.import(false).await.unwrap();
    assert_eq!(report.imported_files.len(), 5, "{:?}", report);
    assert!(report.skipped_files.is_empty());
    assert_eq!(workspace.store().count_articles().await.unwrap(), 2);
    assert_eq!(workspace.store().count_inventory().await.unwrap(), 4);

    let hits = workspace
        .search(&KbQuery {
            text: "outlook login".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].article.id, "KB-100");

    let linked = workspace
        .linked_context(Some("C02ABC12345"), None)
        .await
        .unwrap();
    assert_eq!(linked.records.len(), 2);
    assert!(linked.confidence > 0.9);
}

#[tokio::test]
async fn second_import_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let workspace = Workspace::open(&config).await.unwrap();

    workspace.import(false).await.unwrap();
    let before = workspace.store().fingerprints().await.unwrap();

    let second = workspace.import(false).await.unwrap();
    assert!(second.unchanged);
    assert!(second.imported_files.is_empty());
    assert!(second.record_counts.is_empty());
    assert_eq!(second.skipped_files.len(), 5);
    assert_eq!(workspace.store().fingerprints().await.unwrap(), before);

    let forced = workspace.import(true).await.unwrap();
    assert_eq!(forced.imported_files.len(), 5);
    assert_eq!(workspace.store().count_inventory().await.unwrap(), 4);
}

#[tokio::test]
async fn spaced_serial_lookup_matches_normalized_serial() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let workspace = Workspace::open(&config).await.unwrap();
    workspace.import(false).await.unwrap();

    assert_eq!(normalize_serial("C02 ABC 12345"), normalize_serial("c02abc12345"));

    let spaced = workspace
        .lookup("C02 ABC 12345", LookupField::Serial, 10)
        .await
        .unwrap();
    let lower = workspace
        .lookup("c02abc12345", LookupField::Serial, 10)
        .await
        .unwrap();
    assert_eq!(spaced.len(), 2);
    assert_eq!(spaced.len(), lower.len());

    let by_phone = workspace
        .lookup("555 0100", LookupField::Phone, 10)
        .await
        .unwrap();
    assert_eq!(by_phone.len(), 1);
    assert_eq!(by_phone[0].serial_number.as_deref(), Some("DNPX1234ABCD"));

    let by_user = workspace
        .linked_context(None, Some("JOHN.ROE"))
        .await
        .unwrap();
    assert_eq!(by_user.records.len(), 1);
    assert!((by_user.confidence - 0.8).abs() < 1e-9);
}

#[tokio::test]
async fn changed_file_refreshes_everything() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let workspace = Workspace::open(&config).await.unwrap();
    workspace.import(false).await.unwrap();

    fs::write(
        config.dataset.root.join("assets.jsonl"),
        concat!(
            r#"{"serial":"C02ABC12345","asset_tag":"TC-0042"}"#,
            "\n",
            r#"{"serial":"C02NEW00001","asset_tag":"TC-0043"}"#,
            "\n"
        ),
    )
    .unwrap();
    fs::write(config.dataset.root.join("notes.md"), "# Printer\nPower cycle the printer.").unwrap();

    let report = workspace.import(false).await.unwrap();
    assert!(!report.unchanged);
    assert_eq!(report.imported_files.len(), 6);
    assert_eq!(workspace.store().count_inventory().await.unwrap(), 5);
    assert_eq!(workspace.store().count_articles().await.unwrap(), 3);

    let tag = workspace
        .lookup("TC-0043", LookupField::AssetTag, 10)
        .await
        .unwrap();
    assert_eq!(tag.len(), 1);
}
