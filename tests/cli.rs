use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn triage_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("triage");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let dataset = root.join("dataset");
    fs::create_dir_all(&dataset).unwrap();

    fs::write(
        dataset.join("kb_corpus.jsonl"),
        concat!(
            r#"{"id":"KB-1","title":"Outlook login fails on Mac","text":"1. Quit Outlook\n2. Remove Exchange entries from Keychain Access\n3. Sign in again"}"#,
            "\n"
        ),
    )
    .unwrap();
    fs::write(
        dataset.join("managed_macs.jsonl"),
        r#"{"serial_number":"C02ABC12345","username":"jane.doe","full_name":"Jane Doe"}"#,
    )
    .unwrap();
    fs::write(
        dataset.join("wifi.md"),
        "# Wi-Fi drops\n\nForget the network and rejoin it.",
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/triage.sqlite"

[dataset]
root = "{root}/dataset"

[retrieval]
kb_limit = 5
"#,
        root = root.display()
    );
    let config_path = config_dir.join("triage.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_triage(config: &Path, args: &[&str]) -> (String, String, bool) {
    let output = Command::new(triage_binary())
        .arg("--config")
        .arg(config)
        .args(args)
        .output()
        .expect("failed to run triage binary");
    (
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
        output.status.success(),
    )
}

#[test]
fn test_init_creates_database() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_triage(&config, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/triage.sqlite").exists());

    // Idempotent.
    let (_, stderr, success) = run_triage(&config, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_import_then_unchanged() {
    let (_tmp, config) = setup_test_env();
    run_triage(&config, &["init"]);

    let (stdout, stderr, success) = run_triage(&config, &["import", "--json"]);
    assert!(success, "import failed: {}", stderr);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["imported_files"].as_array().unwrap().len(), 3);

    let (stdout, _, success) = run_triage(&config, &["import"]);
    assert!(success);
    assert!(stdout.contains("dataset unchanged"), "{}", stdout);
}

#[test]
fn test_search_lookup_and_link() {
    let (_tmp, config) = setup_test_env();
    run_triage(&config, &["import"]);

    let (stdout, stderr, success) =
        run_triage(&config, &["search", "outlook login", "--device", "mac"]);
    assert!(success, "search failed: {}", stderr);
    assert!(stdout.contains("Outlook login fails on Mac"));

    let (stdout, _, success) = run_triage(&config, &["search", "zzzzqqq"]);
    assert!(success);
    assert!(stdout.contains("No results."));

    let (stdout, _, success) = run_triage(
        &config,
        &["lookup", "C02 ABC 12345", "--field", "serial", "--json"],
    );
    assert!(success);
    let records: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(records.as_array().unwrap().len(), 1);

    let (_, stderr, success) = run_triage(&config, &["lookup", "x", "--field", "shoe_size"]);
    assert!(!success);
    assert!(stderr.contains("Unknown lookup field"));

    let (stdout, _, success) = run_triage(&config, &["link", "--serial", "c02abc12345"]);
    assert!(success);
    assert!(stdout.contains("confidence: 1.00"), "{}", stdout);
}

#[test]
fn test_chat_session_from_stdin() {
    let (_tmp, config) = setup_test_env();
    run_triage(&config, &["import"]);

    let mut child = Command::new(triage_binary())
        .arg("--config")
        .arg(&config)
        .args(["chat", "--json"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start chat");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(
            b"##INC42\nDevice: MacBook Pro\nSerial: C02ABC12345\nApp: Outlook\nSSID: Corp\nIssue: Outlook login fails\n\n",
        )
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let response: serde_json::Value =
        serde_json::from_str(stdout.lines().next().unwrap()).unwrap();
    assert_eq!(response["state"], "ready");
    assert_eq!(response["ticket_id"], "INC42");
    assert_eq!(response["citations"][0]["id"], "KB-1");

    let (stdout, _, success) = run_triage(&config, &["tickets"]);
    assert!(success);
    assert!(stdout.contains("INC42"));
}

#[test]
fn test_stats_and_templates() {
    let (_tmp, config) = setup_test_env();
    run_triage(&config, &["import"]);

    let (stdout, _, success) = run_triage(&config, &["stats", "--json"]);
    assert!(success);
    let stats: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(stats["articles"], 2);
    assert_eq!(stats["inventory_records"], 1);

    let (_, _, success) = run_triage(
        &config,
        &["templates", "set", "vpn", "Please reconnect to the VPN."],
    );
    assert!(success);
    let (stdout, _, _) = run_triage(&config, &["templates", "list"]);
    assert!(stdout.contains("vpn"));
    let (stdout, _, _) = run_triage(&config, &["templates", "delete", "vpn"]);
    assert!(stdout.contains("deleted"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_triage(Path::new("/nonexistent/triage.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
