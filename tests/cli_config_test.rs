use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

fn refindex(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_refindex"))
        .current_dir(dir)
        .env_remove("REFINDEX_ROOT")
        .args(args)
        .output()
        .expect("Failed to run refindex")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();

    let json = stdout_json(&refindex(root, &["-r", ".", "init", "app", "-s", "src"]));
    assert_eq!(json["unit"], "app");

    let project = std::fs::read_to_string(root.join(".refindex.json")).unwrap();
    assert!(project.contains("\"unit\": \"app\""));

    let settings = std::fs::read_to_string(root.join(".refindex/settings.toml")).unwrap();
    assert!(settings.contains("version = 1"));
    assert!(settings.contains("[query]"));

    // a second init needs --force
    assert!(!refindex(root, &["-r", ".", "init", "app"]).status.success());
    assert!(refindex(root, &["-r", ".", "init", "app", "--force"]).status.success());
}

#[test]
fn test_config_command() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join(".refindex")).unwrap();
    std::fs::write(
        root.join(".refindex/settings.toml"),
        "version = 2\n[query]\ntimeout_ms = 99\n",
    )
    .unwrap();

    let output = refindex(root, &["config"]);
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("version = 2"));
    assert!(stdout.contains("timeout_ms = 99"));
}

#[test]
fn test_index_then_query() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let source = root.join("src/demo/Main.java");
    std::fs::create_dir_all(source.parent().unwrap()).unwrap();
    std::fs::write(
        &source,
        "package demo;\n\n/** Entry point. */\npublic class Main {\n    Main self;\n}\n",
    )
    .unwrap();

    assert!(refindex(root, &["-r", ".", "init", "demo", "-s", "src"]).status.success());

    let report = stdout_json(&refindex(root, &["-r", ".", "index"]));
    assert_eq!(report[0]["unit"], "demo");
    assert!(report[0]["facts"].as_u64().unwrap() >= 2);
    assert!(root.join(".refindex.idx").exists());

    let hover = stdout_json(&refindex(
        root,
        &["-r", ".", "hover", "src/demo/Main.java", "4", "5"],
    ));
    assert_eq!(hover["status"], "ready");
    assert_eq!(hover["result"]["title"], "class demo.Main");
    assert_eq!(hover["result"]["doc"], "Entry point.");

    let refs = stdout_json(&refindex(root, &["-r", ".", "refs", "src/demo/Main.java", "3", "13"]));
    assert_eq!(refs["result"].as_array().unwrap().len(), 2);
}
