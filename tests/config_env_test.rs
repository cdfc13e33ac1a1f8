use refindex::Settings;
use std::env;
use tempfile::TempDir;

#[test]
fn test_env_override_with_nested_keys() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(&config_path, "[query]\ntimeout_ms = 100\nretry_after_ms = 7\n").unwrap();

    unsafe {
        // Double underscore separates nested levels
        env::set_var("RI_QUERY__TIMEOUT_MS", "42");
        env::set_var("RI_INDEXING__WORKER_THREADS", "3");
        env::set_var("RI_LOGGING__DEFAULT", "debug");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("RI_QUERY__TIMEOUT_MS");
        env::remove_var("RI_INDEXING__WORKER_THREADS");
        env::remove_var("RI_LOGGING__DEFAULT");
    }

    // environment wins over the file
    assert_eq!(settings.query.timeout_ms, 42);
    // the file wins over defaults
    assert_eq!(settings.query.retry_after_ms, 7);
    assert_eq!(settings.indexing.worker_threads, 3);
    assert_eq!(settings.logging.default, "debug");
}
