use super::{apply_env, apply_file, normalize_database_url, Settings};

use std::collections::HashMap;

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
    assert_eq!(
        normalize_database_url("sqlite:calendar.db"),
        "sqlite://calendar.db"
    );
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[tokio::test]
async fn normalized_plain_path_opens_in_a_new_directory() {
    let temp_root = tempfile::tempdir().expect("tempdir");
    let db_path = temp_root.path().join("data").join("calendar.db");

    let url = normalize_database_url(db_path.to_string_lossy().as_ref());
    assert!(url.starts_with("sqlite://"));
    assert!(!temp_root.path().join("data").exists());

    let storage = storage::Storage::new(&url).await.expect("open store");
    storage.health_check().await.expect("health check");
    assert!(db_path.exists());
}

#[test]
fn file_values_override_defaults() {
    let mut settings = Settings::default();
    apply_file(
        &mut settings,
        "database_url = \"sqlite://team.db\"\nmail_from = \"team@example.com\"\n",
    );
    assert_eq!(settings.database_url, "sqlite://team.db");
    assert_eq!(settings.mail_from, "team@example.com");
    assert_eq!(settings.log_filter, "info");
}

#[test]
fn malformed_file_is_ignored() {
    let mut settings = Settings::default();
    apply_file(&mut settings, "database_url = [1, 2]");
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_wins_over_calendar_env() {
    let env: HashMap<&str, &str> = HashMap::from([
        ("CALENDAR_DATABASE_URL", "sqlite://one.db"),
        ("APP__DATABASE_URL", "sqlite://two.db"),
        ("CALENDAR_LOG", "debug"),
    ]);
    let mut settings = Settings::default();
    apply_env(&mut settings, |key| env.get(key).map(|v| v.to_string()));

    assert_eq!(settings.database_url, "sqlite://two.db");
    assert_eq!(settings.log_filter, "debug");
    assert_eq!(settings.mail_from, Settings::default().mail_from);
}
