// SPDX-FileCopyrightText: 2026 Lifeline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Lifeline configuration system.

use lifeline_config::diagnostic::ConfigError;
use lifeline_config::model::LifelineConfig;
use lifeline_config::{load_and_validate_str, load_config_from_path, load_config_from_str};
use serial_test::serial;

/// Every section with every known key deserializes.
#[test]
fn full_toml_deserializes() {
    let toml = r#"
[app]
log_level = "debug"
user_id = "user-42"

[checkin]
interval_secs = 43200
reminder_lead_secs = 1800
grace_period_secs = 900

[pings]
expiry_secs = 3600

[sync]
retry_initial_backoff_ms = 100
retry_max_backoff_ms = 1000
retry_max_attempts = 3
replay_max_attempts = 2
background_teardown_secs = 60
reconnect_delay_ms = 500

[storage]
database_path = "/tmp/lifeline-test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.app.log_level, "debug");
    assert_eq!(config.app.user_id.as_deref(), Some("user-42"));
    assert_eq!(config.checkin.interval_secs, 43_200);
    assert_eq!(config.checkin.reminder_lead_secs, 1_800);
    assert_eq!(config.checkin.grace_period_secs(), 900);
    assert_eq!(config.pings.expiry_secs, 3_600);
    assert_eq!(config.sync.retry_initial_backoff_ms, 100);
    assert_eq!(config.sync.retry_max_backoff_ms, 1_000);
    assert_eq!(config.sync.retry_max_attempts, 3);
    assert_eq!(config.sync.replay_max_attempts, 2);
    assert_eq!(config.sync.background_teardown_secs, 60);
    assert_eq!(config.sync.reconnect_delay_ms, 500);
    assert_eq!(config.storage.database_path, "/tmp/lifeline-test.db");
    assert!(!config.storage.wal_mode);
}

#[test]
fn missing_sections_use_defaults() {
    let config = load_config_from_str("").expect("empty TOML is valid");
    assert_eq!(config.app.log_level, "info");
    assert!(config.app.user_id.is_none());
    assert_eq!(config.checkin.interval_secs, 86_400);
    assert_eq!(config.checkin.reminder_lead_secs, 7_200);
    assert_eq!(config.sync.retry_max_attempts, 4);
    assert!(config.storage.wal_mode);
}

/// `LIFELINE_SYNC_RETRY_MAX_ATTEMPTS` lands on `sync.retry_max_attempts`; the
/// override is simulated with a dotted key to keep the test off process env.
#[test]
fn dotted_override_sets_underscored_key() {
    use figment::{
        Figment,
        providers::{Format, Serialized, Toml},
    };

    let config: LifelineConfig = Figment::new()
        .merge(Serialized::defaults(LifelineConfig::default()))
        .merge(Toml::string("[sync]\nretry_max_attempts = 2\n"))
        .merge(("sync.retry_max_attempts", 7))
        .extract()
        .expect("should merge override");

    assert_eq!(config.sync.retry_max_attempts, 7);
}

#[test]
fn config_file_on_disk_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifeline.toml");
    std::fs::write(&path, "[pings]\nexpiry_secs = 120\n").unwrap();

    let config = load_config_from_path(&path).expect("file should load");
    assert_eq!(config.pings.expiry_secs, 120);
}

#[test]
#[serial]
fn env_var_overrides_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lifeline.toml");
    std::fs::write(&path, "[sync]\nretry_max_attempts = 2\n").unwrap();

    // SAFETY: tests that write the environment are serialized.
    unsafe { std::env::set_var("LIFELINE_SYNC_RETRY_MAX_ATTEMPTS", "9") };
    let config = load_config_from_path(&path);
    unsafe { std::env::remove_var("LIFELINE_SYNC_RETRY_MAX_ATTEMPTS") };

    assert_eq!(config.expect("file should load").sync.retry_max_attempts, 9);
}

#[test]
fn unknown_top_level_section_rejected() {
    let err = load_config_from_str("[telemetry]\nenabled = true\n").expect_err("unknown section");
    assert!(err.to_string().contains("telemetry"));
}

#[test]
fn unknown_key_produces_suggestion() {
    let toml = "[checkin]\nintervl_secs = 60\n";
    let errors = load_and_validate_str(toml).expect_err("typo should fail");
    let suggestion = errors.iter().find_map(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => suggestion.clone(),
        _ => None,
    });
    assert_eq!(suggestion.as_deref(), Some("interval_secs"));
}

#[test]
fn wrong_type_produces_invalid_type() {
    let toml = "[sync]\nretry_max_attempts = \"many\"\n";
    let errors = load_and_validate_str(toml).expect_err("string for integer should fail");
    assert!(errors.iter().any(|e| matches!(
        e,
        ConfigError::InvalidType { key, .. } if key.contains("retry_max_attempts")
    )));
}

#[test]
fn validation_runs_after_successful_parse() {
    let toml = "[checkin]\ninterval_secs = 600\nreminder_lead_secs = 900\n";
    let errors = load_and_validate_str(toml).expect_err("lead beyond interval should fail");
    assert!(errors.iter().any(
        |e| matches!(e, ConfigError::Validation { key, .. } if key == "checkin.reminder_lead_secs")
    ));
}

#[test]
fn config_error_renders_with_miette() {
    use miette::{Diagnostic, GraphicalReportHandler};

    let error = ConfigError::UnknownKey {
        key: "expiry_sec".to_string(),
        section: "[pings]".to_string(),
        suggestion: Some("expiry_secs".to_string()),
        valid_keys: "expiry_secs".to_string(),
        span: None,
        src: None,
    };
    assert!(error.code().is_some());
    let help = error.help().expect("help text").to_string();
    assert!(help.contains("did you mean `expiry_secs`"));

    let mut buf = String::new();
    GraphicalReportHandler::new()
        .render_report(&mut buf, &error)
        .expect("should render");
    assert!(buf.contains("expiry_sec"));
}
