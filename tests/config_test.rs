use std::io::Write;

use gitter::config::{self, DEFAULT_STREAM_URL};
use gitter::{GitterError, ReconnectPolicy};

/// A config file only needs the fields it overrides.
#[test]
fn load_partial_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
api_url: "http://localhost:5000/v1"
keepalive: "."
reconnect:
  max_attempts: 10
  max_delay_ms: 2000
"#
    )
    .unwrap();

    let cfg = config::load_from(file.path()).unwrap();
    assert_eq!(cfg.api_url, "http://localhost:5000/v1");
    assert_eq!(cfg.stream_url, DEFAULT_STREAM_URL);
    assert_eq!(cfg.keepalive, '.');
    assert_eq!(
        cfg.reconnect,
        ReconnectPolicy {
            max_attempts: 10,
            initial_delay_ms: 500,
            max_delay_ms: 2000,
        }
    );
    assert!(cfg.request_timeout().is_none());
}

#[test]
fn missing_file_is_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = config::load_from(&dir.path().join("nope.yaml")).unwrap_err();
    assert!(matches!(err, GitterError::Config(_)));
}

#[test]
fn invalid_yaml_is_config_error() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "reconnect: [1, 2").unwrap();
    let err = config::load_from(file.path()).unwrap_err();
    assert!(matches!(err, GitterError::Config(_)));
}

/// Config round-trips through YAML without losing the timeout pass-through.
#[test]
fn config_round_trip() {
    let cfg = gitter::Config::default()
        .api_url("https://gitter.example/api/v1")
        .request_timeout_secs(15);
    let yaml = serde_yaml::to_string(&cfg).unwrap();
    let parsed: gitter::Config = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed, cfg);
    assert_eq!(
        parsed.request_timeout(),
        Some(std::time::Duration::from_secs(15))
    );
}
