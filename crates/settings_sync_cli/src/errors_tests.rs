use super::*;
use std::io;

#[test]
fn test_auth_error_display() {
    let error = Error::Auth("no credentials".to_string());
    assert_eq!(error.to_string(), "Authentication error: no credentials");
}

#[test]
fn test_config_error_display() {
    let error = Error::Config("Configuration file not found".to_string());
    assert_eq!(
        error.to_string(),
        "Configuration error: Configuration file not found"
    );
}

#[test]
fn test_engine_error_display() {
    let error = Error::Engine("2 error(s)".to_string());
    assert_eq!(error.to_string(), "Settings sync failed: 2 error(s)");
}

#[test]
fn test_error_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Error>();
}

#[test]
fn test_load_file_error_display() {
    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error = Error::LoadFile(io_error);
    assert_eq!(error.to_string(), "Failed to load file.");
}

#[test]
fn test_parse_toml_file_error_display() {
    let parse_error = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
    let error = Error::ParseTomlFile(parse_error);
    assert_eq!(error.to_string(), "Failed to parse TOML configuration file.");
}
