use cloud_streamer::{StreamError, StreamerConfig};
use std::io::Write;

#[test]
fn test_load_example_config() {
    let config = StreamerConfig::from_file("cloud_streamer.example.yaml");
    assert!(config.is_ok(), "Failed to load example config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.listen_address, "0.0.0.0:3000");
    assert_eq!(config.content_type, "video/mp4");
    assert_eq!(config.relay_buffer_chunks, 16);
    assert_eq!(config.upstream_read_timeout_secs, 60);
    assert!(config.metrics_endpoint);
    assert!(config.auth.is_some());
    assert!(config.active_auth().is_none());
}

#[test]
fn test_load_minimal_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "content_type: \"video/x-matroska\"").unwrap();

    let config = StreamerConfig::from_file(file.path()).unwrap();
    assert_eq!(config.content_type, "video/x-matroska");
    // Defaults fill the rest
    assert_eq!(config.listen_address, "0.0.0.0:3000");
    assert_eq!(config.resolve_timeout_secs, 10);
    assert_eq!(config.drain_timeout_secs, 5);
    assert_eq!(config.log_level, "info");
}

#[test]
fn test_load_invalid_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "relay_buffer_chunks: 0").unwrap();

    let config = StreamerConfig::from_file(file.path());
    assert!(matches!(config, Err(StreamError::ConfigError(_))));
}

#[test]
fn test_load_unparseable_config() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "listen_address: [not, a, string").unwrap();

    let config = StreamerConfig::from_file(file.path());
    assert!(matches!(config, Err(StreamError::ConfigError(msg)) if msg.contains("parse")));
}
