use feedit::config::FeedConfig;
use std::path::Path;

#[test]
fn test_load_sample_config() {
    let config = FeedConfig::from_file("feedit.yaml");
    assert!(config.is_ok(), "Failed to load sample config: {:?}", config.err());

    let config = config.unwrap();
    assert_eq!(config.listen_address, "127.0.0.1:8080");
    assert_eq!(config.default_window_size, 1024000);
    assert_eq!(config.min_buffer_size, 1048576);
    assert_eq!(config.max_buffer_size, 10485760);
    assert_eq!(config.cache_dir, Path::new(".feedit"));
    assert!(config.enable_bitrate_cache);
    assert_eq!(config.probe.program, "ffprobe");

    let metrics = config.metrics_endpoint.unwrap();
    assert!(metrics.enabled);
    assert_eq!(metrics.address, "127.0.0.1:9090");
}

#[test]
fn test_load_minimal_config() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("minimal.yaml");
    std::fs::write(&file, "default_window_size: 524288\n").unwrap();

    let config = FeedConfig::from_file(&file).unwrap();
    assert_eq!(config.default_window_size, 524288);
    // Defaults are applied
    assert_eq!(config.min_buffer_size, 1024 * 1024);
    assert_eq!(config.max_buffer_size, 10 * 1024 * 1024);
    assert!(config.enable_bitrate_cache);
    assert!(!config.debug);
    assert!(config.metrics_endpoint.is_none());
}

#[test]
fn test_load_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("invalid.yaml");
    std::fs::write(&file, "min_buffer_size: 2048\nmax_buffer_size: 1024\n").unwrap();

    let config = FeedConfig::from_file(&file);
    assert!(config.is_err(), "Should fail validation for min > max");
}

#[test]
fn test_load_malformed_yaml() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("broken.yaml");
    std::fs::write(&file, "default_window_size: [not, a, number]\n").unwrap();

    assert!(FeedConfig::from_file(&file).is_err());
}

#[test]
fn test_load_nonexistent_file() {
    let config = FeedConfig::from_file("nonexistent.yaml");
    assert!(config.is_err(), "Should fail when file doesn't exist");
}
