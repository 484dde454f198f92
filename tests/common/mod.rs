use uuid::Uuid;

/// Generate a unique test ID for isolating test data
pub fn generate_test_id() -> String {
    Uuid::new_v4().to_string().replace('-', "")
}

/// Create a temporary data directory for one test store
pub fn create_test_dir(prefix: &str) -> tempfile::TempDir {
    tempfile::Builder::new()
        .prefix(&format!("driftq_{prefix}_"))
        .tempdir()
        .expect("Failed to create temporary directory")
}

/// Create a unique topic name for testing
pub fn unique_topic(prefix: &str) -> String {
    format!("{prefix}_topic_{}", generate_test_id())
}

/// Create a unique consumer group name for testing
pub fn unique_group(prefix: &str) -> String {
    format!("{prefix}_group_{}", generate_test_id())
}
