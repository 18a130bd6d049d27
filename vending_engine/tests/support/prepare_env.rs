use log::*;
use tempfile::TempDir;
use vending_engine::SqliteStore;

/// Creates a migrated SQLite store in a fresh temporary directory. The database lives as long as the returned
/// directory.
pub async fn prepare_test_env(max_connections: u32) -> (SqliteStore, TempDir) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    let dir = tempfile::tempdir().expect("Error creating temporary directory");
    let url = format!("sqlite://{}", dir.path().join("vending_test.db").display());
    let store = SqliteStore::new_with_url(&url, max_connections).await.expect("Error creating connection to database");
    store.migrate().await.expect("Error running DB migrations");
    debug!("🚀️ Test database ready at {url}");
    (store, dir)
}
