//! Registry unit tests

use std::sync::Arc;

use hostprov::errors::ProvisionError;
use hostprov::filesys::file::File;
use hostprov::registry::{HostRecord, Registry};
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;

fn record(user: &str, password: &str) -> HostRecord {
    HostRecord::new(user, SecretString::from(password.to_string()))
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_registry_survives_reload() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");

    let registry = Registry::empty(File::new(&path));
    registry.put("10.0.0.5", record("root", "s3cret")).await.unwrap();
    registry
        .append_accounts("10.0.0.5", &names(&["alice", "bob"]))
        .await
        .unwrap();

    let reloaded = Registry::load(File::new(&path)).await;
    let host = reloaded.get("10.0.0.5").await.unwrap();
    assert_eq!(host.root_username, "root");
    assert_eq!(host.root_password.expose_secret(), "s3cret");
    assert_eq!(host.accounts, names(&["alice", "bob"]));
}

#[tokio::test]
async fn test_append_keeps_order_and_duplicates() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::empty(File::new(dir.path().join("registry.json")));
    registry.put("h1", record("root", "pw")).await.unwrap();

    registry.append_accounts("h1", &names(&["alice", "bob"])).await.unwrap();
    let host = registry
        .append_accounts("h1", &names(&["carol", "alice"]))
        .await
        .unwrap();

    assert_eq!(host.accounts, names(&["alice", "bob", "carol", "alice"]));
}

#[tokio::test]
async fn test_reregistering_resets_accounts() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::empty(File::new(dir.path().join("registry.json")));
    registry.put("h1", record("root", "old")).await.unwrap();
    registry.append_accounts("h1", &names(&["alice"])).await.unwrap();

    registry.put("h1", record("admin", "new")).await.unwrap();

    let host = registry.get("h1").await.unwrap();
    assert_eq!(host.root_username, "admin");
    assert_eq!(host.root_password.expose_secret(), "new");
    assert!(host.accounts.is_empty());
}

#[tokio::test]
async fn test_missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::load(File::new(dir.path().join("registry.json"))).await;
    assert!(registry.list().await.is_empty());
}

#[tokio::test]
async fn test_corrupt_file_is_moved_aside() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let registry = Registry::load(File::new(&path)).await;
    assert!(registry.list().await.is_empty());
    assert!(!path.exists());

    let quarantined: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("registry.json.corrupt-"))
        .collect();
    assert_eq!(quarantined.len(), 1);

    let content = std::fs::read(dir.path().join(&quarantined[0])).unwrap();
    assert_eq!(content, b"{ not json");
}

#[tokio::test]
async fn test_unknown_host_is_not_registered() {
    let dir = TempDir::new().unwrap();
    let registry = Registry::empty(File::new(dir.path().join("registry.json")));

    assert!(matches!(
        registry.get("nowhere").await,
        Err(ProvisionError::HostNotRegistered(id)) if id == "nowhere"
    ));
    assert!(matches!(
        registry.append_accounts("nowhere", &names(&["alice"])).await,
        Err(ProvisionError::HostNotRegistered(_))
    ));
}

#[tokio::test]
async fn test_failed_save_rolls_back() {
    let dir = TempDir::new().unwrap();
    // The parent of the registry file is a regular file, so every save fails
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"").unwrap();
    let registry = Registry::empty(File::new(blocker.join("registry.json")));

    let result = registry.put("h1", record("root", "pw")).await;
    assert!(matches!(result, Err(ProvisionError::StorageError(_))));
    assert!(registry.list().await.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn test_registry_file_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    let registry = Registry::empty(File::new(&path));
    registry.put("h1", record("root", "pw")).await.unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_appends_are_all_kept() {
    const TASKS: usize = 8;
    const PER_TASK: usize = 5;

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    let registry = Arc::new(Registry::empty(File::new(&path)));
    registry.put("h1", record("root", "pw")).await.unwrap();

    let handles: Vec<_> = (0..TASKS)
        .map(|task| {
            let registry = registry.clone();
            tokio::spawn(async move {
                for i in 0..PER_TASK {
                    let name = format!("user{}_{}", task, i);
                    registry.append_accounts("h1", &[name]).await.unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let reloaded = Registry::load(File::new(&path)).await;
    let mut accounts = reloaded.get("h1").await.unwrap().accounts;
    assert_eq!(accounts.len(), TASKS * PER_TASK);
    accounts.sort();
    accounts.dedup();
    assert_eq!(accounts.len(), TASKS * PER_TASK);
}

#[tokio::test]
async fn test_save_writes_current_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("registry.json");
    let registry = Registry::empty(File::new(&path));
    registry.put("h1", record("root", "pw")).await.unwrap();
    registry.append_accounts("h1", &names(&["alice"])).await.unwrap();

    std::fs::remove_file(&path).unwrap();
    registry.save().await.unwrap();

    let reloaded = Registry::load(File::new(&path)).await;
    assert_eq!(reloaded.get("h1").await.unwrap().accounts, names(&["alice"]));
}
