//! Provisioner unit tests

use std::sync::Arc;

use hostprov::errors::ProvisionError;
use hostprov::filesys::file::File;
use hostprov::ingest::NO_VALID_ENTRIES;
use hostprov::provision::report::ReportEntry;
use hostprov::provision::RecordPolicy;
use hostprov::registry::Registry;
use hostprov::script::{fail_marker, ok_marker};
use hostprov::ssh::ExecFailure;
use secrecy::SecretString;
use tempfile::TempDir;

use crate::common::{provisioner, temp_registry, Behavior, ScriptedShell};

const HOST: &str = "10.0.0.5";

fn root_password() -> SecretString {
    SecretString::from("rootpw".to_string())
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_scenario_two_accounts_confirmed() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry.clone(), shell.clone(), RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let csv = "username,password\nalice,pw1\nbob,pw2\n";
    let report = provisioner.provision(HOST, csv.as_bytes()).await.unwrap();

    assert!(report.is_success());
    assert_eq!(shell.calls(), 1);
    assert_eq!(shell.logins(), vec![format!("root@{}", HOST)]);
    assert_eq!(shell.scripts()[0].lines().count(), 2);
    assert_eq!(report.attempted, names(&["alice", "bob"]));
    assert_eq!(report.recorded, names(&["alice", "bob"]));
    assert_eq!(
        registry.get(HOST).await.unwrap().accounts,
        names(&["alice", "bob"])
    );
}

#[tokio::test]
async fn test_confirmed_policy_skips_failed_accounts() {
    let (_dir, registry) = temp_registry();
    let output = format!("{}\n{}\n", ok_marker("alice"), fail_marker("bob")).into_bytes();
    let shell = ScriptedShell::new(Behavior::Fixed(output, Ok(())));
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,pw1\nbob,pw2\n".as_bytes())
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.recorded, names(&["alice"]));
    assert_eq!(registry.get(HOST).await.unwrap().accounts, names(&["alice"]));
}

#[tokio::test]
async fn test_attempted_policy_records_every_accepted_row() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::Fixed(Vec::new(), Ok(())));
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Attempted);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let csv = "username,password\nalice,pw1\n,pw2\ncharlie,\ndave,pw4\n";
    let report = provisioner.provision(HOST, csv.as_bytes()).await.unwrap();

    assert_eq!(report.row_diagnostics.len(), 2);
    assert_eq!(report.recorded, names(&["alice", "dave"]));
    assert_eq!(
        registry.get(HOST).await.unwrap().accounts,
        names(&["alice", "dave"])
    );
}

#[tokio::test]
async fn test_unregistered_host_never_connects() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry, shell.clone(), RecordPolicy::Confirmed);

    let result = provisioner
        .provision("10.9.9.9", "u,p\nalice,pw1\n".as_bytes())
        .await;

    assert!(matches!(result, Err(ProvisionError::HostNotRegistered(id)) if id == "10.9.9.9"));
    assert_eq!(shell.calls(), 0);
}

#[tokio::test]
async fn test_unreachable_host_records_nothing_when_confirmed() {
    let (_dir, registry) = temp_registry();
    let failure = ExecFailure::Dial("connection refused".to_string());
    let shell = ScriptedShell::new(Behavior::Fixed(Vec::new(), Err(failure.clone())));
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,pw1\n".as_bytes())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.execution_error, Some(failure));
    assert!(report.recorded.is_empty());
    assert!(registry.get(HOST).await.unwrap().accounts.is_empty());
    assert!(report
        .render()
        .contains("Remote script execution failed: dial failure: connection refused"));
}

#[tokio::test]
async fn test_unreachable_host_still_records_when_attempted() {
    let (_dir, registry) = temp_registry();
    let failure = ExecFailure::Dial("connection refused".to_string());
    let shell = ScriptedShell::new(Behavior::Fixed(Vec::new(), Err(failure)));
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Attempted);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,pw1\n".as_bytes())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(registry.get(HOST).await.unwrap().accounts, names(&["alice"]));
}

#[tokio::test]
async fn test_empty_work_list_reports_notice() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry.clone(), shell.clone(), RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "username,password\n".as_bytes())
        .await
        .unwrap();

    assert_eq!(report.batch_notice.as_deref(), Some(NO_VALID_ENTRIES));
    assert_eq!(shell.calls(), 1);
    assert_eq!(shell.scripts()[0], "");
    assert!(registry.get(HOST).await.unwrap().accounts.is_empty());
}

#[tokio::test]
async fn test_non_root_login_runs_with_sudo() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry, shell.clone(), RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "admin", root_password()).await.unwrap();

    provisioner
        .provision(HOST, "u,p\nalice,pw1\n".as_bytes())
        .await
        .unwrap();

    assert!(shell.scripts()[0].contains("sudo useradd"));
}

#[tokio::test]
async fn test_registry_failure_is_reported() {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let registry = Arc::new(Registry::empty(File::new(data_dir.join("registry.json"))));
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    // Replace the data directory with a regular file so the next save fails
    std::fs::remove_dir_all(&data_dir).unwrap();
    std::fs::write(&data_dir, b"").unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,pw1\n".as_bytes())
        .await
        .unwrap();

    assert!(!report.is_success());
    assert!(report.execution_error.is_none());
    assert!(report.registry_error.is_some());
    assert!(report.recorded.is_empty());
    assert!(registry.get(HOST).await.unwrap().accounts.is_empty());

    let entries = report.entries();
    assert!(matches!(entries.last(), Some(ReportEntry::RegistryFailure(_))));
}

#[tokio::test]
async fn test_register_rejects_blank_fields() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Confirmed);

    let result = provisioner.register_host("  ", "root", root_password()).await;
    assert!(matches!(result, Err(ProvisionError::ValidationError(_))));

    let result = provisioner.register_host(HOST, "", root_password()).await;
    assert!(matches!(result, Err(ProvisionError::ValidationError(_))));

    assert!(registry.list().await.is_empty());
}

#[tokio::test]
async fn test_report_passwords_stay_hidden() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry, shell, RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,hunter2\nBad,hunter3\n".as_bytes())
        .await
        .unwrap();

    let rendered = report.render();
    assert!(!rendered.contains("hunter2"));
    assert!(!rendered.contains("hunter3"));
    assert!(!rendered.contains("rootpw"));
}

#[tokio::test]
async fn test_multiline_password_never_reaches_host() {
    let (_dir, registry) = temp_registry();
    let shell = ScriptedShell::new(Behavior::ConfirmAll);
    let provisioner = provisioner(registry.clone(), shell.clone(), RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,\"pw\nroot:owned\"\n".as_bytes())
        .await
        .unwrap();

    assert_eq!(report.row_diagnostics.len(), 1);
    assert_eq!(report.batch_notice.as_deref(), Some(NO_VALID_ENTRIES));
    assert!(!shell.scripts()[0].contains("root:owned"));
    assert!(registry.get(HOST).await.unwrap().accounts.is_empty());
}

#[tokio::test]
async fn test_repeated_username_recorded_per_confirmation() {
    let (_dir, registry) = temp_registry();
    let output = format!("{}\n{}\n", ok_marker("alice"), fail_marker("alice")).into_bytes();
    let shell = ScriptedShell::new(Behavior::Fixed(output, Ok(())));
    let provisioner = provisioner(registry.clone(), shell, RecordPolicy::Confirmed);
    provisioner.register_host(HOST, "root", root_password()).await.unwrap();

    let report = provisioner
        .provision(HOST, "u,p\nalice,pw1\nalice,pw2\n".as_bytes())
        .await
        .unwrap();

    assert_eq!(report.attempted, names(&["alice", "alice"]));
    assert_eq!(report.recorded, names(&["alice"]));
    assert_eq!(registry.get(HOST).await.unwrap().accounts, names(&["alice"]));
}
