//! CSV ingestion unit tests

use hostprov::ingest::{RowRejection, WorkList, NO_VALID_ENTRIES};
use secrecy::ExposeSecret;

#[test]
fn test_header_is_discarded_and_rows_accepted_in_order() {
    let csv = "username,password\nalice,pw1\nbob,pw2\n";
    let work_list = WorkList::from_reader(csv.as_bytes());

    assert_eq!(work_list.usernames(), vec!["alice", "bob"]);
    assert_eq!(work_list.requests[1].password.expose_secret(), "pw2");
    assert!(work_list.diagnostics.is_empty());
    assert_eq!(work_list.batch_notice(), None);
}

#[test]
fn test_bad_rows_are_reported_with_line_numbers() {
    let csv = "user,pass\nalice,pw1\n,pw2\ncharlie,\nDave,pw4\nerin,pw5\n";
    let work_list = WorkList::from_reader(csv.as_bytes());

    assert_eq!(work_list.usernames(), vec!["alice", "erin"]);
    let lines: Vec<u64> = work_list.diagnostics.iter().map(|d| d.line).collect();
    assert_eq!(lines, vec![3, 4, 5]);
    assert_eq!(
        work_list.diagnostics[0].reason,
        RowRejection::MissingField("username")
    );
    assert_eq!(
        work_list.diagnostics[1].reason,
        RowRejection::MissingField("password")
    );
    assert_eq!(work_list.diagnostics[1].username.as_deref(), Some("charlie"));
    assert_eq!(work_list.diagnostics[2].reason, RowRejection::InvalidUsername);
}

#[test]
fn test_every_data_row_is_accepted_or_reported() {
    let csv = "u,p\nalice,pw\nsolo\nbob,pw,extra,columns\n,\n\"quoted\",\"p,w\"\n";
    let work_list = WorkList::from_reader(csv.as_bytes());

    assert_eq!(work_list.len() + work_list.diagnostics.len(), 5);
    assert_eq!(work_list.usernames(), vec!["alice", "bob", "quoted"]);
    assert_eq!(work_list.requests[2].password.expose_secret(), "p,w");
    assert!(matches!(
        work_list.diagnostics[0].reason,
        RowRejection::MalformedRow(_)
    ));
}

#[test]
fn test_fields_are_trimmed() {
    let csv = "u,p\n  alice , pw1 \n";
    let work_list = WorkList::from_reader(csv.as_bytes());
    assert_eq!(work_list.usernames(), vec!["alice"]);
    assert_eq!(work_list.requests[0].password.expose_secret(), "pw1");
}

#[test]
fn test_header_only_gives_notice() {
    let work_list = WorkList::from_reader("username,password\n".as_bytes());
    assert!(work_list.is_empty());
    assert!(work_list.diagnostics.is_empty());
    assert_eq!(work_list.batch_notice(), Some(NO_VALID_ENTRIES));
}

#[test]
fn test_empty_input_gives_notice() {
    let work_list = WorkList::from_reader("".as_bytes());
    assert!(work_list.is_empty());
    assert_eq!(work_list.batch_notice(), Some(NO_VALID_ENTRIES));
}

#[test]
fn test_diagnostics_never_carry_passwords() {
    let csv = "u,p\nBad Name,hunter2\n";
    let work_list = WorkList::from_reader(csv.as_bytes());
    let rendered = format!("{:?}", work_list.diagnostics);
    assert!(!rendered.contains("hunter2"));
}

#[test]
fn test_multiline_password_is_rejected() {
    let csv = "u,p\nalice,\"pw\nroot:owned\"\nbob,pw2\n";
    let work_list = WorkList::from_reader(csv.as_bytes());

    assert_eq!(work_list.usernames(), vec!["bob"]);
    assert_eq!(work_list.diagnostics.len(), 1);
    assert_eq!(work_list.diagnostics[0].line, 2);
    assert_eq!(work_list.diagnostics[0].username.as_deref(), Some("alice"));
    assert_eq!(work_list.diagnostics[0].reason, RowRejection::InvalidPassword);
}
