//! Transaction semantics: atomicity, read-your-writes, savepoints,
//! auto-commit, isolation.

use mew_tests::prelude::*;

const ONTOLOGY: &str = "
    node Task { title: String [required], priority: Int? [default: 0] }
";

#[test]
fn test_rollback_discards_everything() {
    let (_db, mut session) = engine(ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN t: Task { title = \"gone\" }").unwrap();
    session.execute("ROLLBACK").unwrap();

    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert!(rows(&check).is_empty());
}

#[test]
fn test_read_your_writes_inside_transaction() {
    let (_db, mut session) = engine(ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN t: Task { title = \"mine\" }").unwrap();

    // The uncommitted node is visible to this session's queries.
    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("mine")]]);

    // Updates are visible too.
    session.execute("SET t.priority = 7").unwrap();
    let check = session.execute("MATCH t: Task RETURN t.priority").unwrap();
    assert_eq!(rows(&check), &vec![vec![int(7)]]);

    session.execute("COMMIT").unwrap();
}

#[test]
fn test_uncommitted_work_invisible_to_other_sessions() {
    let (db, mut writer) = engine(ONTOLOGY);
    let mut reader = Session::new(db.clone());

    writer.execute("BEGIN").unwrap();
    writer.execute("SPAWN t: Task { title = \"pending\" }").unwrap();

    let check = reader.execute("MATCH t: Task RETURN t").unwrap();
    assert!(rows(&check).is_empty());

    writer.execute("COMMIT").unwrap();
    let check = reader.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&check).len(), 1);
}

#[test]
fn test_savepoint_and_rollback_to() {
    let (_db, mut session) = engine(ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN keep: Task { title = \"keep\" }").unwrap();
    session.execute("SAVEPOINT sp1").unwrap();
    session.execute("SPAWN drop_me: Task { title = \"drop\" }").unwrap();

    session.execute("ROLLBACK TO sp1").unwrap();
    session.execute("COMMIT").unwrap();

    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("keep")]]);
}

#[test]
fn test_auto_commit_wraps_bare_statements() {
    let (db, mut session) = engine(ONTOLOGY);
    assert!(!session.in_transaction());

    session.execute("SPAWN t: Task { title = \"auto\" }").unwrap();
    assert!(!session.in_transaction());

    // A second session sees the committed result immediately.
    let mut other = Session::new(db.clone());
    let check = other.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&check).len(), 1);
}

#[test]
fn test_commit_without_begin_fails() {
    let (_db, mut session) = engine(ONTOLOGY);
    let err = session.execute("COMMIT").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TransactionError);
}

#[test]
fn test_constraint_violation_aborts_explicit_transaction() {
    let (_db, mut session) = engine(ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN a: Task { title = \"first\" }").unwrap();
    let err = session.execute("SPAWN b: Task { }").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ConstraintViolation);

    // The whole transaction is gone, including the first spawn.
    assert!(!session.in_transaction());
    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert!(rows(&check).is_empty());
}

#[test]
fn test_serializable_conflict_aborts() {
    let (db, mut a) = engine(ONTOLOGY);
    let mut b = Session::new(db.clone());

    a.execute("SPAWN seed: Task { title = \"seed\" }").unwrap();

    // A begins serializable and reads the Task extent.
    a.execute("BEGIN SERIALIZABLE").unwrap();
    let seen = a.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&seen).len(), 1);
    a.execute("SPAWN mine: Task { title = \"a\" }").unwrap();

    // B commits a new Task concurrently.
    b.execute("SPAWN theirs: Task { title = \"b\" }").unwrap();

    // A's read set (the Task extent) was invalidated.
    let err = a.execute("COMMIT").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::TransactionError);
    assert_eq!(err.code(), "E6002");
}

#[test]
fn test_read_committed_is_not_invalidated_by_concurrent_commits() {
    let (db, mut a) = engine(ONTOLOGY);
    let mut b = Session::new(db.clone());

    a.execute("BEGIN").unwrap();
    let _ = a.execute("MATCH t: Task RETURN t").unwrap();
    a.execute("SPAWN mine: Task { title = \"a\" }").unwrap();

    b.execute("SPAWN theirs: Task { title = \"b\" }").unwrap();

    a.execute("COMMIT").unwrap();
    let check = a.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&check).len(), 2);
}

#[test]
fn test_statement_level_error_keeps_explicit_transaction_alive() {
    let (_db, mut session) = engine(ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN t: Task { title = \"keep\" }").unwrap();

    // Type errors abort the statement, not the transaction.
    let err = session.execute("MATCH x: Mystery RETURN x").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::NotFound);
    assert!(session.in_transaction());

    session.execute("COMMIT").unwrap();
    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&check).len(), 1);
}

#[test]
fn test_dry_run_reports_without_applying() {
    let (_db, mut session) = engine(ONTOLOGY);

    let outcome = session
        .execute("DRY RUN SPAWN t: Task { title = \"phantom\" }")
        .unwrap();
    let mutation = outcome.as_mutation().expect("mutation outcome");
    assert_eq!(mutation.counts.created, 1);
    assert!(mutation.warnings.iter().any(|w| w.contains("dry run")));

    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert!(rows(&check).is_empty());
}
