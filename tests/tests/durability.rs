//! Durability: committed state survives restart; checkpoints fold the
//! log; torn tails are discarded.

use mew_session::{Database, Session};
use mew_tests::prelude::*;

const ONTOLOGY: &str = "
    node Task { title: String [required], priority: Int? }
    node Project { name: String [required] }
    edge belongs_to(t: Task, p: Project)
";

fn open_session(dir: &std::path::Path) -> (std::sync::Arc<Database>, Session) {
    let db = Database::open(dir).expect("database opens");
    let session = Session::new(db.clone());
    (db, session)
}

#[test]
fn test_committed_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN p: Project { name = \"P\" }").unwrap();
        session.execute("SPAWN t: Task { title = \"T\", priority = 3 }").unwrap();
        session.execute("LINK belongs_to(t, p)").unwrap();
        session.execute("SET t.priority = 9").unwrap();
    }

    let (_db, mut session) = open_session(dir.path());
    let check = session
        .execute("MATCH t: Task, p: Project, belongs_to(t, p) RETURN t.title, t.priority, p.name")
        .unwrap();
    assert_eq!(
        rows(&check),
        &vec![vec![string("T"), int(9), string("P")]]
    );
}

#[test]
fn test_uncommitted_transaction_is_not_replayed() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN keep: Task { title = \"kept\" }").unwrap();
        session.execute("BEGIN").unwrap();
        session.execute("SPAWN lost: Task { title = \"lost\" }").unwrap();
        // Dropped without COMMIT: the buffer never reached the WAL.
    }

    let (_db, mut session) = open_session(dir.path());
    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("kept")]]);
}

#[test]
fn test_kill_survives_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN a: Task { title = \"a\" }").unwrap();
        session.execute("SPAWN b: Task { title = \"b\" }").unwrap();
        session.execute("KILL a").unwrap();
    }

    let (_db, mut session) = open_session(dir.path());
    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("b")]]);
}

#[test]
fn test_checkpoint_then_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN t: Task { title = \"snapshotted\" }").unwrap();
        db.checkpoint().unwrap();
        // Post-checkpoint work lands in the fresh log.
        session.execute("SPAWN u: Task { title = \"after\" }").unwrap();
    }

    let (_db, mut session) = open_session(dir.path());
    let check = session
        .execute("MATCH t: Task RETURN t.title ORDER BY t.title ASC")
        .unwrap();
    assert_eq!(
        rows(&check),
        &vec![vec![string("after")], vec![string("snapshotted")]]
    );
}

#[test]
fn test_torn_wal_tail_is_discarded() {
    let dir = tempfile::tempdir().unwrap();

    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN t: Task { title = \"whole\" }").unwrap();
    }

    // Simulate a crash mid-append.
    {
        use std::io::Write;
        let mut wal = std::fs::OpenOptions::new()
            .append(true)
            .open(dir.path().join("wal.log"))
            .unwrap();
        wal.write_all(b"{\"lsn\":9999,\"prev\":null,\"crc\":42,\"ent").unwrap();
    }

    let (_db, mut session) = open_session(dir.path());
    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("whole")]]);
}

#[test]
fn test_ids_do_not_collide_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    let first_id;
    {
        let (db, mut session) = open_session(dir.path());
        db.load_ontology(ONTOLOGY).unwrap();
        session.execute("SPAWN t: Task { title = \"first\" }").unwrap();
        first_id = session.binding("t").unwrap().as_node().unwrap();
    }

    let (_db, mut session) = open_session(dir.path());
    session.execute("SPAWN u: Task { title = \"second\" }").unwrap();
    let second_id = session.binding("u").unwrap().as_node().unwrap();
    assert!(second_id > first_id);

    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert_eq!(rows(&check).len(), 2);
}
