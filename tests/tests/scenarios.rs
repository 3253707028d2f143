//! The literal end-to-end scenarios: required attributes, acyclic edges,
//! cascade kills, reactive rules with a pinned clock, rule quiescence
//! under action budgets, and grouped aggregation.

use mew_core::EngineLimits;
use mew_tests::prelude::*;

// ==================== S1: required attribute ====================

const PERSON_ONTOLOGY: &str = "node Person { name: String [required], age: Int? }";

#[test]
fn s1_spawn_with_required_attribute_succeeds() {
    let (_db, mut session) = engine(PERSON_ONTOLOGY);

    let outcome = session.execute("SPAWN p: Person { name = \"A\" }").unwrap();
    let mutation = outcome.as_mutation().expect("mutation outcome");
    assert!(mutation.success);
    assert_eq!(mutation.counts.created, 1);
}

#[test]
fn s1_spawn_missing_required_attribute_fails() {
    let (_db, mut session) = engine(PERSON_ONTOLOGY);

    let err = session.execute("SPAWN p: Person { age = 5 }").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ConstraintViolation);
    assert!(err.envelope().message.contains("name"));

    // Nothing leaked into the store.
    let check = session.execute("MATCH p: Person RETURN p").unwrap();
    assert!(rows(&check).is_empty());
}

// ==================== S2: acyclic edge ====================

const TASK_DAG_ONTOLOGY: &str = "
    node Task { title: String [required] }
    edge depends_on(a: Task, b: Task) [acyclic]
";

#[test]
fn s2_acyclic_edge_rejects_cycle() {
    let (_db, mut session) = engine(TASK_DAG_ONTOLOGY);

    session.execute("SPAWN t1: Task { title = \"T1\" }").unwrap();
    session.execute("SPAWN t2: Task { title = \"T2\" }").unwrap();
    session.execute("SPAWN t3: Task { title = \"T3\" }").unwrap();

    session.execute("LINK depends_on(t1, t2)").unwrap();
    session.execute("LINK depends_on(t2, t3)").unwrap();

    let err = session.execute("LINK depends_on(t3, t1)").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::ConstraintViolation);
    assert!(err.envelope().message.to_lowercase().contains("acyclic"));
}

// ==================== S3: cascade kill ====================

const CASCADE_ONTOLOGY: &str = "
    node Task { title: String [required] }
    node Project { name: String [required] }
    edge belongs_to(t: Task, p: Project) [on_kill_target: cascade]
";

#[test]
fn s3_kill_project_cascades_to_tasks() {
    let (_db, mut session) = engine(CASCADE_ONTOLOGY);

    session.execute("SPAWN p1: Project { name = \"P1\" }").unwrap();
    for i in 1..=3 {
        session
            .execute(&format!("SPAWN t{i}: Task {{ title = \"T{i}\" }}"))
            .unwrap();
        session.execute(&format!("LINK belongs_to(t{i}, p1)")).unwrap();
    }

    let project = session.binding("p1").unwrap();
    let outcome = session
        .execute(&format!("KILL #{}", project.as_node().unwrap().raw()))
        .unwrap();
    let mutation = outcome.as_mutation().expect("mutation outcome");

    // One primary victim, three cascaded tasks, three unlinked edges.
    assert_eq!(mutation.counts.cascaded, 3);
    assert_eq!(mutation.counts.deleted, 7); // 4 nodes + 3 edges

    let check = session.execute("MATCH t: Task RETURN t").unwrap();
    assert!(rows(&check).is_empty());
    let check = session.execute("MATCH p: Project RETURN p").unwrap();
    assert!(rows(&check).is_empty());
}

// ==================== S4: reactive rule with pinned clock ====================

const AUTO_TS_ONTOLOGY: &str = "
    node Task { title: String [required], created_at: Timestamp? }
    rule auto_ts on Task [auto, priority: 100]: SET t.created_at = now()
";

const FIXED_NOW: i64 = 1_705_320_000_000;

#[test]
fn s4_rule_stamps_creation_time_once() {
    let (_db, mut session) = engine_at(AUTO_TS_ONTOLOGY, FIXED_NOW);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN t: Task { title = \"X\" }").unwrap();
    session.execute("COMMIT").unwrap();

    let outcome = session
        .execute("MATCH t: Task RETURN t.title, t.created_at")
        .unwrap();
    assert_eq!(
        rows(&outcome),
        &vec![vec![string("X"), Value::Timestamp(FIXED_NOW)]]
    );
}

// ==================== S5: rule quiescence and the action budget ====================

const COUNTER_ONTOLOGY: &str = "
    node Counter { v: Int }
    rule inc_until_ten: t: Counter WHERE t.v < 10 => SET t.v = t.v + 1
";

#[test]
fn s5_rule_runs_to_quiescence() {
    let (_db, mut session) = engine(COUNTER_ONTOLOGY);

    session.execute("BEGIN").unwrap();
    session.execute("SPAWN c: Counter { v = 0 }").unwrap();
    session.execute("COMMIT").unwrap();

    let outcome = session.execute("MATCH c: Counter RETURN c.v").unwrap();
    assert_eq!(rows(&outcome), &vec![vec![int(10)]]);
}

#[test]
fn s5_action_budget_aborts_the_transaction() {
    let limits = EngineLimits {
        max_rule_actions: 5,
        ..EngineLimits::default()
    };
    let (_db, mut session) = engine_with_limits(COUNTER_ONTOLOGY, limits);

    let err = session.execute("SPAWN c: Counter { v = 0 }").unwrap_err();
    assert_eq!(err.category(), ErrorCategory::LimitExceeded);

    // The aborted transaction left nothing behind.
    let check = session.execute("MATCH c: Counter RETURN c").unwrap();
    assert!(rows(&check).is_empty());
}

// ==================== S6: aggregation with grouping ====================

const PROJECT_ONTOLOGY: &str = "
    node Task { title: String [required] }
    node Project { name: String [required] }
    edge belongs_to(t: Task, p: Project)
";

#[test]
fn s6_grouped_count_in_name_order() {
    let (_db, mut session) = engine(PROJECT_ONTOLOGY);

    for name in ["Gamma", "Alpha", "Beta"] {
        session
            .execute(&format!("SPAWN p{name}: Project {{ name = \"{name}\" }}"))
            .unwrap();
    }
    // 3 tasks in Alpha, 2 in Beta, 1 in Gamma.
    let spread = [
        ("Alpha", 3usize),
        ("Beta", 2),
        ("Gamma", 1),
    ];
    let mut counter = 0;
    for (project, count) in spread {
        for _ in 0..count {
            counter += 1;
            session
                .execute(&format!("SPAWN task{counter}: Task {{ title = \"t{counter}\" }}"))
                .unwrap();
            session
                .execute(&format!("LINK belongs_to(task{counter}, p{project})"))
                .unwrap();
        }
    }

    let outcome = session
        .execute(
            "MATCH t: Task, p: Project, belongs_to(t, p) \
             RETURN p.name, count(t) ORDER BY p.name ASC",
        )
        .unwrap();

    assert_eq!(
        rows(&outcome),
        &vec![
            vec![string("Alpha"), int(3)],
            vec![string("Beta"), int(2)],
            vec![string("Gamma"), int(1)],
        ]
    );
    let total: i64 = rows(&outcome).iter().map(|r| r[1].as_int().unwrap()).sum();
    assert_eq!(total, 6);
}
