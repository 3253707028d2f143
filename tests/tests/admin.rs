//! Admin surfaces: SHOW, INSPECT, EXPLAIN, indexes, EXTEND, Layer-0.

use mew_tests::prelude::*;

const ONTOLOGY: &str = "
    abstract node Item { label: String? }
    node Task : Item { title: String [required], priority: Int? [indexed] }
    node Project { name: String [required, unique] }
    edge belongs_to(t: Task, p: Project) [unique]
    constraint titled: t: Task => length(t.title) > 0
    rule touch on Task [priority: 5]: SET t.label = \"seen\"
";

#[test]
fn test_show_types_edges_constraints_rules() {
    let (_db, mut session) = engine(ONTOLOGY);

    let types = session.execute("SHOW TYPES").unwrap();
    let names: Vec<&Value> = rows(&types).iter().map(|r| &r[0]).collect();
    assert!(names.contains(&&string("Task")));
    assert!(names.contains(&&string("Item")));
    // Meta types stay hidden.
    assert!(!names.iter().any(|v| v.as_str().is_some_and(|s| s.starts_with('_'))));

    let edges = session.execute("SHOW EDGES").unwrap();
    assert_eq!(rows(&edges).len(), 1);
    assert_eq!(rows(&edges)[0][0], string("belongs_to"));

    let constraints = session.execute("SHOW CONSTRAINTS").unwrap();
    let constraint_names: Vec<&Value> = rows(&constraints).iter().map(|r| &r[0]).collect();
    assert!(constraint_names.contains(&&string("titled")));
    // Modifier expansion surfaces the generated existence constraints.
    assert!(constraint_names.contains(&&string("_Task_title_required")));

    let rules = session.execute("SHOW RULES").unwrap();
    assert_eq!(rows(&rules)[0][0], string("touch"));
    assert_eq!(rows(&rules)[0][1], int(5));
}

#[test]
fn test_show_indexes_and_statistics() {
    let (_db, mut session) = engine(ONTOLOGY);
    session.execute("SPAWN p: Project { name = \"P\" }").unwrap();

    let indexes = session.execute("SHOW INDEXES").unwrap();
    // Declared [indexed] on Task.priority and [unique] on Project.name.
    let pairs: Vec<(String, String)> = rows(&indexes)
        .iter()
        .map(|r| {
            (
                r[0].as_str().unwrap().to_string(),
                r[1].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert!(pairs.contains(&("Task".to_string(), "priority".to_string())));
    assert!(pairs.contains(&("Project".to_string(), "name".to_string())));

    let stats = session.execute("SHOW STATISTICS").unwrap();
    let node_row = rows(&stats)
        .iter()
        .find(|r| r[0] == string("nodes:Project"))
        .expect("per-type row");
    assert_eq!(node_row[1], int(1));

    let status = session.execute("SHOW STATUS").unwrap();
    assert!(rows(&status).iter().any(|r| r[0] == string("wal_lsn")));
}

#[test]
fn test_inspect_found_and_not_found() {
    let (_db, mut session) = engine(ONTOLOGY);
    session.execute("SPAWN t: Task { title = \"inspect me\" }").unwrap();
    let id = session.binding("t").unwrap().as_node().unwrap().raw();

    let outcome = session.execute(&format!("INSPECT #{id}")).unwrap();
    let query = outcome.as_query().unwrap();
    assert!(query.columns.contains(&"_type".to_string()));
    assert_eq!(query.rows[0][0], Value::Bool(true));

    // Missing ids answer found = false, never an error.
    let outcome = session.execute("INSPECT #99999").unwrap();
    let query = outcome.as_query().unwrap();
    assert_eq!(query.columns, vec!["found"]);
    assert_eq!(query.rows[0][0], Value::Bool(false));
}

#[test]
fn test_explain_returns_a_plan() {
    let (_db, mut session) = engine(ONTOLOGY);
    let outcome = session
        .execute("EXPLAIN MATCH t: Task WHERE t.priority = 5 RETURN t")
        .unwrap();
    let text = rows(&outcome)[0][0].as_str().unwrap();
    // The indexed equality conjunct shows up as an index scan.
    assert!(text.contains("IndexScan"), "plan was: {text}");
}

#[test]
fn test_create_and_drop_index() {
    let (_db, mut session) = engine(ONTOLOGY);
    session.execute("SPAWN t: Task { title = \"by title\" }").unwrap();

    session.execute("CREATE INDEX ON Task(title)").unwrap();
    let outcome = session
        .execute("EXPLAIN MATCH t: Task WHERE t.title = \"by title\" RETURN t")
        .unwrap();
    assert!(rows(&outcome)[0][0].as_str().unwrap().contains("IndexScan"));

    session.execute("DROP INDEX ON Task(title)").unwrap();
    let err = session.execute("DROP INDEX ON Task(title)").unwrap_err();
    assert_eq!(err.code(), "E4004");
}

#[test]
fn test_extend_ontology_statement() {
    let (_db, mut session) = engine(ONTOLOGY);

    session
        .execute("EXTEND ONTOLOGY { node Tag { label: String [required] } }")
        .unwrap();
    session.execute("SPAWN g: Tag { label = \"urgent\" }").unwrap();

    let outcome = session.execute("MATCH g: Tag RETURN g.label").unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("urgent")]]);

    // Altering an existing declaration is refused.
    let err = session
        .execute("EXTEND ONTOLOGY { node Task { other: Int? } }")
        .unwrap_err();
    assert!(err.envelope().message.contains("alter"));
}

#[test]
fn test_layer0_mirror_agrees_with_registry() {
    let (_db, mut session) = engine(ONTOLOGY);

    // Every declaration is mirrored as a meta node.
    let outcome = session
        .execute("MATCH m: _Type RETURN m.name ORDER BY m.name ASC")
        .unwrap();
    let mirrored: Vec<&Value> = rows(&outcome).iter().map(|r| &r[0]).collect();
    assert!(mirrored.contains(&&string("Task")));
    assert!(mirrored.contains(&&string("Item")));
    assert!(mirrored.contains(&&string("Project")));

    let outcome = session.execute("MATCH m: _EdgeType RETURN m.name").unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("belongs_to")]]);

    let outcome = session.execute("MATCH m: _Rule RETURN m.priority").unwrap();
    assert_eq!(rows(&outcome), &vec![vec![int(5)]]);

    // The inheritance edge is mirrored too.
    let outcome = session
        .execute("MATCH c: _Type, p: _Type, _extends(c, p) RETURN c.name, p.name")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("Task"), string("Item")]]);

    // EXTEND keeps the mirror in sync.
    session
        .execute("EXTEND ONTOLOGY { node Tag { label: String? } }")
        .unwrap();
    let outcome = session
        .execute("MATCH m: _Type WHERE m.name = \"Tag\" RETURN m")
        .unwrap();
    assert_eq!(rows(&outcome).len(), 1);
}

#[test]
fn test_versioning_statements_parse_but_reject() {
    let (_db, mut session) = engine(ONTOLOGY);
    for stmt in ["SNAPSHOT v1", "CHECKOUT v1", "DIFF", "BRANCH dev", "MERGE dev"] {
        let err = session.execute(stmt).unwrap_err();
        assert!(err.envelope().message.contains("not supported"));
    }
}

#[test]
fn test_parameters_resolve_in_queries() {
    let (_db, mut session) = engine(ONTOLOGY);
    session.execute("SPAWN a: Task { title = \"low\", priority = 1 }").unwrap();
    session.execute("SPAWN b: Task { title = \"high\", priority = 9 }").unwrap();

    session.set_param("floor", int(5));
    let outcome = session
        .execute("MATCH t: Task WHERE t.priority >= $floor RETURN t.title")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("high")]]);
}

#[test]
fn test_returning_clause() {
    let (_db, mut session) = engine(ONTOLOGY);
    let outcome = session
        .execute("SPAWN t: Task { title = \"give it back\" } RETURNING title")
        .unwrap();
    let mutation = outcome.as_mutation().unwrap();
    let returning = mutation.returning.as_ref().expect("returning rows");
    assert_eq!(returning.columns, vec!["title"]);
    assert_eq!(returning.rows[0][0], string("give it back"));
}
