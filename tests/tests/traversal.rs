//! Pattern matching breadth: transitive closures, NOT EXISTS, symmetric
//! edges, higher-order edges, WALK.

use mew_tests::prelude::*;

const CHAIN_ONTOLOGY: &str = "
    node Task { title: String [required], done: Bool? [default: false] }
    edge blocks(a: Task, b: Task)
";

/// Build the chain A -> B -> C -> D.
fn chain() -> (std::sync::Arc<Database>, Session) {
    let (db, mut session) = engine(CHAIN_ONTOLOGY);
    for name in ["A", "B", "C", "D"] {
        session
            .execute(&format!("SPAWN {name}: Task {{ title = \"{name}\" }}"))
            .unwrap();
    }
    for (a, b) in [("A", "B"), ("B", "C"), ("C", "D")] {
        session.execute(&format!("LINK blocks({a}, {b})")).unwrap();
    }
    (db, session)
}

#[test]
fn test_transitive_plus_reaches_all_descendants() {
    let (_db, mut session) = chain();

    let outcome = session
        .execute("MATCH x: Task, y: Task, blocks+(x, y) WHERE x.title = \"A\" RETURN y.title ORDER BY y.title ASC")
        .unwrap();
    assert_eq!(
        rows(&outcome),
        &vec![vec![string("B")], vec![string("C")], vec![string("D")]]
    );
}

#[test]
fn test_transitive_star_includes_start() {
    let (_db, mut session) = chain();

    let outcome = session
        .execute("MATCH x: Task, y: Task, blocks*(x, y) WHERE x.title = \"C\" RETURN y.title ORDER BY y.title ASC")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("C")], vec![string("D")]]);
}

#[test]
fn test_transitive_depth_bounds() {
    let (_db, mut session) = chain();

    let outcome = session
        .execute("MATCH x: Task, y: Task, blocks+{2,3}(x, y) WHERE x.title = \"A\" RETURN y.title ORDER BY y.title ASC")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("C")], vec![string("D")]]);
}

#[test]
fn test_not_exists_finds_leaves() {
    let (_db, mut session) = chain();

    // Tasks that block nothing: only D.
    let outcome = session
        .execute("MATCH x: Task WHERE NOT EXISTS (y: Task, blocks(x, y)) RETURN x.title")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("D")]]);
}

#[test]
fn test_exists_boolean_exports_no_bindings() {
    let (_db, mut session) = chain();

    let outcome = session
        .execute(
            "MATCH x: Task WHERE EXISTS (y: Task, blocks(x, y)) RETURN x.title ORDER BY x.title ASC",
        )
        .unwrap();
    // A, B, C block something; the inner y never leaks out as a column.
    assert_eq!(rows(&outcome).len(), 3);
    let query = outcome.as_query().unwrap();
    assert_eq!(query.columns, vec!["x.title"]);
}

#[test]
fn test_symmetric_edge_matches_either_order() {
    let ontology = "
        node Person { name: String [required] }
        edge friend_of(a: Person, b: Person) [symmetric]
    ";
    let (_db, mut session) = engine(ontology);
    session.execute("SPAWN alice: Person { name = \"Alice\" }").unwrap();
    session.execute("SPAWN bob: Person { name = \"Bob\" }").unwrap();
    session.execute("LINK friend_of(alice, bob)").unwrap();

    // Query in reverse stored order still finds the friendship.
    let outcome = session
        .execute(
            "MATCH a: Person, b: Person, friend_of(a, b) WHERE a.name = \"Bob\" RETURN b.name",
        )
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("Alice")]]);

    // Unconstrained, one row per physical edge.
    let outcome = session
        .execute("MATCH a: Person, b: Person, friend_of(a, b) RETURN a.name, b.name")
        .unwrap();
    assert_eq!(rows(&outcome).len(), 1);
}

#[test]
fn test_higher_order_edge_annotation() {
    let ontology = "
        node Task { title: String [required] }
        node Note { text: String [required] }
        edge blocks(a: Task, b: Task)
        edge annotates(n: Note, about: edge<any>)
    ";
    let (_db, mut session) = engine(ontology);
    session.execute("SPAWN a: Task { title = \"A\" }").unwrap();
    session.execute("SPAWN b: Task { title = \"B\" }").unwrap();
    session.execute("LINK blocks(a, b) AS e").unwrap();
    session.execute("SPAWN n: Note { text = \"why\" }").unwrap();
    session.execute("LINK annotates(n, e)").unwrap();

    let outcome = session
        .execute("MATCH n: Note, annotates(n, e) RETURN n.text")
        .unwrap();
    assert_eq!(rows(&outcome), &vec![vec![string("why")]]);

    // Unlinking the base edge cascades through the annotation.
    session.execute("UNLINK e").unwrap();
    let outcome = session
        .execute("MATCH n: Note, annotates(n, e) RETURN n.text")
        .unwrap();
    assert!(rows(&outcome).is_empty());
    // The note node itself survives.
    let outcome = session.execute("MATCH n: Note RETURN n").unwrap();
    assert_eq!(rows(&outcome).len(), 1);
}

#[test]
fn test_walk_nodes_and_until() {
    let ontology = "
        node Employee { name: String [required], level: Int }
        edge reports_to(junior: Employee, senior: Employee)
    ";
    let (_db, mut session) = engine(ontology);
    session.execute("SPAWN a: Employee { name = \"a\", level = 3 }").unwrap();
    session.execute("SPAWN b: Employee { name = \"b\", level = 2 }").unwrap();
    session.execute("SPAWN c: Employee { name = \"c\", level = 0 }").unwrap();
    session.execute("LINK reports_to(a, b)").unwrap();
    session.execute("LINK reports_to(b, c)").unwrap();

    let a = session.binding("a").unwrap().as_node().unwrap().raw();

    let outcome = session
        .execute(&format!("WALK FROM #{a} FOLLOW reports_to RETURN NODES"))
        .unwrap();
    assert_eq!(rows(&outcome).len(), 2);

    let outcome = session
        .execute(&format!(
            "WALK FROM #{a} FOLLOW reports_to UNTIL node.level = 2 RETURN NODES"
        ))
        .unwrap();
    // Stops at b; c is beyond the halt point.
    assert_eq!(rows(&outcome).len(), 1);
}

#[test]
fn test_match_walk_compound() {
    let ontology = "
        node Employee { name: String [required], boss: Bool? [default: false] }
        edge reports_to(junior: Employee, senior: Employee)
    ";
    let (_db, mut session) = engine(ontology);
    session.execute("SPAWN a: Employee { name = \"a\" }").unwrap();
    session.execute("SPAWN b: Employee { name = \"b\" }").unwrap();
    session.execute("SPAWN boss: Employee { name = \"z\", boss = true }").unwrap();
    session.execute("LINK reports_to(a, b)").unwrap();
    session.execute("LINK reports_to(b, boss)").unwrap();

    let outcome = session
        .execute(
            "MATCH e: Employee WHERE e.name = \"a\" WALK FROM e FOLLOW reports_to RETURN NODES",
        )
        .unwrap();
    assert_eq!(rows(&outcome).len(), 2);
}

#[test]
fn test_bulk_kill_by_subquery() {
    let (_db, mut session) = chain();
    session.execute("MATCH t: Task WHERE t.title = \"D\" SET t.done = true").unwrap();

    let outcome = session
        .execute("KILL (MATCH t: Task WHERE t.done = false RETURN t)")
        .unwrap();
    let mutation = outcome.as_mutation().unwrap();
    assert_eq!(mutation.ids.len(), 3);

    let check = session.execute("MATCH t: Task RETURN t.title").unwrap();
    assert_eq!(rows(&check), &vec![vec![string("D")]]);
}

#[test]
fn test_anonymous_wildcard_target() {
    let (_db, mut session) = chain();

    let outcome = session
        .execute("MATCH x: Task, blocks(x, _) RETURN x.title ORDER BY x.title ASC")
        .unwrap();
    assert_eq!(
        rows(&outcome),
        &vec![vec![string("A")], vec![string("B")], vec![string("C")]]
    );
}
