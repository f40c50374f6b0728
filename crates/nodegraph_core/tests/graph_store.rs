use nodegraph_core::db::{open_db_in_memory, DbError};
use nodegraph_core::{
    Connection as GraphConnection, ConnectionFilter, ConnectionSort, GraphConfig, GraphStore,
    Node, NodeFilter, NodeSort, Position, RecordStore, SqliteRecordStore, StoreError, StoreResult,
    DEFAULT_ANCHOR,
};
use rusqlite::Connection;
use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

/// Delegating store whose commits and fetches can be made to fail.
struct FlakyStore<S> {
    inner: S,
    fail_commit: Rc<Cell<bool>>,
    fail_fetch: Rc<Cell<bool>>,
}

impl<S: RecordStore> FlakyStore<S> {
    fn new(inner: S) -> (Self, Rc<Cell<bool>>, Rc<Cell<bool>>) {
        let fail_commit = Rc::new(Cell::new(false));
        let fail_fetch = Rc::new(Cell::new(false));
        let store = Self {
            inner,
            fail_commit: Rc::clone(&fail_commit),
            fail_fetch: Rc::clone(&fail_fetch),
        };
        (store, fail_commit, fail_fetch)
    }
}

fn injected_error() -> StoreError {
    StoreError::Db(DbError::Sqlite(rusqlite::Error::InvalidQuery))
}

impl<S: RecordStore> RecordStore for FlakyStore<S> {
    fn insert_node(&mut self, node: Node) {
        self.inner.insert_node(node);
    }

    fn insert_connection(&mut self, connection: GraphConnection) {
        self.inner.insert_connection(connection);
    }

    fn delete_node(&mut self, id: &str) {
        self.inner.delete_node(id);
    }

    fn delete_connections_matching(&mut self, filter: ConnectionFilter) {
        self.inner.delete_connections_matching(filter);
    }

    fn fetch_nodes(&self, filter: &NodeFilter, sort: NodeSort) -> StoreResult<Vec<Node>> {
        if self.fail_fetch.get() {
            return Err(injected_error());
        }
        self.inner.fetch_nodes(filter, sort)
    }

    fn fetch_connections(
        &self,
        filter: &ConnectionFilter,
        sort: ConnectionSort,
    ) -> StoreResult<Vec<GraphConnection>> {
        if self.fail_fetch.get() {
            return Err(injected_error());
        }
        self.inner.fetch_connections(filter, sort)
    }

    fn has_pending_changes(&self) -> bool {
        self.inner.has_pending_changes()
    }

    fn commit(&mut self) -> StoreResult<()> {
        if self.fail_commit.get() {
            return Err(injected_error());
        }
        self.inner.commit()
    }

    fn discard_pending(&mut self) {
        self.inner.discard_pending();
    }
}

fn seeded_graph<'conn>(
    conn: &'conn Connection,
    nodes: &[(&str, f32, f32, f32)],
) -> GraphStore<SqliteRecordStore<'conn>> {
    let mut store = SqliteRecordStore::try_new(conn).unwrap();
    for &(id, x, y, z) in nodes {
        store.insert_node(Node::with_id(id, id, "", Position::new(x, y, z)));
    }
    store.commit().unwrap();
    GraphStore::new(store)
}

#[test]
fn new_graph_loads_existing_records() {
    let conn = open_db_in_memory().unwrap();
    let graph = seeded_graph(&conn, &[("b", 0.0, 0.0, 0.0), ("a", 1.0, 0.0, 0.0)]);

    let names: Vec<_> = graph.nodes().iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(graph.revision(), 1);
}

#[test]
fn added_node_ids_are_unique() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = GraphStore::new(SqliteRecordStore::try_new(&conn).unwrap());

    let ids: HashSet<_> = (0..20)
        .map(|index| graph.add_node(format!("node {index}"), "", None).id)
        .collect();
    assert_eq!(ids.len(), 20);
    assert_eq!(graph.nodes().len(), 20);
}

#[test]
fn first_node_lands_on_default_anchor() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = GraphStore::new(SqliteRecordStore::try_new(&conn).unwrap());

    let node = graph.add_node("first", "", None);
    assert_eq!(node.position, Position::new(0.0, 1.0, -1.5));
    assert_eq!(graph.node(&node.id).unwrap().position, DEFAULT_ANCHOR);
}

#[test]
fn configured_anchor_replaces_default() {
    let conn = open_db_in_memory().unwrap();
    let config = GraphConfig {
        default_anchor: Position::new(3.0, 3.0, 3.0),
        ..GraphConfig::default()
    };
    let mut graph = GraphStore::with_config(SqliteRecordStore::try_new(&conn).unwrap(), &config);

    let node = graph.add_node("first", "", None);
    assert_eq!(node.position, Position::new(3.0, 3.0, 3.0));
}

#[test]
fn new_node_without_position_goes_to_centroid() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 2.0, 0.0, 0.0)]);

    let node = graph.add_node("mid", "", None);
    assert_eq!(node.position, Position::new(1.0, 0.0, 0.0));
}

#[test]
fn explicit_position_is_used_verbatim() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0)]);

    let node = graph.add_node("", "", Some(Position::new(-4.0, 0.5, 9.0)));
    assert_eq!(
        graph.node(&node.id).unwrap().position,
        Position::new(-4.0, 0.5, 9.0)
    );
}

#[test]
fn connections_are_deduplicated_symmetrically() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 1.0, 0.0, 0.0)]);

    graph.add_connection("a", "b");
    assert_eq!(graph.connections().len(), 1);
    let revision = graph.revision();

    graph.add_connection("b", "a");
    graph.add_connection("a", "b");
    assert_eq!(graph.connections().len(), 1);
    assert_eq!(graph.revision(), revision, "rejected adds must not reload");
    assert!(graph.connection_between("b", "a").is_some());
}

#[test]
fn non_finite_explicit_position_falls_back_to_default_placement() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 2.0, 4.0, 0.0)]);

    let node = graph.add_node("nan", "", Some(Position::new(f32::NAN, 0.0, 0.0)));
    assert_eq!(node.position, Position::new(1.0, 2.0, 0.0));
    assert_eq!(graph.node(&node.id), Some(&node));

    let node = graph.add_node("inf", "", Some(Position::new(0.0, f32::INFINITY, 0.0)));
    assert!(node.position.is_finite());
    assert_eq!(graph.node(&node.id), Some(&node));
    assert_eq!(graph.nodes().len(), 4);
}

#[test]
fn non_finite_updates_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 1.0, 2.0, 3.0)]);
    let before = graph.nodes().to_vec();
    let revision = graph.revision();

    graph.update_position("a", Position::new(f32::NAN, 0.0, 0.0));
    graph.update_node(&Node::with_id(
        "a",
        "renamed",
        "",
        Position::new(0.0, 0.0, f32::NEG_INFINITY),
    ));

    assert_eq!(graph.nodes(), before.as_slice());
    assert_eq!(graph.revision(), revision);
    assert!(!graph.store().has_pending_changes());
}

#[test]
fn infinite_stored_positions_place_new_node_at_anchor() {
    let conn = open_db_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO nodes (id, name, detail, x, y, z) VALUES ('a', 'a', '', 1e300, 0, 0);
         INSERT INTO nodes (id, name, detail, x, y, z) VALUES ('b', 'b', '', -1e300, 0, 0);",
    )
    .unwrap();
    let mut graph = GraphStore::new(SqliteRecordStore::try_new(&conn).unwrap());
    assert_eq!(graph.nodes().len(), 2);

    let node = graph.add_node("c", "", None);
    assert_eq!(node.position, DEFAULT_ANCHOR);
    assert_eq!(graph.node(&node.id), Some(&node));
    assert_eq!(graph.nodes().len(), 3);
}

#[test]
fn large_finite_positions_still_average() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(
        &conn,
        &[("a", f32::MAX, 0.0, 0.0), ("b", f32::MAX, 0.0, 0.0)],
    );

    let node = graph.add_node("c", "", None);
    assert_eq!(node.position, Position::new(f32::MAX, 0.0, 0.0));
    assert_eq!(graph.node(&node.id), Some(&node));
}

#[test]
fn self_loops_and_unknown_endpoints_are_ignored() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0)]);

    graph.add_connection("a", "a");
    graph.add_connection("a", "ghost");
    graph.add_connection("ghost", "a");
    assert!(graph.connections().is_empty());
    assert!(!graph.has_connection("a"));
}

#[test]
fn removing_node_cascades_to_its_connections() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(
        &conn,
        &[("a", 0.0, 0.0, 0.0), ("b", 1.0, 0.0, 0.0), ("c", 2.0, 0.0, 0.0)],
    );
    graph.add_connection("a", "b");
    graph.add_connection("a", "c");
    graph.add_connection("b", "c");

    let a = graph.node("a").unwrap().clone();
    graph.remove_node(&a);

    assert!(graph.node("a").is_none());
    assert!(!graph.has_connection("a"));
    assert_eq!(graph.connections().len(), 1);
    assert!(graph.connection_between("b", "c").is_some());
}

#[test]
fn remove_nodes_at_uses_current_ordering() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(
        &conn,
        &[("c", 0.0, 0.0, 0.0), ("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)],
    );
    graph.add_connection("a", "b");
    let revision = graph.revision();

    graph.remove_nodes_at(&[0, 2, 2, 99]);

    let ids: Vec<_> = graph.nodes().iter().map(|node| node.id.as_str()).collect();
    assert_eq!(ids, vec!["b"]);
    assert!(graph.connections().is_empty());
    assert_eq!(graph.revision(), revision + 1, "batch removal commits once");

    graph.remove_nodes_at(&[5]);
    assert_eq!(graph.revision(), revision + 1);
}

#[test]
fn update_node_replaces_all_fields_and_is_idempotent() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 1.0, 0.0, 0.0)]);

    let replacement = Node::with_id("a", "renamed", "details", Position::new(5.0, 6.0, 7.0));
    graph.update_node(&replacement);
    let once = graph.nodes().to_vec();
    graph.update_node(&replacement);

    assert_eq!(graph.nodes(), once.as_slice());
    assert_eq!(graph.node("a"), Some(&replacement));
}

#[test]
fn partial_updates_touch_only_their_fields() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 1.0, 2.0, 3.0)]);

    graph.update_node_details("a", "label", "text");
    let node = graph.node("a").unwrap();
    assert_eq!(node.name, "label");
    assert_eq!(node.detail, "text");
    assert_eq!(node.position, Position::new(1.0, 2.0, 3.0));

    graph.update_position("a", Position::new(0.0, 0.0, -1.0));
    let node = graph.node("a").unwrap();
    assert_eq!(node.name, "label");
    assert_eq!(node.position, Position::new(0.0, 0.0, -1.0));
}

#[test]
fn updates_for_unknown_ids_change_nothing() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 1.0, 2.0, 3.0)]);
    let before = graph.nodes().to_vec();
    let revision = graph.revision();

    graph.update_node(&Node::with_id("nonexistent", "x", "y", Position::default()));
    graph.update_node_details("nonexistent", "x", "y");
    graph.update_position("nonexistent", Position::default());

    assert_eq!(graph.nodes(), before.as_slice());
    assert_eq!(graph.revision(), revision);
    assert!(!graph.store().has_pending_changes());
}

#[test]
fn connection_removal_variants() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(
        &conn,
        &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0), ("c", 0.0, 0.0, 0.0)],
    );
    graph.add_connection("a", "b");
    graph.add_connection("b", "c");
    graph.add_connection("a", "c");

    graph.remove_connections_between("c", "b");
    assert!(graph.connection_between("b", "c").is_none());
    assert_eq!(graph.connections().len(), 2);

    let first_touching_a = graph
        .connections()
        .iter()
        .find(|connection| connection.touches("a"))
        .unwrap()
        .id
        .clone();
    graph.remove_connection_touching("a");
    assert!(graph
        .connections()
        .iter()
        .all(|connection| connection.id != first_touching_a));
    assert_eq!(graph.connections().len(), 1);

    let last = graph.connections()[0].clone();
    graph.remove_connection(&last);
    assert!(graph.connections().is_empty());

    let revision = graph.revision();
    graph.remove_connection_touching("a");
    graph.remove_connections_between("a", "b");
    graph.remove_connection(&last);
    assert_eq!(graph.revision(), revision);
    assert!(!graph.store().has_pending_changes());
}

#[test]
fn removing_unknown_records_does_not_reload() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)]);
    graph.add_connection("a", "b");
    let calls = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&calls);
    graph.subscribe(move |revision| seen.borrow_mut().push(revision));
    let revision = graph.revision();

    graph.remove_node(&Node::with_id("ghost", "ghost", "", Position::default()));
    graph.remove_connection(&GraphConnection::with_id("missing", "a", "b"));

    assert_eq!(graph.revision(), revision);
    assert!(calls.borrow().is_empty());
    assert_eq!(graph.nodes().len(), 2);
    assert_eq!(graph.connections().len(), 1);
    assert!(!graph.store().has_pending_changes());
}

#[test]
fn nodes_connected_with_resolves_opposite_endpoints() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(
        &conn,
        &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0), ("c", 0.0, 0.0, 0.0)],
    );
    graph.add_connection("b", "a");
    graph.add_connection("a", "c");

    let a = graph.node("a").unwrap().clone();
    let mut neighbors: Vec<_> = graph
        .nodes_connected_with(&a)
        .into_iter()
        .map(|node| node.id.clone())
        .collect();
    neighbors.sort();
    assert_eq!(neighbors, vec!["b", "c"]);

    let b = graph.node("b").unwrap().clone();
    let neighbors: Vec<_> = graph
        .nodes_connected_with(&b)
        .into_iter()
        .map(|node| node.id.as_str())
        .collect();
    assert_eq!(neighbors, vec!["a"]);
}

#[test]
fn end_to_end_scenario() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("n1", 0.0, 0.0, 0.0), ("n2", 4.0, 0.0, 0.0)]);

    let c = graph.add_node("C", "d", None);
    assert_eq!(c.position, Position::new(2.0, 0.0, 0.0));

    graph.add_connection("n1", "n2");
    assert_eq!(graph.connections().len(), 1);
    graph.add_connection("n2", "n1");
    assert_eq!(graph.connections().len(), 1);

    let n1 = graph.node("n1").unwrap().clone();
    graph.remove_node(&n1);
    assert!(graph.connections().is_empty());
    assert_eq!(graph.nodes().len(), 2);
}

#[test]
fn failed_commit_keeps_state_and_drops_staged_changes() {
    let conn = open_db_in_memory().unwrap();
    let mut seed = SqliteRecordStore::try_new(&conn).unwrap();
    seed.insert_node(Node::with_id("a", "a", "", Position::default()));
    seed.commit().unwrap();

    let (store, fail_commit, _) = FlakyStore::new(SqliteRecordStore::try_new(&conn).unwrap());
    let mut graph = GraphStore::new(store);
    let before = graph.nodes().to_vec();
    let revision = graph.revision();

    fail_commit.set(true);
    graph.add_node("lost", "", None);
    graph.update_position("a", Position::new(9.0, 9.0, 9.0));

    assert_eq!(graph.nodes(), before.as_slice());
    assert_eq!(graph.revision(), revision);
    assert!(!graph.store().has_pending_changes());

    fail_commit.set(false);
    graph.add_node("kept", "", None);
    let names: Vec<_> = graph.nodes().iter().map(|node| node.name.as_str()).collect();
    assert_eq!(names, vec!["a", "kept"], "rejected writes must not resurface");
    assert_eq!(graph.node("a").unwrap().position, Position::default());
}

#[test]
fn failed_fetch_keeps_previous_state() {
    let conn = open_db_in_memory().unwrap();
    let (store, _, fail_fetch) = FlakyStore::new(SqliteRecordStore::try_new(&conn).unwrap());
    let mut graph = GraphStore::new(store);
    graph.add_node("a", "", None);
    let before = graph.nodes().to_vec();
    let revision = graph.revision();

    fail_fetch.set(true);
    graph.add_node("b", "", None);
    assert_eq!(graph.nodes(), before.as_slice());
    assert_eq!(graph.revision(), revision);

    fail_fetch.set(false);
    graph.fetch_items();
    assert_eq!(graph.nodes().len(), 2);
}

#[test]
fn observers_receive_each_revision_until_unsubscribed() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = GraphStore::new(SqliteRecordStore::try_new(&conn).unwrap());
    let seen = Rc::new(RefCell::new(Vec::new()));

    let sink = Rc::clone(&seen);
    let id = graph.subscribe(move |revision| sink.borrow_mut().push(revision));

    let a = graph.add_node("a", "", None);
    graph.add_node("b", "", None);
    graph.add_connection("a", "missing");
    assert_eq!(*seen.borrow(), vec![2, 3]);

    assert!(graph.unsubscribe(id));
    assert!(!graph.unsubscribe(id));
    graph.remove_node(&a);
    assert_eq!(seen.borrow().len(), 2);
}

#[test]
fn selection_follows_node_lifecycle() {
    let conn = open_db_in_memory().unwrap();
    let mut graph = seeded_graph(&conn, &[("a", 0.0, 0.0, 0.0), ("b", 0.0, 0.0, 0.0)]);

    graph.select_node(Some("a"));
    assert_eq!(graph.selected_node().map(|node| node.id.as_str()), Some("a"));

    graph.update_node_details("a", "renamed", "");
    assert_eq!(graph.selected_node().unwrap().name, "renamed");

    let a = graph.node("a").unwrap().clone();
    graph.remove_node(&a);
    assert_eq!(graph.selected_node_id(), None);

    graph.select_node(Some("ghost"));
    assert_eq!(graph.selected_node_id(), None);
    graph.select_node(Some("b"));
    graph.select_node(None);
    assert_eq!(graph.selected_node_id(), None);
}
