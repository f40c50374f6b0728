//! Graph use-case service.
//!
//! # Responsibility
//! - Hold the in-memory node/connection view callers render from.
//! - Enforce graph invariants before anything is staged in the record store.
//! - Resynchronize in-memory state from the store after every commit.
//!
//! # Invariants
//! - Node and connection ids are unique.
//! - No connection references a missing node, and none is a self-loop.
//! - Every stored node position is finite.
//! - At most one connection exists per unordered node pair.
//! - Rejected mutations and store failures never surface as errors; they are
//!   logged and leave in-memory state unchanged.

use crate::config::GraphConfig;
use crate::model::connection::{Connection, EdgeKey};
use crate::model::node::{Node, NodeId, Position};
use crate::repo::record_store::{
    ConnectionFilter, ConnectionSort, NodeFilter, NodeSort, RecordStore,
};
use crate::service::placement::{default_position, DEFAULT_ANCHOR};
use log::{debug, error, info};
use std::collections::{BTreeSet, HashMap};
use std::time::Instant;

/// Handle returned by `GraphStore::subscribe`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Box<dyn FnMut(u64)>;

/// Graph state holder backed by a record store.
///
/// Callers mutate through the methods below and then re-read `nodes()` /
/// `connections()`, or subscribe to be told when a new revision is loaded.
pub struct GraphStore<S: RecordStore> {
    store: S,
    nodes: Vec<Node>,
    connections: Vec<Connection>,
    edge_index: HashMap<EdgeKey, usize>,
    anchor: Position,
    selected_node_id: Option<NodeId>,
    revision: u64,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,
}

impl<S: RecordStore> GraphStore<S> {
    /// Creates a graph over `store` and loads its current contents.
    pub fn new(store: S) -> Self {
        Self::with_anchor(store, DEFAULT_ANCHOR)
    }

    /// Creates a graph using the placement anchor from `config`.
    pub fn with_config(store: S, config: &GraphConfig) -> Self {
        Self::with_anchor(store, config.default_anchor)
    }

    /// Creates a graph whose first auto-placed node lands on `anchor`.
    pub fn with_anchor(store: S, anchor: Position) -> Self {
        let mut graph = Self {
            store,
            nodes: Vec::new(),
            connections: Vec::new(),
            edge_index: HashMap::new(),
            anchor,
            selected_node_id: None,
            revision: 0,
            observers: Vec::new(),
            next_observer_id: 0,
        };
        graph.fetch_items();
        graph
    }

    /// Nodes sorted by name, then id.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Connections sorted by id.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    /// Number of times in-memory state has been reloaded from the store.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Adds a node and returns it.
    ///
    /// Without `position`, the node is placed at the centroid of the existing
    /// nodes, or at the anchor when the graph is empty. A `position` with a
    /// non-finite coordinate is treated as absent.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        detail: impl Into<String>,
        position: Option<Position>,
    ) -> Node {
        let position = match position {
            Some(position) if position.is_finite() => position,
            Some(position) => {
                debug!(
                    "event=node_add module=graph status=fallback reason=non_finite_position position={position}"
                );
                default_position(&self.nodes, self.anchor)
            }
            None => default_position(&self.nodes, self.anchor),
        };
        let node = Node::new(name, detail, position);
        self.store.insert_node(node.clone());
        self.save("node_add", &node.id);
        node
    }

    /// Replaces name, detail and position of the node with `replacement.id`.
    pub fn update_node(&mut self, replacement: &Node) {
        if !replacement.position.is_finite() {
            debug!(
                "event=node_update module=graph status=skipped reason=non_finite_position node_id={}",
                replacement.id
            );
            return;
        }
        let Some(existing) = self.load_node(&replacement.id, "node_update") else {
            return;
        };
        self.store.insert_node(existing.replaced_by(replacement));
        self.save("node_update", &replacement.id);
    }

    /// Replaces name and detail only.
    pub fn update_node_details(
        &mut self,
        node_id: &str,
        name: impl Into<String>,
        detail: impl Into<String>,
    ) {
        let Some(existing) = self.load_node(node_id, "node_update") else {
            return;
        };
        self.store.insert_node(existing.with_details(name, detail));
        self.save("node_update", node_id);
    }

    /// Moves a node; positions with a non-finite coordinate are ignored.
    pub fn update_position(&mut self, node_id: &str, position: Position) {
        if !position.is_finite() {
            debug!(
                "event=node_move module=graph status=skipped reason=non_finite_position node_id={node_id}"
            );
            return;
        }
        let Some(existing) = self.load_node(node_id, "node_move") else {
            return;
        };
        self.store.insert_node(existing.with_position(position));
        self.save("node_move", node_id);
    }

    /// Removes a node together with every connection touching it.
    pub fn remove_node(&mut self, node: &Node) {
        if self.node(&node.id).is_none() {
            debug!(
                "event=node_remove module=graph status=skipped reason=unknown_node node_id={}",
                node.id
            );
            return;
        }
        self.stage_node_removal(&node.id);
        self.save("node_remove", &node.id);
    }

    /// Removes the nodes at `offsets` in the current `nodes()` ordering.
    ///
    /// Out-of-range offsets are ignored. All removals share one commit.
    pub fn remove_nodes_at(&mut self, offsets: &[usize]) {
        let ids: BTreeSet<NodeId> = offsets
            .iter()
            .filter_map(|&offset| {
                let node = self.nodes.get(offset);
                if node.is_none() {
                    debug!(
                        "event=node_remove module=graph status=skipped reason=offset_out_of_range offset={offset} len={}",
                        self.nodes.len()
                    );
                }
                node.map(|node| node.id.clone())
            })
            .collect();
        if ids.is_empty() {
            return;
        }

        for id in &ids {
            self.stage_node_removal(id);
        }
        self.save("node_remove", &format!("batch:{}", ids.len()));
    }

    /// Connects two distinct existing nodes, unless they are already joined.
    pub fn add_connection(&mut self, from_node_id: &str, to_node_id: &str) {
        if from_node_id == to_node_id {
            debug!(
                "event=connection_add module=graph status=skipped reason=self_loop node_id={from_node_id}"
            );
            return;
        }
        if self.node(from_node_id).is_none() || self.node(to_node_id).is_none() {
            debug!(
                "event=connection_add module=graph status=skipped reason=unknown_node from={from_node_id} to={to_node_id}"
            );
            return;
        }
        if self
            .edge_index
            .contains_key(&EdgeKey::new(from_node_id, to_node_id))
        {
            debug!(
                "event=connection_add module=graph status=skipped reason=duplicate_edge from={from_node_id} to={to_node_id}"
            );
            return;
        }

        let connection = Connection::between(from_node_id, to_node_id);
        let connection_id = connection.id.clone();
        self.store.insert_connection(connection);
        self.save("connection_add", &connection_id);
    }

    pub fn remove_connection(&mut self, connection: &Connection) {
        if !self
            .connections
            .iter()
            .any(|loaded| loaded.id == connection.id)
        {
            debug!(
                "event=connection_remove module=graph status=skipped reason=unknown_connection connection_id={}",
                connection.id
            );
            return;
        }
        self.store.delete_connection(&connection.id);
        self.save("connection_remove", &connection.id);
    }

    /// Removes the first connection, in `connections()` order, touching
    /// `node_id`.
    pub fn remove_connection_touching(&mut self, node_id: &str) {
        let Some(connection_id) = self
            .connections
            .iter()
            .find(|connection| connection.touches(node_id))
            .map(|connection| connection.id.clone())
        else {
            debug!(
                "event=connection_remove module=graph status=skipped reason=no_connection node_id={node_id}"
            );
            return;
        };
        self.store.delete_connection(&connection_id);
        self.save("connection_remove", &connection_id);
    }

    /// Removes every connection joining `a` and `b`, in either direction.
    pub fn remove_connections_between(&mut self, a: &str, b: &str) {
        if !self.connections.iter().any(|connection| connection.joins(a, b)) {
            debug!(
                "event=connection_remove module=graph status=skipped reason=no_connection from={a} to={b}"
            );
            return;
        }
        self.store
            .delete_connections_matching(ConnectionFilter::Between(a.to_string(), b.to_string()));
        self.save("connection_remove", &format!("{a}<->{b}"));
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    /// Returns whether any connection touches `node_id`.
    pub fn has_connection(&self, node_id: &str) -> bool {
        self.connections
            .iter()
            .any(|connection| connection.touches(node_id))
    }

    pub fn connection_between(&self, a: &str, b: &str) -> Option<&Connection> {
        self.edge_index
            .get(&EdgeKey::new(a, b))
            .and_then(|&index| self.connections.get(index))
    }

    /// Neighbors of `node`, in `connections()` order.
    ///
    /// Connections whose opposite endpoint is not loaded are skipped.
    pub fn nodes_connected_with(&self, node: &Node) -> Vec<&Node> {
        self.connections
            .iter()
            .filter_map(|connection| connection.opposite(&node.id))
            .filter_map(|neighbor_id| self.node(neighbor_id))
            .collect()
    }

    /// Selects a node by id; unknown ids clear the selection.
    pub fn select_node(&mut self, node_id: Option<&str>) {
        self.selected_node_id = node_id
            .filter(|id| self.node(id).is_some())
            .map(str::to_string);
    }

    pub fn selected_node_id(&self) -> Option<&str> {
        self.selected_node_id.as_deref()
    }

    pub fn selected_node(&self) -> Option<&Node> {
        self.selected_node_id
            .as_deref()
            .and_then(|id| self.node(id))
    }

    /// Registers `observer` to receive each new revision after a reload.
    pub fn subscribe(&mut self, observer: impl FnMut(u64) + 'static) -> ObserverId {
        let id = ObserverId(self.next_observer_id);
        self.next_observer_id += 1;
        self.observers.push((id, Box::new(observer)));
        id
    }

    /// Returns whether an observer was removed.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        self.observers.len() != before
    }

    /// Reloads nodes and connections from the store.
    ///
    /// On a read failure the previous in-memory state is kept.
    pub fn fetch_items(&mut self) {
        let started_at = Instant::now();
        let nodes = match self.store.fetch_nodes(&NodeFilter::All, NodeSort::Name) {
            Ok(nodes) => nodes,
            Err(err) => {
                error!(
                    "event=graph_fetch module=graph status=error error_code=fetch_nodes_failed error={err}"
                );
                return;
            }
        };
        let connections = match self
            .store
            .fetch_connections(&ConnectionFilter::All, ConnectionSort::Id)
        {
            Ok(connections) => connections,
            Err(err) => {
                error!(
                    "event=graph_fetch module=graph status=error error_code=fetch_connections_failed error={err}"
                );
                return;
            }
        };

        self.replace_state(nodes, connections);
        debug!(
            "event=graph_fetch module=graph status=ok revision={} nodes={} connections={} duration_ms={}",
            self.revision,
            self.nodes.len(),
            self.connections.len(),
            started_at.elapsed().as_millis()
        );
    }

    fn replace_state(&mut self, nodes: Vec<Node>, connections: Vec<Connection>) {
        let mut edge_index = HashMap::with_capacity(connections.len());
        for (index, connection) in connections.iter().enumerate() {
            edge_index.entry(connection.key()).or_insert(index);
        }

        self.nodes = nodes;
        self.connections = connections;
        self.edge_index = edge_index;
        if self.selected_node().is_none() {
            self.selected_node_id = None;
        }

        self.revision += 1;
        let revision = self.revision;
        for (_, observer) in self.observers.iter_mut() {
            observer(revision);
        }
    }

    fn load_node(&self, node_id: &str, event: &'static str) -> Option<Node> {
        match self
            .store
            .fetch_nodes(&NodeFilter::Id(node_id.to_string()), NodeSort::Id)
        {
            Ok(nodes) => {
                let node = nodes.into_iter().next();
                if node.is_none() {
                    debug!(
                        "event={event} module=graph status=skipped reason=unknown_node node_id={node_id}"
                    );
                }
                node
            }
            Err(err) => {
                error!(
                    "event={event} module=graph status=error error_code=node_lookup_failed node_id={node_id} error={err}"
                );
                None
            }
        }
    }

    fn stage_node_removal(&mut self, node_id: &str) {
        self.store
            .delete_connections_matching(ConnectionFilter::Touching(node_id.to_string()));
        self.store.delete_node(node_id);
    }

    /// Commits staged changes, then reloads; failures are logged and the
    /// staged changes dropped.
    fn save(&mut self, event: &'static str, subject: &str) {
        if !self.store.has_pending_changes() {
            debug!("event={event} module=graph status=skipped reason=no_changes subject={subject}");
            return;
        }

        let started_at = Instant::now();
        match self.store.commit() {
            Ok(()) => {
                info!(
                    "event={event} module=graph status=ok subject={subject} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                self.fetch_items();
            }
            Err(err) => {
                error!(
                    "event={event} module=graph status=error subject={subject} duration_ms={} error_code=store_commit_failed error={err}",
                    started_at.elapsed().as_millis()
                );
                self.store.discard_pending();
            }
        }
    }
}
