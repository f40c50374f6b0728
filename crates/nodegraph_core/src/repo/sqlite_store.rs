//! SQLite-backed record store.
//!
//! # Responsibility
//! - Stage graph writes and apply them in one immediate transaction.
//! - Keep SQL details inside the persistence boundary.
//!
//! # Invariants
//! - Only connections that pass `Connection::validate()` reach SQL.
//! - Node positions written to SQL are finite.
//! - Read paths reject invalid persisted rows instead of masking them.
//! - Node fetches order by `name ASC, id ASC`; connection fetches by `id ASC`.

use crate::db::migrations::latest_version;
use crate::model::connection::Connection as GraphConnection;
use crate::model::node::{Node, Position};
use crate::repo::record_store::{
    ConnectionFilter, ConnectionSort, NodeFilter, NodeSort, RecordStore, StagedChange,
    StoreError, StoreResult,
};
use log::debug;
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};
use std::time::Instant;

const NODE_SELECT_SQL: &str = "SELECT id, name, detail, x, y, z FROM nodes";
const CONNECTION_SELECT_SQL: &str = "SELECT id, from_node_id, to_node_id FROM connections";

const NODE_COLUMNS: &[&str] = &["id", "name", "detail", "x", "y", "z", "created_at", "updated_at"];
const CONNECTION_COLUMNS: &[&str] = &["id", "from_node_id", "to_node_id", "created_at"];

/// Record store over a migrated SQLite connection.
pub struct SqliteRecordStore<'conn> {
    conn: &'conn Connection,
    pending: Vec<StagedChange>,
}

impl<'conn> SqliteRecordStore<'conn> {
    /// Creates a store from a migrated connection.
    ///
    /// # Errors
    /// - `UninitializedConnection` when the schema version is not current.
    /// - `MissingRequiredTable` / `MissingRequiredColumn` on schema drift.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_graph_connection_ready(conn)?;
        Ok(Self {
            conn,
            pending: Vec::new(),
        })
    }

    /// Changes staged since the last successful commit or discard.
    pub fn pending_changes(&self) -> &[StagedChange] {
        &self.pending
    }
}

impl RecordStore for SqliteRecordStore<'_> {
    fn insert_node(&mut self, node: Node) {
        self.pending.push(StagedChange::PutNode(node));
    }

    fn insert_connection(&mut self, connection: GraphConnection) {
        self.pending.push(StagedChange::PutConnection(connection));
    }

    fn delete_node(&mut self, id: &str) {
        self.pending.push(StagedChange::DeleteNode(id.to_string()));
    }

    fn delete_connections_matching(&mut self, filter: ConnectionFilter) {
        self.pending.push(StagedChange::DeleteConnections(filter));
    }

    fn fetch_nodes(&self, filter: &NodeFilter, sort: NodeSort) -> StoreResult<Vec<Node>> {
        let (where_sql, binds) = match filter {
            NodeFilter::All => ("1 = 1", Vec::new()),
            NodeFilter::Id(id) => ("id = ?1", vec![id.clone()]),
        };
        let order_sql = match sort {
            NodeSort::Name => "name ASC, id ASC",
            NodeSort::Id => "id ASC",
        };

        let mut stmt = self
            .conn
            .prepare(&format!("{NODE_SELECT_SQL} WHERE {where_sql} ORDER BY {order_sql};"))?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut nodes = Vec::new();
        while let Some(row) = rows.next()? {
            nodes.push(parse_node_row(row)?);
        }
        Ok(nodes)
    }

    fn fetch_connections(
        &self,
        filter: &ConnectionFilter,
        sort: ConnectionSort,
    ) -> StoreResult<Vec<GraphConnection>> {
        let (where_sql, binds) = connection_filter_sql(filter);
        let order_sql = match sort {
            ConnectionSort::Id => "id ASC",
        };

        let mut stmt = self.conn.prepare(&format!(
            "{CONNECTION_SELECT_SQL} WHERE {where_sql} ORDER BY {order_sql};"
        ))?;
        let mut rows = stmt.query(params_from_iter(binds))?;
        let mut connections = Vec::new();
        while let Some(row) = rows.next()? {
            connections.push(parse_connection_row(row)?);
        }
        Ok(connections)
    }

    fn has_pending_changes(&self) -> bool {
        !self.pending.is_empty()
    }

    fn commit(&mut self) -> StoreResult<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        for change in &self.pending {
            match change {
                StagedChange::PutNode(node) if !node.position.is_finite() => {
                    return Err(StoreError::InvalidData(format!(
                        "non-finite position {} for node {}",
                        node.position, node.id
                    )));
                }
                StagedChange::PutConnection(connection) => connection.validate()?,
                _ => {}
            }
        }

        let started_at = Instant::now();
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for change in &self.pending {
            apply_change(&tx, change)?;
        }
        tx.commit()?;

        debug!(
            "event=store_commit module=store status=ok changes={} duration_ms={}",
            self.pending.len(),
            started_at.elapsed().as_millis()
        );
        self.pending.clear();
        Ok(())
    }

    fn discard_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "event=store_discard module=store status=ok changes={}",
                self.pending.len()
            );
        }
        self.pending.clear();
    }
}

fn apply_change(tx: &Transaction<'_>, change: &StagedChange) -> StoreResult<()> {
    match change {
        StagedChange::PutNode(node) => {
            tx.execute(
                "INSERT INTO nodes (id, name, detail, x, y, z)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT (id) DO UPDATE SET
                    name = excluded.name,
                    detail = excluded.detail,
                    x = excluded.x,
                    y = excluded.y,
                    z = excluded.z,
                    updated_at = (strftime('%s', 'now') * 1000);",
                params![
                    node.id.as_str(),
                    node.name.as_str(),
                    node.detail.as_str(),
                    f64::from(node.position.x),
                    f64::from(node.position.y),
                    f64::from(node.position.z),
                ],
            )?;
        }
        StagedChange::PutConnection(connection) => {
            tx.execute(
                "INSERT INTO connections (id, from_node_id, to_node_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT (id) DO UPDATE SET
                    from_node_id = excluded.from_node_id,
                    to_node_id = excluded.to_node_id;",
                params![
                    connection.id.as_str(),
                    connection.from_node_id.as_str(),
                    connection.to_node_id.as_str(),
                ],
            )?;
        }
        StagedChange::DeleteNode(id) => {
            tx.execute("DELETE FROM nodes WHERE id = ?1;", [id.as_str()])?;
        }
        StagedChange::DeleteConnections(filter) => {
            let (where_sql, binds) = connection_filter_sql(filter);
            tx.execute(
                &format!("DELETE FROM connections WHERE {where_sql};"),
                params_from_iter(binds),
            )?;
        }
    }
    Ok(())
}

fn connection_filter_sql(filter: &ConnectionFilter) -> (&'static str, Vec<String>) {
    match filter {
        ConnectionFilter::All => ("1 = 1", Vec::new()),
        ConnectionFilter::Id(id) => ("id = ?1", vec![id.clone()]),
        ConnectionFilter::Touching(node_id) => (
            "(from_node_id = ?1 OR to_node_id = ?1)",
            vec![node_id.clone()],
        ),
        ConnectionFilter::Between(a, b) => (
            "((from_node_id = ?1 AND to_node_id = ?2) OR (from_node_id = ?2 AND to_node_id = ?1))",
            vec![a.clone(), b.clone()],
        ),
    }
}

fn parse_node_row(row: &Row<'_>) -> StoreResult<Node> {
    let id: String = row.get("id")?;
    if id.is_empty() {
        return Err(StoreError::InvalidData("empty id in nodes.id".to_string()));
    }

    let x: f64 = row.get("x")?;
    let y: f64 = row.get("y")?;
    let z: f64 = row.get("z")?;

    Ok(Node {
        id,
        name: row.get("name")?,
        detail: row.get("detail")?,
        position: Position::new(x as f32, y as f32, z as f32),
    })
}

fn parse_connection_row(row: &Row<'_>) -> StoreResult<GraphConnection> {
    let id: String = row.get("id")?;
    if id.is_empty() {
        return Err(StoreError::InvalidData(
            "empty id in connections.id".to_string(),
        ));
    }

    let connection = GraphConnection {
        id,
        from_node_id: row.get("from_node_id")?,
        to_node_id: row.get("to_node_id")?,
    };
    connection.validate()?;
    Ok(connection)
}

fn ensure_graph_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for (table, columns) in [("nodes", NODE_COLUMNS), ("connections", CONNECTION_COLUMNS)] {
        if !table_exists(conn, table)? {
            return Err(StoreError::MissingRequiredTable(table));
        }
        for &column in columns {
            if !table_has_column(conn, table, column)? {
                return Err(StoreError::MissingRequiredColumn { table, column });
            }
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> StoreResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> StoreResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get("name")?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
