use chrono::Utc;
use rusqlite::types::{ToSqlOutput, Type};
use rusqlite::{Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::model::{
    Aggregate, DeleteCounts, Edge, EdgeId, EdgeRef, Node, NodeId, PropertyMap, PropertyValue,
};
use crate::store::GraphStore;

use super::migrations::MIGRATIONS;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A SQLite-backed property graph.
///
/// Node and edge properties live in JSON columns and are addressed with
/// `json_extract` using bound paths, so no caller value is ever spliced into
/// SQL text.
#[derive(Debug)]
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a database at the given path and apply migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            Error::ConnectionUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::init(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    /// Highest applied migration version, `0` before any.
    pub fn schema_version(&self) -> Result<u32> {
        let version: Option<u32> = self.conn.query_row(
            "SELECT MAX(version) FROM schema_migrations",
            [],
            |row| row.get(0),
        )?;
        Ok(version.unwrap_or(0))
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self { conn };
        db.apply_migrations()?;
        Ok(db)
    }

    fn apply_migrations(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
            [],
        )?;

        let mut stmt = self
            .conn
            .prepare("SELECT version FROM schema_migrations ORDER BY version")?;
        let applied: Vec<u32> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for migration in MIGRATIONS {
            if !applied.contains(&migration.version) {
                log::info!(
                    "Applying migration {} ({})",
                    migration.version,
                    migration.name
                );
                self.conn.execute_batch(migration.sql)?;
                self.conn.execute(
                    "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
                    rusqlite::params![migration.version, migration.name],
                )?;
            }
        }

        Ok(())
    }

    fn node_exists(&self, id: NodeId) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM nodes WHERE id = ?1", [id.get()], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(found.is_some())
    }

    fn ensure_endpoints(&self, from: NodeId, to: NodeId) -> Result<()> {
        for id in [from, to] {
            if !self.node_exists(id)? {
                return Err(Error::not_found("node", id));
            }
        }
        Ok(())
    }
}

/// JSON path addressing a top-level property. The key is quoted so dots and
/// brackets in property names cannot change the path's shape.
fn json_path(key: &str) -> String {
    format!("$.\"{}\"", key.replace('"', "\\\""))
}

fn parse_properties(idx: usize, raw: &str) -> rusqlite::Result<PropertyMap> {
    serde_json::from_str(raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_node(row: &rusqlite::Row) -> rusqlite::Result<Node> {
    let raw: String = row.get(2)?;
    Ok(Node {
        id: NodeId::new(row.get(0)?),
        label: row.get(1)?,
        properties: parse_properties(2, &raw)?,
    })
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<Edge> {
    let raw: String = row.get(4)?;
    Ok(Edge {
        id: EdgeId::new(row.get(0)?),
        from: NodeId::new(row.get(1)?),
        to: NodeId::new(row.get(2)?),
        label: row.get(3)?,
        properties: parse_properties(4, &raw)?,
    })
}

impl ToSql for PropertyValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        // json_extract yields 1/0 for JSON booleans
        match self {
            Self::Bool(v) => Ok(ToSqlOutput::from(i64::from(*v))),
            Self::Int(v) => Ok(ToSqlOutput::from(*v)),
            Self::Float(v) => Ok(ToSqlOutput::from(*v)),
            Self::Text(v) => Ok(ToSqlOutput::from(v.as_str())),
        }
    }
}

impl GraphStore for Database {
    fn get_node(&self, id: NodeId) -> Result<Node> {
        self.conn
            .query_row(
                "SELECT id, label, properties FROM nodes WHERE id = ?1",
                [id.get()],
                row_to_node,
            )
            .optional()?
            .ok_or_else(|| Error::not_found("node", id))
    }

    fn find_nodes_by_property(
        &self,
        label: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<Vec<Node>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, label, properties
             FROM nodes
             WHERE label = ?1 AND json_extract(properties, ?2) = ?3
             ORDER BY id",
        )?;
        let nodes = stmt
            .query_map(rusqlite::params![label, json_path(key), value], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    fn node_ids(&self, label: &str) -> Result<Vec<NodeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM nodes WHERE label = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map([label], |row| row.get::<_, i64>(0).map(NodeId::new))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    fn create_node(&mut self, label: &str, properties: PropertyMap) -> Result<NodeId> {
        self.conn.execute(
            "INSERT INTO nodes (label, properties) VALUES (?1, ?2)",
            rusqlite::params![label, serde_json::to_string(&properties)?],
        )?;
        Ok(NodeId::new(self.conn.last_insert_rowid()))
    }

    fn create_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef> {
        self.ensure_endpoints(from, to)?;
        self.conn.execute(
            "INSERT INTO edges (from_id, to_id, label, properties, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                from.get(),
                to.get(),
                label,
                serde_json::to_string(&properties)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(EdgeRef {
            id: EdgeId::new(self.conn.last_insert_rowid()),
            created: true,
        })
    }

    fn merge_edge(
        &mut self,
        from: NodeId,
        to: NodeId,
        label: &str,
        properties: PropertyMap,
    ) -> Result<EdgeRef> {
        self.ensure_endpoints(from, to)?;
        let json = serde_json::to_string(&properties)?;
        let tx = self.conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM edges
                 WHERE from_id = ?1 AND to_id = ?2 AND label = ?3
                 ORDER BY id LIMIT 1",
                rusqlite::params![from.get(), to.get(), label],
                |row| row.get(0),
            )
            .optional()?;

        let edge = if let Some(id) = existing {
            tx.execute(
                "UPDATE edges SET properties = ?2 WHERE id = ?1",
                rusqlite::params![id, json],
            )?;
            EdgeRef {
                id: EdgeId::new(id),
                created: false,
            }
        } else {
            tx.execute(
                "INSERT INTO edges (from_id, to_id, label, properties, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![from.get(), to.get(), label, json, Utc::now().to_rfc3339()],
            )?;
            EdgeRef {
                id: EdgeId::new(tx.last_insert_rowid()),
                created: true,
            }
        };

        tx.commit()?;
        Ok(edge)
    }

    fn outgoing_edges(&self, from: NodeId, label: &str) -> Result<Vec<Edge>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, from_id, to_id, label, properties
             FROM edges
             WHERE from_id = ?1 AND label = ?2
             ORDER BY id",
        )?;
        let edges = stmt
            .query_map(rusqlite::params![from.get(), label], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    fn aggregate(&self, label: &str, attribute: &str, op: Aggregate) -> Result<Option<f64>> {
        // The operator comes from a closed enum; only values are bound.
        // json_extract yields 1/0 for JSON booleans.
        let sql = match op {
            Aggregate::Min => {
                "SELECT MIN(json_extract(properties, ?2)) FROM nodes
                 WHERE label = ?1
                   AND json_type(properties, ?2) IN ('integer', 'real', 'true', 'false')"
            }
            Aggregate::Max => {
                "SELECT MAX(json_extract(properties, ?2)) FROM nodes
                 WHERE label = ?1
                   AND json_type(properties, ?2) IN ('integer', 'real', 'true', 'false')"
            }
        };
        let value: Option<f64> = self.conn.query_row(
            sql,
            rusqlite::params![label, json_path(attribute)],
            |row| row.get(0),
        )?;
        Ok(value)
    }

    fn remove_node(&mut self, id: NodeId) -> Result<DeleteCounts> {
        let tx = self.conn.transaction()?;
        let edges = tx.execute(
            "DELETE FROM edges WHERE from_id = ?1 OR to_id = ?1",
            [id.get()],
        )?;
        let nodes = tx.execute("DELETE FROM nodes WHERE id = ?1", [id.get()])?;
        tx.commit()?;

        log::debug!("Removed node {id}: {nodes} nodes, {edges} edges");
        Ok(DeleteCounts { nodes, edges })
    }

    fn remove_edges(&mut self, label: &str, from: NodeId, to: NodeId) -> Result<DeleteCounts> {
        let edges = self.conn.execute(
            "DELETE FROM edges WHERE label = ?1 AND from_id = ?2 AND to_id = ?3",
            rusqlite::params![label, from.get(), to.get()],
        )?;
        Ok(DeleteCounts { nodes: 0, edges })
    }

    fn delete_all(&mut self) -> Result<DeleteCounts> {
        let tx = self.conn.transaction()?;
        let edges = tx.execute("DELETE FROM edges", [])?;
        let nodes = tx.execute("DELETE FROM nodes", [])?;
        tx.commit()?;

        log::info!("Deleted {nodes} nodes and {edges} edges");
        Ok(DeleteCounts { nodes, edges })
    }

    fn count_nodes(&self, label: &str) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM nodes WHERE label = ?1", [label], |row| {
                    row.get(0)
                })?;
        usize::try_from(count).map_err(|e| Error::InvalidData(e.to_string()))
    }

    fn count_edges(&self, label: &str) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM edges WHERE label = ?1", [label], |row| {
                    row.get(0)
                })?;
        usize::try_from(count).map_err(|e| Error::InvalidData(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::track::{MATCHED_LABEL, TRACK_LABEL};
    use crate::props;

    fn seeded() -> (Database, NodeId, NodeId) {
        let mut db = Database::open_in_memory().unwrap();
        let a = db
            .create_node(
                TRACK_LABEL,
                props! { "name" => "Karma Police", "artist" => "Radiohead", "tempo" => 75.0 },
            )
            .unwrap();
        let b = db
            .create_node(
                TRACK_LABEL,
                props! { "name" => "Teardrop", "artist" => "Massive Attack", "tempo" => 77_i64 },
            )
            .unwrap();
        (db, a, b)
    }

    #[test]
    fn test_database_open_in_memory() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.schema_version().unwrap(), 1);
    }

    #[test]
    fn test_node_round_trip() {
        let (db, a, _) = seeded();
        let node = db.get_node(a).unwrap();
        assert_eq!(node.label, TRACK_LABEL);
        assert_eq!(node.property("name"), Some(&PropertyValue::from("Karma Police")));
        assert_eq!(node.property("tempo"), Some(&PropertyValue::Float(75.0)));
    }

    #[test]
    fn test_get_missing_node_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let err = db.get_node(NodeId::new(99)).unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "node", .. }));
    }

    #[test]
    fn test_find_nodes_by_property_binds_values() {
        let (db, a, _) = seeded();
        let found = db
            .find_nodes_by_property(TRACK_LABEL, "artist", &PropertyValue::from("Radiohead"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a);

        // A value that would break an interpolated query is just a string here
        let hostile = PropertyValue::from("x' OR '1'='1");
        let none = db
            .find_nodes_by_property(TRACK_LABEL, "artist", &hostile)
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_find_nodes_by_numeric_property() {
        let (db, _, b) = seeded();
        let found = db
            .find_nodes_by_property(TRACK_LABEL, "tempo", &PropertyValue::Float(77.0))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, b);
    }

    #[test]
    fn test_aggregate_min_max() {
        let (db, _, _) = seeded();
        let min = db.aggregate(TRACK_LABEL, "tempo", Aggregate::Min).unwrap();
        let max = db.aggregate(TRACK_LABEL, "tempo", Aggregate::Max).unwrap();
        assert_eq!(min, Some(75.0));
        assert_eq!(max, Some(77.0));
    }

    #[test]
    fn test_aggregate_ignores_non_numeric_values() {
        let (db, _, _) = seeded();
        let none = db.aggregate(TRACK_LABEL, "name", Aggregate::Max).unwrap();
        assert_eq!(none, None);
        let missing = db.aggregate(TRACK_LABEL, "energy", Aggregate::Min).unwrap();
        assert_eq!(missing, None);
    }

    #[test]
    fn test_aggregate_counts_booleans_as_one_and_zero() {
        let mut db = Database::open_in_memory().unwrap();
        for explicit in [false, true, false] {
            db.create_node(TRACK_LABEL, props! { "explicit" => explicit })
                .unwrap();
        }
        let min = db.aggregate(TRACK_LABEL, "explicit", Aggregate::Min).unwrap();
        let max = db.aggregate(TRACK_LABEL, "explicit", Aggregate::Max).unwrap();
        assert_eq!(min, Some(0.0));
        assert_eq!(max, Some(1.0));
    }

    #[test]
    fn test_create_edge_appends() {
        let (mut db, a, b) = seeded();
        let props = props! { "sim_score" => 0.7 };
        let first = db.create_edge(a, b, MATCHED_LABEL, props.clone()).unwrap();
        let second = db.create_edge(a, b, MATCHED_LABEL, props).unwrap();
        assert!(first.created && second.created);
        assert_ne!(first.id, second.id);
        assert_eq!(db.outgoing_edges(a, MATCHED_LABEL).unwrap().len(), 2);
    }

    #[test]
    fn test_merge_edge_upserts() {
        let (mut db, a, b) = seeded();
        let first = db
            .merge_edge(a, b, MATCHED_LABEL, props! { "sim_score" => 0.5 })
            .unwrap();
        let second = db
            .merge_edge(a, b, MATCHED_LABEL, props! { "sim_score" => 0.9 })
            .unwrap();
        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.id, second.id);

        let edges = db.outgoing_edges(a, MATCHED_LABEL).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].property("sim_score"), Some(&PropertyValue::Float(0.9)));
    }

    #[test]
    fn test_edge_to_missing_node_is_not_found() {
        let (mut db, a, _) = seeded();
        let err = db
            .create_edge(a, NodeId::new(404), MATCHED_LABEL, PropertyMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[test]
    fn test_remove_node_detaches_edges() {
        let (mut db, a, b) = seeded();
        db.create_edge(a, b, MATCHED_LABEL, PropertyMap::new()).unwrap();
        db.create_edge(b, a, MATCHED_LABEL, PropertyMap::new()).unwrap();

        let counts = db.remove_node(a).unwrap();
        assert_eq!(counts, DeleteCounts { nodes: 1, edges: 2 });
        assert_eq!(db.count_nodes(TRACK_LABEL).unwrap(), 1);
        assert_eq!(db.count_edges(MATCHED_LABEL).unwrap(), 0);
    }

    #[test]
    fn test_remove_edges_between_pair() {
        let (mut db, a, b) = seeded();
        db.create_edge(a, b, MATCHED_LABEL, PropertyMap::new()).unwrap();
        db.create_edge(a, b, MATCHED_LABEL, PropertyMap::new()).unwrap();
        db.create_edge(b, a, MATCHED_LABEL, PropertyMap::new()).unwrap();

        let counts = db.remove_edges(MATCHED_LABEL, a, b).unwrap();
        assert_eq!(counts.edges, 2);
        assert_eq!(db.count_edges(MATCHED_LABEL).unwrap(), 1);
    }

    #[test]
    fn test_delete_all() {
        let (mut db, a, b) = seeded();
        db.create_edge(a, b, MATCHED_LABEL, PropertyMap::new()).unwrap();

        let counts = db.delete_all().unwrap();
        assert_eq!(counts, DeleteCounts { nodes: 2, edges: 1 });
        assert!(db.node_ids(TRACK_LABEL).unwrap().is_empty());
    }

    #[test]
    fn test_json_path_quotes_key() {
        assert_eq!(json_path("tempo"), "$.\"tempo\"");
        assert_eq!(json_path("a.b"), "$.\"a.b\"");
    }
}
