//! SQLite storage backend for the curation graph

use super::traits::{
    EntityFilter, GraphStore, LinkFilter, LinkRemoval, OpenStore, StorageError, StorageResult,
};
use crate::graph::{
    DataSource, DataSourceId, Entity, EntityDraft, EntityId, EntityKind, Label, Link, LinkWrite,
    SourceState,
};
use crate::stitch::{KeyKind, StitchKey};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed graph store
///
/// One database file holds sources, entities, labels, the stitch key index,
/// links and the deprecated-key registry. Thread-safe via an internal mutex
/// on the connection; every trait method is a single critical section, which
/// is what makes `find_or_create_*` atomic.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                origin TEXT NOT NULL,
                format TEXT NOT NULL,
                properties_json TEXT NOT NULL,
                instances INTEGER NOT NULL,
                state TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source_id TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                kind TEXT NOT NULL,
                source_key TEXT,
                properties_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                UNIQUE (source_id, ordinal),
                FOREIGN KEY (source_id) REFERENCES sources(id)
            );

            CREATE TABLE IF NOT EXISTS labels (
                entity_id INTEGER NOT NULL,
                label TEXT NOT NULL,
                PRIMARY KEY (entity_id, label),
                FOREIGN KEY (entity_id) REFERENCES entities(id)
            );
            CREATE INDEX IF NOT EXISTS idx_labels_label ON labels(label);

            -- Persistent key index: (kind, value) -> entities
            CREATE TABLE IF NOT EXISTS stitch_keys (
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                entity_id INTEGER NOT NULL,
                PRIMARY KEY (kind, value, entity_id),
                FOREIGN KEY (entity_id) REFERENCES entities(id)
            );
            CREATE INDEX IF NOT EXISTS idx_stitch_keys_entity ON stitch_keys(entity_id);

            CREATE TABLE IF NOT EXISTS links (
                source_id INTEGER NOT NULL,
                target_id INTEGER NOT NULL,
                kind TEXT NOT NULL,
                values_json TEXT NOT NULL,
                created_at TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, kind)
            );
            CREATE INDEX IF NOT EXISTS idx_links_target ON links(target_id);
            CREATE INDEX IF NOT EXISTS idx_links_kind ON links(kind);

            CREATE TABLE IF NOT EXISTS deprecated_keys (
                kind TEXT NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (kind, value)
            );

            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    fn parse_time(table: &'static str, raw: &str) -> StorageResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::CorruptRow {
                table,
                message: e.to_string(),
            })
    }

    fn parse_kind(table: &'static str, raw: &str) -> StorageResult<KeyKind> {
        raw.parse::<KeyKind>().map_err(|e| StorageError::CorruptRow {
            table,
            message: e.to_string(),
        })
    }

    fn parse_label(raw: &str) -> StorageResult<Label> {
        raw.parse::<Label>()
            .map_err(|message| StorageError::CorruptRow { table: "labels", message })
    }

    fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<SourceRow> {
        Ok(SourceRow {
            id: row.get(0)?,
            name: row.get(1)?,
            origin: row.get(2)?,
            format: row.get(3)?,
            properties_json: row.get(4)?,
            instances: row.get(5)?,
            state: row.get(6)?,
            metadata_json: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn source_from_row(row: SourceRow) -> StorageResult<DataSource> {
        let state = match row.state.as_str() {
            "pending" => SourceState::Pending,
            "complete" => SourceState::Complete,
            other => {
                return Err(StorageError::CorruptRow {
                    table: "sources",
                    message: format!("unknown state {}", other),
                })
            }
        };
        Ok(DataSource {
            id: DataSourceId::from_hex(row.id),
            name: row.name,
            origin: row.origin,
            format: row.format,
            properties: serde_json::from_str(&row.properties_json)?,
            instances: row.instances.max(0) as u64,
            state,
            metadata: serde_json::from_str(&row.metadata_json)?,
            created_at: Self::parse_time("sources", &row.created_at)?,
        })
    }

    fn load_source_locked(conn: &Connection, id: &DataSourceId) -> StorageResult<Option<DataSource>> {
        let row = conn
            .query_row(
                "SELECT id, name, origin, format, properties_json, instances, state, metadata_json, created_at
                 FROM sources WHERE id = ?1",
                params![id.as_str()],
                Self::row_to_source,
            )
            .optional()?;
        row.map(Self::source_from_row).transpose()
    }

    fn labels_locked(conn: &Connection, id: EntityId) -> StorageResult<BTreeSet<Label>> {
        let mut stmt = conn.prepare("SELECT label FROM labels WHERE entity_id = ?1")?;
        let rows = stmt.query_map(params![id.get()], |row| row.get::<_, String>(0))?;
        let mut labels = BTreeSet::new();
        for raw in rows {
            labels.insert(Self::parse_label(&raw?)?);
        }
        Ok(labels)
    }

    fn row_to_entity(row: &rusqlite::Row<'_>) -> rusqlite::Result<EntityRow> {
        Ok(EntityRow {
            id: row.get(0)?,
            source_id: row.get(1)?,
            ordinal: row.get(2)?,
            kind: row.get(3)?,
            source_key: row.get(4)?,
            properties_json: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn entity_from_row(row: EntityRow, labels: BTreeSet<Label>) -> StorageResult<Entity> {
        Ok(Entity {
            id: EntityId::new(row.id),
            kind: row.kind.parse::<EntityKind>().map_err(|message| StorageError::CorruptRow {
                table: "entities",
                message,
            })?,
            source: DataSourceId::from_hex(row.source_id),
            ordinal: row.ordinal.max(0) as u64,
            source_key: row.source_key,
            properties: serde_json::from_str(&row.properties_json)?,
            labels,
            created_at: Self::parse_time("entities", &row.created_at)?,
        })
    }

    fn row_to_link(row: &rusqlite::Row<'_>) -> rusqlite::Result<(i64, i64, String, String, String)> {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
    }

    fn link_from_row(row: (i64, i64, String, String, String)) -> StorageResult<Link> {
        let (source, target, kind, values_json, created_at) = row;
        Ok(Link {
            source: EntityId::new(source),
            target: EntityId::new(target),
            kind: Self::parse_kind("links", &kind)?,
            values: serde_json::from_str(&values_json)?,
            created_at: Self::parse_time("links", &created_at)?,
        })
    }
}

struct SourceRow {
    id: String,
    name: String,
    origin: String,
    format: String,
    properties_json: String,
    instances: i64,
    state: String,
    metadata_json: String,
    created_at: String,
}

struct EntityRow {
    id: i64,
    source_id: String,
    ordinal: i64,
    kind: String,
    source_key: Option<String>,
    properties_json: String,
    created_at: String,
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl GraphStore for SqliteStore {
    // === Data source operations ===

    fn find_or_create_source(&self, draft: &DataSource) -> StorageResult<(DataSource, bool)> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            r#"
            INSERT INTO sources (id, name, origin, format, properties_json, instances, state, metadata_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO NOTHING
            "#,
            params![
                draft.id.as_str(),
                draft.name,
                draft.origin,
                draft.format,
                serde_json::to_string(&draft.properties)?,
                draft.instances as i64,
                draft.state.as_str(),
                serde_json::to_string(&draft.metadata)?,
                draft.created_at.to_rfc3339(),
            ],
        )?;
        let stored = Self::load_source_locked(&conn, &draft.id)?
            .ok_or_else(|| StorageError::SourceNotFound(draft.id.to_string()))?;
        Ok((stored, inserted > 0))
    }

    fn load_source(&self, id: &DataSourceId) -> StorageResult<Option<DataSource>> {
        let conn = self.conn()?;
        Self::load_source_locked(&conn, id)
    }

    fn update_source(&self, source: &DataSource) -> StorageResult<()> {
        let conn = self.conn()?;
        let rows = conn.execute(
            r#"
            UPDATE sources
            SET properties_json = ?2, instances = ?3, state = ?4, metadata_json = ?5
            WHERE id = ?1
            "#,
            params![
                source.id.as_str(),
                serde_json::to_string(&source.properties)?,
                source.instances as i64,
                source.state.as_str(),
                serde_json::to_string(&source.metadata)?,
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::SourceNotFound(source.id.to_string()));
        }
        Ok(())
    }

    fn list_sources(&self) -> StorageResult<Vec<DataSource>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, origin, format, properties_json, instances, state, metadata_json, created_at
             FROM sources ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], Self::row_to_source)?;
        let mut sources = Vec::new();
        for row in rows {
            sources.push(Self::source_from_row(row?)?);
        }
        Ok(sources)
    }

    // === Entity operations ===

    fn find_or_create_entity(&self, draft: &EntityDraft) -> StorageResult<(EntityId, bool)> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM entities WHERE source_id = ?1 AND ordinal = ?2",
                params![draft.source.as_str(), draft.ordinal as i64],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok((EntityId::new(id), false));
        }

        tx.execute(
            r#"
            INSERT INTO entities (source_id, ordinal, kind, source_key, properties_json, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                draft.source.as_str(),
                draft.ordinal as i64,
                draft.kind.as_str(),
                draft.source_key,
                serde_json::to_string(&draft.properties)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        for label in &draft.labels {
            tx.execute(
                "INSERT OR IGNORE INTO labels (entity_id, label) VALUES (?1, ?2)",
                params![id, label.to_string()],
            )?;
        }
        tx.commit()?;

        Ok((EntityId::new(id), true))
    }

    fn load_entity(&self, id: EntityId) -> StorageResult<Option<Entity>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, source_id, ordinal, kind, source_key, properties_json, created_at
                 FROM entities WHERE id = ?1",
                params![id.get()],
                Self::row_to_entity,
            )
            .optional()?;
        match row {
            Some(row) => {
                let labels = Self::labels_locked(&conn, id)?;
                Ok(Some(Self::entity_from_row(row, labels)?))
            }
            None => Ok(None),
        }
    }

    fn entity_ids(&self, filter: &EntityFilter) -> StorageResult<Vec<EntityId>> {
        let conn = self.conn()?;

        let mut sql = String::from("SELECT e.id FROM entities e WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref label) = filter.label {
            sql.push_str(" AND EXISTS (SELECT 1 FROM labels l WHERE l.entity_id = e.id AND l.label = ?)");
            params_vec.push(Box::new(label.to_string()));
        }

        if let Some(ref source) = filter.source {
            sql.push_str(" AND e.source_id = ?");
            params_vec.push(Box::new(source.as_str().to_string()));
        }

        sql.push_str(" ORDER BY e.id");

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), |row| row.get::<_, i64>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(EntityId::new(id?));
        }
        Ok(ids)
    }

    fn load_entities(&self) -> StorageResult<Vec<Entity>> {
        let conn = self.conn()?;

        let mut labels: BTreeMap<i64, BTreeSet<Label>> = BTreeMap::new();
        {
            let mut stmt = conn.prepare("SELECT entity_id, label FROM labels")?;
            let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
            for row in rows {
                let (id, raw) = row?;
                labels.entry(id).or_default().insert(Self::parse_label(&raw)?);
            }
        }

        let mut stmt = conn.prepare(
            "SELECT id, source_id, ordinal, kind, source_key, properties_json, created_at
             FROM entities ORDER BY id",
        )?;
        let rows = stmt.query_map([], Self::row_to_entity)?;
        let mut entities = Vec::new();
        for row in rows {
            let row = row?;
            let entity_labels = labels.remove(&row.id).unwrap_or_default();
            entities.push(Self::entity_from_row(row, entity_labels)?);
        }
        Ok(entities)
    }

    // === Label operations ===

    fn add_label(&self, id: EntityId, label: &Label) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO labels (entity_id, label) VALUES (?1, ?2)",
            params![id.get(), label.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn remove_label(&self, id: EntityId, label: &Label) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM labels WHERE entity_id = ?1 AND label = ?2",
            params![id.get(), label.to_string()],
        )?;
        Ok(rows > 0)
    }

    fn clear_cluster_labels(&self, ids: &[EntityId]) -> StorageResult<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                DELETE FROM labels
                WHERE entity_id = ?1
                  AND (label IN ('SINGLETON', 'GROUP', 'SUPERNODE') OR label LIKE 'cc:%')
                "#,
            )?;
            for id in ids {
                removed += stmt.execute(params![id.get()])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    fn add_labels(&self, labels: &[(EntityId, Label)]) -> StorageResult<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("INSERT OR IGNORE INTO labels (entity_id, label) VALUES (?1, ?2)")?;
            for (id, label) in labels {
                stmt.execute(params![id.get(), label.to_string()])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    // === Key index operations ===

    fn index_key(&self, id: EntityId, key: &StitchKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO stitch_keys (kind, value, entity_id) VALUES (?1, ?2, ?3)",
            params![key.kind.as_str(), key.value, id.get()],
        )?;
        Ok(rows > 0)
    }

    fn lookup_key(&self, key: &StitchKey) -> StorageResult<Vec<EntityId>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT entity_id FROM stitch_keys WHERE kind = ?1 AND value = ?2 ORDER BY entity_id",
        )?;
        let rows = stmt.query_map(params![key.kind.as_str(), key.value], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for id in rows {
            ids.push(EntityId::new(id?));
        }
        Ok(ids)
    }

    fn entity_keys(&self, id: EntityId) -> StorageResult<BTreeSet<StitchKey>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT kind, value FROM stitch_keys WHERE entity_id = ?1")?;
        let rows = stmt.query_map(params![id.get()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut keys = BTreeSet::new();
        for row in rows {
            let (kind, value) = row?;
            keys.insert(StitchKey::normalized(Self::parse_kind("stitch_keys", &kind)?, value));
        }
        Ok(keys)
    }

    fn key_sharers(
        &self,
        kind: KeyKind,
        scope: Option<&Label>,
    ) -> StorageResult<BTreeMap<String, Vec<EntityId>>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT k.value, k.entity_id FROM stitch_keys k
            WHERE k.kind = ?1
              AND (?2 IS NULL OR EXISTS (
                    SELECT 1 FROM labels l WHERE l.entity_id = k.entity_id AND l.label = ?2))
            ORDER BY k.value, k.entity_id
            "#,
        )?;
        let scope = scope.map(|l| l.to_string());
        let rows = stmt.query_map(params![kind.as_str(), scope], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        let mut sharers: BTreeMap<String, Vec<EntityId>> = BTreeMap::new();
        for row in rows {
            let (value, id) = row?;
            sharers.entry(value).or_default().push(EntityId::new(id));
        }
        Ok(sharers)
    }

    fn deprecate_key(&self, key: &StitchKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "INSERT OR IGNORE INTO deprecated_keys (kind, value) VALUES (?1, ?2)",
            params![key.kind.as_str(), key.value],
        )?;
        Ok(rows > 0)
    }

    fn is_deprecated(&self, key: &StitchKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM deprecated_keys WHERE kind = ?1 AND value = ?2",
                params![key.kind.as_str(), key.value],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // === Link operations ===

    fn upsert_link(&self, link: &Link) -> StorageResult<LinkWrite> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT values_json FROM links WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                params![link.source.get(), link.target.get(), link.kind.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    r#"
                    INSERT INTO links (source_id, target_id, kind, values_json, created_at)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                    "#,
                    params![
                        link.source.get(),
                        link.target.get(),
                        link.kind.as_str(),
                        serde_json::to_string(&link.values)?,
                        link.created_at.to_rfc3339(),
                    ],
                )?;
                LinkWrite::Created
            }
            Some(values_json) => {
                let mut values: Vec<String> = serde_json::from_str(&values_json)?;
                let before = values.len();
                for value in &link.values {
                    if !values.contains(value) {
                        values.push(value.clone());
                    }
                }
                if values.len() == before {
                    LinkWrite::Unchanged
                } else {
                    tx.execute(
                        "UPDATE links SET values_json = ?4 WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                        params![
                            link.source.get(),
                            link.target.get(),
                            link.kind.as_str(),
                            serde_json::to_string(&values)?,
                        ],
                    )?;
                    LinkWrite::Extended
                }
            }
        };
        tx.commit()?;
        Ok(outcome)
    }

    fn links(&self, filter: &LinkFilter) -> StorageResult<Vec<Link>> {
        let conn = self.conn()?;

        let mut sql =
            String::from("SELECT source_id, target_id, kind, values_json, created_at FROM links WHERE 1 = 1");
        let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref kinds) = filter.kinds {
            if kinds.is_empty() {
                return Ok(Vec::new());
            }
            let placeholders = vec!["?"; kinds.len()].join(", ");
            sql.push_str(&format!(" AND kind IN ({})", placeholders));
            for kind in kinds {
                params_vec.push(Box::new(kind.as_str().to_string()));
            }
        }

        if let Some(entity) = filter.entity {
            sql.push_str(" AND (source_id = ? OR target_id = ?)");
            params_vec.push(Box::new(entity.get()));
            params_vec.push(Box::new(entity.get()));
        }

        sql.push_str(" ORDER BY source_id, target_id, kind");

        let mut stmt = conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();
        let rows = stmt.query_map(params_refs.as_slice(), Self::row_to_link)?;

        let mut links = Vec::new();
        for row in rows {
            links.push(Self::link_from_row(row?)?);
        }
        Ok(links)
    }

    fn remove_link_value(&self, kind: KeyKind, value: &str) -> StorageResult<LinkRemoval> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let mut affected: Vec<(i64, i64, Vec<String>)> = Vec::new();
        {
            let mut stmt =
                tx.prepare("SELECT source_id, target_id, values_json FROM links WHERE kind = ?1")?;
            let rows = stmt.query_map(params![kind.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?, row.get::<_, String>(2)?))
            })?;
            for row in rows {
                let (source, target, values_json) = row?;
                let values: Vec<String> = serde_json::from_str(&values_json)?;
                if values.iter().any(|v| v == value) {
                    affected.push((source, target, values));
                }
            }
        }

        let mut removal = LinkRemoval::default();
        for (source, target, mut values) in affected {
            values.retain(|v| v != value);
            if values.is_empty() {
                tx.execute(
                    "DELETE FROM links WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                    params![source, target, kind.as_str()],
                )?;
                removal.deleted += 1;
            } else {
                tx.execute(
                    "UPDATE links SET values_json = ?4 WHERE source_id = ?1 AND target_id = ?2 AND kind = ?3",
                    params![source, target, kind.as_str(), serde_json::to_string(&values)?],
                )?;
                removal.trimmed += 1;
            }
        }
        tx.commit()?;
        Ok(removal)
    }

    fn link_counts(&self) -> StorageResult<BTreeMap<KeyKind, usize>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT kind, COUNT(*) FROM links GROUP BY kind")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        let mut counts = BTreeMap::new();
        for row in rows {
            let (kind, count) = row?;
            counts.insert(Self::parse_kind("links", &kind)?, count.max(0) as usize);
        }
        Ok(counts)
    }
}
