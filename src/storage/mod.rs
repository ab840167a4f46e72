use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::config::{ConfigPaths, StorageOptions};
use crate::deck::{Attributes, Category, Entry, SortKey, StatKey};
use crate::error::{DeckError, DeckResult};

mod schema;

const CATEGORY_DELIMITER: &str = "|:|";

const ENTRY_COLUMNS: &str = "p.id,
                        p.name,
                        p.image,
                        p.hp,
                        p.attack,
                        p.defense,
                        p.special_attack,
                        p.special_defense,
                        p.speed";

/// Server-side ordering for [`DeckGateway::load_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeckOrder {
    pub key: SortKey,
    pub ascending: bool,
}

impl Default for DeckOrder {
    fn default() -> Self {
        Self {
            key: SortKey::Name,
            ascending: true,
        }
    }
}

impl DeckOrder {
    fn clause(&self) -> String {
        let direction = if self.ascending { "ASC" } else { "DESC" };
        match self.key {
            SortKey::Id => format!("p.id {direction}"),
            SortKey::Name => format!("p.name {direction}, p.id ASC"),
            SortKey::Type => format!("MIN(t.name) {direction}, p.id ASC"),
            SortKey::Total => format!(
                "(p.hp + p.attack + p.defense + p.special_attack + p.special_defense + p.speed) {direction}, p.id ASC"
            ),
            other => {
                let column = other.stat().map(StatKey::column).unwrap_or("id");
                format!("p.{column} {direction}, p.id ASC")
            }
        }
    }
}

/// The four storage operations the deck depends on.
pub trait DeckGateway: Send + Sync + 'static {
    fn load_all(&self, order: Option<DeckOrder>) -> DeckResult<Vec<Entry>>;
    fn load_filtered(&self, category: Category) -> DeckResult<Vec<Entry>>;
    fn insert(&self, entry: &Entry) -> DeckResult<()>;
    fn remove(&self, id: i64) -> DeckResult<()>;
}

#[derive(Clone)]
pub struct StorageHandle {
    db_path: Arc<PathBuf>,
    options: Arc<StorageOptions>,
}

impl StorageHandle {
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)
            .with_context(|| format!("opening database {}", self.db_path.display()))?;
        prepare_connection(&conn, &self.options)?;
        Ok(conn)
    }

    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    pub fn fetch_entries(&self, order: DeckOrder) -> Result<Vec<Entry>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {columns},
                        COALESCE(GROUP_CONCAT(t.name, '{delim}'), '')
                 FROM pokemon p
                 LEFT JOIN pokemon_types pt ON pt.pokemon_id = p.id
                 LEFT JOIN types t ON t.id = pt.type_id
                 GROUP BY p.id
                 ORDER BY {order}",
                columns = ENTRY_COLUMNS,
                delim = CATEGORY_DELIMITER,
                order = order.clause()
            );
            let mut stmt = conn.prepare(&sql).context("preparing deck query")?;
            let entries = stmt
                .query_map([], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .context("querying deck")?;
            Ok(entries)
        })
    }

    pub fn fetch_entries_with_category(&self, category: Category) -> Result<Vec<Entry>> {
        self.with_connection(|conn| {
            let sql = format!(
                "SELECT {columns},
                        COALESCE((
                            SELECT GROUP_CONCAT(t2.name, '{delim}')
                            FROM pokemon_types pt2
                            INNER JOIN types t2 ON t2.id = pt2.type_id
                            WHERE pt2.pokemon_id = p.id
                        ), '')
                 FROM pokemon p
                 WHERE EXISTS (
                     SELECT 1
                     FROM pokemon_types pt
                     INNER JOIN types t ON t.id = pt.type_id
                     WHERE pt.pokemon_id = p.id AND t.name = ?1
                 )",
                columns = ENTRY_COLUMNS,
                delim = CATEGORY_DELIMITER
            );
            let mut stmt = conn
                .prepare(&sql)
                .context("preparing category filter query")?;
            let entries = stmt
                .query_map(params![category.as_ref()], entry_from_row)?
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("querying {category} entries"))?;
            Ok(entries)
        })
    }

    /// Inserts the entry row and its category links in one transaction, so an
    /// unknown category leaves nothing behind.
    pub fn insert_entry(&self, entry: &Entry) -> DeckResult<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction().context("starting insert transaction")?;
        tx.execute(
            "INSERT INTO pokemon (id, name, image, hp, attack, defense, special_attack, special_defense, speed, total)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id,
                entry.name,
                entry.image,
                entry.attribute(StatKey::Hp),
                entry.attribute(StatKey::Attack),
                entry.attribute(StatKey::Defense),
                entry.attribute(StatKey::SpecialAttack),
                entry.attribute(StatKey::SpecialDefense),
                entry.attribute(StatKey::Speed),
                entry.total(),
            ],
        )
        .with_context(|| format!("inserting pokemon #{}", entry.id))?;

        for label in &entry.categories {
            let type_id: Option<i64> = tx
                .query_row(
                    "SELECT id FROM types WHERE name = ?1",
                    params![label.to_ascii_lowercase()],
                    |row| row.get(0),
                )
                .optional()
                .with_context(|| format!("looking up category '{label}'"))?;
            let Some(type_id) = type_id else {
                return Err(DeckError::CategoryNotFound(label.clone()));
            };
            tx.execute(
                "INSERT OR IGNORE INTO pokemon_types (pokemon_id, type_id) VALUES (?1, ?2)",
                params![entry.id, type_id],
            )
            .with_context(|| format!("linking category '{label}' to pokemon #{}", entry.id))?;
        }

        tx.commit().context("committing insert")?;
        Ok(())
    }

    pub fn delete_entry(&self, id: i64) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute("DELETE FROM pokemon WHERE id = ?1", params![id])
                .with_context(|| format!("deleting pokemon #{id}"))
        })
    }

    pub fn list_categories(&self) -> Result<Vec<String>> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare("SELECT name FROM types ORDER BY name")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            rows.collect::<Result<Vec<_>, _>>()
                .context("fetching categories")
        })
    }
}

impl DeckGateway for StorageHandle {
    fn load_all(&self, order: Option<DeckOrder>) -> DeckResult<Vec<Entry>> {
        Ok(self.fetch_entries(order.unwrap_or_default())?)
    }

    fn load_filtered(&self, category: Category) -> DeckResult<Vec<Entry>> {
        Ok(self.fetch_entries_with_category(category)?)
    }

    fn insert(&self, entry: &Entry) -> DeckResult<()> {
        self.insert_entry(entry)
    }

    fn remove(&self, id: i64) -> DeckResult<()> {
        let removed = self.delete_entry(id)?;
        if removed == 0 {
            tracing::debug!(entry_id = id, "remove matched no stored row");
        }
        Ok(())
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<Entry> {
    let mut attributes = Attributes::default();
    for (offset, key) in StatKey::ALL.iter().enumerate() {
        attributes.set(*key, row.get::<_, u32>(3 + offset)?);
    }
    let categories: String = row.get(9)?;
    Ok(Entry::new(
        row.get(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        parse_categories(&categories),
        attributes,
    ))
}

fn parse_categories(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(CATEGORY_DELIMITER)
        .filter(|label| !label.is_empty())
        .map(|label| label.to_string())
        .collect()
}

pub fn init(paths: &ConfigPaths, storage: &StorageOptions) -> Result<StorageHandle> {
    let db_path = &storage.database_path;
    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating data directory {}", parent.display()))?;
    }
    let conn = Connection::open(db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;
    prepare_connection(&conn, storage)?;
    schema::apply(&conn)?;
    tracing::debug!(
        database = %db_path.display(),
        data_dir = %paths.data_dir.display(),
        "storage ready"
    );
    Ok(StorageHandle {
        db_path: Arc::new(db_path.clone()),
        options: Arc::new(storage.clone()),
    })
}

fn prepare_connection(conn: &Connection, storage: &StorageOptions) -> Result<()> {
    conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)
        .context("enabling foreign keys")?;
    conn.busy_timeout(Duration::from_millis(storage.busy_timeout_ms))
        .context("setting busy timeout")?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("setting journal_mode=WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")
        .context("setting synchronous=NORMAL")?;
    conn.pragma_update(
        None,
        "wal_autocheckpoint",
        storage.wal_autocheckpoint.to_string(),
    )
    .context("setting wal_autocheckpoint")?;
    Ok(())
}
