//! SQLite-backed variable store and catalog.
//!
//! Variables live in one table; their application and tag links live in
//! link tables so candidate queries can disqualify rows referencing a
//! dimension value outside the request. A denormalized `scope_key` column
//! (see [`Scope::canonical_key`]) serves exact-scope lookups.

use crate::diff::plan_scope_changes;
use crate::error::StoreError;
use crate::store::{ScopeCatalog, VariableStore};
use crate::ScopeChangeSummary;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use parking_lot::Mutex;
use rusqlite::{
    Connection, OptionalExtension, Row, TransactionBehavior, params, params_from_iter,
};
use scopecfg_protocol::{
    ApiKey, ApiKeyId, Application, ApplicationId, Candidate, FlatEntry, Scope, Tag, TagId,
    ValueType, Variable, VariableId,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// SQLite schema version for the store.
const SCHEMA_VERSION: i64 = 1;

/// Columns selected for every variable read, including its links.
const VARIABLE_COLUMNS: &str = "v.id, v.key, v.value, v.value_type, v.created_at, v.updated_at, \
     (SELECT group_concat(application_id) FROM variable_applications \
      WHERE variable_id = v.id), \
     (SELECT group_concat(tag_id) FROM variable_tags WHERE variable_id = v.id)";

/// Variable store and catalog persisted in a SQLite database.
///
/// Trait methods run their queries on tokio's blocking pool, so a write
/// waiting out the busy timeout never stalls a runtime worker. Access to the
/// connection is serialized through a mutex; scope replacements run inside a
/// single transaction.
pub struct SqliteStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) a database file and bring its schema up to date.
    pub fn open(path: &Path, busy_timeout_ms: u64) -> Result<Self, StoreError> {
        let mut connection = Connection::open(path)?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        connection.execute_batch("PRAGMA journal_mode = wal;")?;
        connection.busy_timeout(Duration::from_millis(busy_timeout_ms))?;
        initialize_schema(&mut connection)?;
        info!("opened sqlite variable store (path={})", path.display());
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Insert a row without checking for an existing key in the same scope.
    ///
    /// Used to seed fixtures and imported data, including duplicate rows.
    /// Runs on the calling thread.
    pub fn insert_variable(&self, scope: &Scope, entry: &FlatEntry) -> Result<Variable, StoreError> {
        let conn = self.connection.lock();
        let now = Utc::now();
        let id = insert_variable_row(&conn, scope, entry, now)?;
        Ok(Variable {
            id,
            key: entry.key.clone(),
            value: entry.value.clone(),
            value_type: entry.value_type,
            scope: scope.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Run `work` against the locked connection on the blocking pool.
    async fn with_connection<T, F>(&self, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || work(&mut *connection.lock())).await?
    }
}

#[async_trait]
impl VariableStore for SqliteStore {
    async fn find_candidates(&self, request: &Scope) -> Result<Vec<Candidate>, StoreError> {
        let sql = format!(
            "SELECT {VARIABLE_COLUMNS} FROM variables v \
             WHERE NOT EXISTS (SELECT 1 FROM variable_applications va \
                               WHERE va.variable_id = v.id{}) \
               AND NOT EXISTS (SELECT 1 FROM variable_tags vt \
                               WHERE vt.variable_id = v.id{}) \
             ORDER BY v.key, v.id",
            outside_clause("va.application_id", request.application_ids.len()),
            outside_clause("vt.tag_id", request.tag_ids.len()),
        );
        let ids: Vec<i64> = request
            .application_ids
            .iter()
            .chain(request.tag_ids.iter())
            .copied()
            .collect();

        let candidates = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(params_from_iter(ids), read_variable_row)?;
                let mut candidates = Vec::new();
                for row in rows {
                    let variable = decode_variable(row?)?;
                    candidates.push(Candidate {
                        specificity: variable.scope.dimension_count() as u32,
                        variable,
                    });
                }
                Ok(candidates)
            })
            .await?;
        debug!(
            "sqlite candidates (scope={}, count={})",
            request,
            candidates.len()
        );
        Ok(candidates)
    }

    async fn find_exact(&self, scope: &Scope) -> Result<Vec<Variable>, StoreError> {
        let scope = scope.clone();
        self.with_connection(move |conn| select_exact(conn, &scope))
            .await
    }

    async fn replace_scope(
        &self,
        scope: &Scope,
        entries: &[FlatEntry],
    ) -> Result<ScopeChangeSummary, StoreError> {
        let scope = scope.clone();
        let entries = entries.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let existing = select_exact(&tx, &scope)?;
            let changes = plan_scope_changes(&existing, &entries);
            if changes.is_noop() {
                debug!("scope unchanged (scope={scope})");
                return Ok(changes.summary());
            }

            let now = Utc::now();
            {
                let mut delete = tx.prepare_cached("DELETE FROM variables WHERE id = ?1")?;
                for id in changes.deleted_ids() {
                    delete.execute(params![id])?;
                }
                let mut update = tx.prepare_cached(
                    "UPDATE variables SET value = ?1, value_type = ?2, updated_at = ?3 WHERE id = ?4",
                )?;
                for (id, entry) in &changes.updates {
                    update.execute(params![
                        entry.value,
                        entry.value_type.as_str(),
                        now,
                        id
                    ])?;
                }
            }
            for entry in &changes.inserts {
                insert_variable_row(&tx, &scope, entry, now)?;
            }
            tx.commit()?;
            Ok(changes.summary())
        })
        .await
    }
}

#[async_trait]
impl ScopeCatalog for SqliteStore {
    async fn find_application(
        &self,
        id: ApplicationId,
    ) -> Result<Option<Application>, StoreError> {
        self.with_connection(move |conn| {
            let application = conn
                .query_row(
                    "SELECT id, name, schema_json FROM applications WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Application {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            schema: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(application)
        })
        .await
    }

    async fn find_tag(&self, id: TagId) -> Result<Option<Tag>, StoreError> {
        self.with_connection(move |conn| {
            let tag = conn
                .query_row(
                    "SELECT id, name, tag_group FROM tags WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok(Tag {
                            id: row.get(0)?,
                            name: row.get(1)?,
                            group: row.get(2)?,
                        })
                    },
                )
                .optional()?;
            Ok(tag)
        })
        .await
    }

    async fn find_api_key(&self, id: ApiKeyId) -> Result<Option<ApiKey>, StoreError> {
        self.with_connection(move |conn| {
            let row = conn
                .query_row(
                    "SELECT k.id, k.application_id, k.active_since, k.active_until, \
                     (SELECT group_concat(tag_id) FROM api_key_tags WHERE api_key_id = k.id) \
                     FROM api_keys k WHERE k.id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, ApiKeyId>(0)?,
                            row.get::<_, ApplicationId>(1)?,
                            row.get::<_, DateTime<Utc>>(2)?,
                            row.get::<_, Option<DateTime<Utc>>>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;
            let Some((id, application_id, active_since, active_until, tags)) = row else {
                return Ok(None);
            };
            let mut tag_ids = parse_id_list(tags.as_deref())?;
            tag_ids.sort_unstable();
            Ok(Some(ApiKey {
                id,
                application_id,
                tag_ids,
                active_since,
                active_until,
            }))
        })
        .await
    }

    async fn insert_application(
        &self,
        name: &str,
        schema: Option<&str>,
    ) -> Result<Application, StoreError> {
        let name = name.to_string();
        let schema = schema.map(str::to_string);
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO applications (name, schema_json) VALUES (?1, ?2)",
                params![name, schema],
            )?;
            Ok(Application {
                id: conn.last_insert_rowid(),
                name,
                schema,
            })
        })
        .await
    }

    async fn insert_tag(&self, name: &str, group: &str) -> Result<Tag, StoreError> {
        let name = name.to_string();
        let group = group.to_string();
        self.with_connection(move |conn| {
            conn.execute(
                "INSERT INTO tags (name, tag_group) VALUES (?1, ?2)",
                params![name, group],
            )?;
            Ok(Tag {
                id: conn.last_insert_rowid(),
                name,
                group,
            })
        })
        .await
    }

    async fn insert_api_key(
        &self,
        application_id: ApplicationId,
        tag_ids: &[TagId],
        active_since: DateTime<Utc>,
        active_until: Option<DateTime<Utc>>,
    ) -> Result<ApiKey, StoreError> {
        let tag_ids = tag_ids.to_vec();
        self.with_connection(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let known: Option<i64> = tx
                .query_row(
                    "SELECT id FROM applications WHERE id = ?1",
                    params![application_id],
                    |row| row.get(0),
                )
                .optional()?;
            if known.is_none() {
                return Err(StoreError::MissingReference(format!(
                    "application {application_id}"
                )));
            }
            tx.execute(
                "INSERT INTO api_keys (application_id, active_since, active_until) \
                 VALUES (?1, ?2, ?3)",
                params![application_id, active_since, active_until],
            )?;
            let id = tx.last_insert_rowid();
            {
                let mut link = tx
                    .prepare_cached("INSERT INTO api_key_tags (api_key_id, tag_id) VALUES (?1, ?2)")?;
                for tag_id in &tag_ids {
                    link.execute(params![id, tag_id]).map_err(|err| {
                        missing_reference_or(err, || format!("tag {tag_id}"))
                    })?;
                }
            }
            tx.commit()?;
            Ok(ApiKey {
                id,
                application_id,
                tag_ids,
                active_since,
                active_until,
            })
        })
        .await
    }
}

/// Raw column values of one variable row.
type VariableRow = (
    VariableId,
    String,
    String,
    String,
    DateTime<Utc>,
    DateTime<Utc>,
    Option<String>,
    Option<String>,
);

fn read_variable_row(row: &Row<'_>) -> rusqlite::Result<VariableRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_variable(row: VariableRow) -> Result<Variable, StoreError> {
    let (id, key, value, value_type, created_at, updated_at, applications, tags) = row;
    let value_type: ValueType = value_type
        .parse()
        .map_err(|err| StoreError::Corrupt(format!("variable {id}: {err}")))?;
    Ok(Variable {
        id,
        key,
        value,
        value_type,
        scope: Scope::new(
            parse_id_list(applications.as_deref())?,
            parse_id_list(tags.as_deref())?,
        ),
        created_at,
        updated_at,
    })
}

/// Parse a `group_concat` list of ids; `None` means no links.
fn parse_id_list(raw: Option<&str>) -> Result<Vec<i64>, StoreError> {
    let Some(raw) = raw else {
        return Ok(Vec::new());
    };
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|_| StoreError::Corrupt(format!("invalid linked id: {part}")))
        })
        .collect()
}

/// Extra predicate restricting a link subquery to ids outside the request.
///
/// With no requested ids any link at all disqualifies the row.
fn outside_clause(column: &str, requested: usize) -> String {
    if requested == 0 {
        return String::new();
    }
    let placeholders = vec!["?"; requested].join(", ");
    format!(" AND {column} NOT IN ({placeholders})")
}

fn select_exact(conn: &Connection, scope: &Scope) -> Result<Vec<Variable>, StoreError> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {VARIABLE_COLUMNS} FROM variables v WHERE v.scope_key = ?1 ORDER BY v.key, v.id"
    ))?;
    let rows = stmt.query_map(params![scope.canonical_key()], read_variable_row)?;
    let mut variables = Vec::new();
    for row in rows {
        variables.push(decode_variable(row?)?);
    }
    Ok(variables)
}

fn insert_variable_row(
    conn: &Connection,
    scope: &Scope,
    entry: &FlatEntry,
    now: DateTime<Utc>,
) -> Result<VariableId, StoreError> {
    conn.prepare_cached(
        "INSERT INTO variables (key, value, value_type, scope_key, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
    )?
    .execute(params![
        entry.key,
        entry.value,
        entry.value_type.as_str(),
        scope.canonical_key(),
        now
    ])?;
    let id = conn.last_insert_rowid();
    {
        let mut link = conn.prepare_cached(
            "INSERT INTO variable_applications (variable_id, application_id) VALUES (?1, ?2)",
        )?;
        for application_id in &scope.application_ids {
            link.execute(params![id, application_id])
                .map_err(|err| missing_reference_or(err, || format!("application {application_id}")))?;
        }
    }
    let mut link =
        conn.prepare_cached("INSERT INTO variable_tags (variable_id, tag_id) VALUES (?1, ?2)")?;
    for tag_id in &scope.tag_ids {
        link.execute(params![id, tag_id])
            .map_err(|err| missing_reference_or(err, || format!("tag {tag_id}")))?;
    }
    Ok(id)
}

/// Map foreign key violations to `MissingReference`.
fn missing_reference_or(err: rusqlite::Error, describe: impl FnOnce() -> String) -> StoreError {
    match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => StoreError::MissingReference(describe()),
        _ => StoreError::Db(err),
    }
}

/// Initializes the SQLite schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), StoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| {
            row.get(0)
        })
        .optional()?;
    match version {
        None => {
            tx.execute(
                "INSERT INTO store_meta (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS applications (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    schema_json TEXT
                );
                CREATE TABLE IF NOT EXISTS tags (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    tag_group TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS api_keys (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    application_id INTEGER NOT NULL REFERENCES applications(id),
                    active_since TEXT NOT NULL,
                    active_until TEXT
                );
                CREATE TABLE IF NOT EXISTS api_key_tags (
                    api_key_id INTEGER NOT NULL REFERENCES api_keys(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id),
                    PRIMARY KEY (api_key_id, tag_id)
                );
                CREATE TABLE IF NOT EXISTS variables (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    key TEXT NOT NULL CHECK (length(key) <= 512),
                    value TEXT NOT NULL,
                    value_type TEXT NOT NULL CHECK (value_type IN ('String', 'Number', 'Boolean')),
                    scope_key TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_variables_scope_key
                    ON variables (scope_key, key);
                CREATE TABLE IF NOT EXISTS variable_applications (
                    variable_id INTEGER NOT NULL REFERENCES variables(id) ON DELETE CASCADE,
                    application_id INTEGER NOT NULL REFERENCES applications(id),
                    PRIMARY KEY (variable_id, application_id)
                );
                CREATE TABLE IF NOT EXISTS variable_tags (
                    variable_id INTEGER NOT NULL REFERENCES variables(id) ON DELETE CASCADE,
                    tag_id INTEGER NOT NULL REFERENCES tags(id),
                    PRIMARY KEY (variable_id, tag_id)
                );",
            )?;
        }
        Some(SCHEMA_VERSION) => {}
        Some(other) => return Err(StoreError::UnsupportedSchema(other)),
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{outside_clause, parse_id_list};
    use pretty_assertions::assert_eq;

    #[test]
    fn outside_clause_disqualifies_every_link_when_nothing_requested() {
        assert_eq!(outside_clause("va.application_id", 0), "");
        assert_eq!(
            outside_clause("vt.tag_id", 2),
            " AND vt.tag_id NOT IN (?, ?)"
        );
    }

    #[test]
    fn parses_group_concat_lists() {
        assert_eq!(parse_id_list(None).expect("none"), Vec::<i64>::new());
        assert_eq!(parse_id_list(Some("3,1")).expect("ids"), vec![3, 1]);
        assert!(parse_id_list(Some("3,x")).is_err());
    }
}
