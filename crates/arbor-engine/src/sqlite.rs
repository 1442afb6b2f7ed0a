use std::path::{Path, PathBuf};
use std::sync::Arc;

use regex::bytes::Regex;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, info};

use arbor_types::{ObjectId, TypeTag};

use crate::error::{EngineError, EngineResult};
use crate::traits::{Engine, OpenMode};
use crate::value::SqlValue;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// SQLite backend.
///
/// Wraps a single `rusqlite::Connection`. The connection runs in
/// autocommit mode between [`Engine::begin`] and [`Engine::commit`] /
/// [`Engine::rollback`] brackets.
pub struct SqliteEngine {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteEngine {
    /// Open a private in-memory database.
    pub fn open_in_memory() -> EngineResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn, None)
    }

    /// Open a database file according to `mode`.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> EngineResult<Self> {
        let path = path.as_ref();
        match mode {
            OpenMode::MustExist if !path.exists() => {
                return Err(EngineError::MissingDatabase(path.to_path_buf()));
            }
            OpenMode::CreateFresh if path.exists() => {
                debug!(path = %path.display(), "removing existing database file");
                std::fs::remove_file(path)?;
            }
            _ => {}
        }
        let conn = Connection::open(path)?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> EngineResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS _id_counter (value INTEGER NOT NULL);
            INSERT INTO _id_counter (value)
                SELECT 0 WHERE NOT EXISTS (SELECT 1 FROM _id_counter);
            "#,
        )?;
        let engine = Self { conn, path };
        engine.register_regexp()?;
        info!(
            path = %engine.path.as_deref().map_or_else(|| ":memory:".into(), |p| p.display().to_string()),
            "sqlite engine opened"
        );
        Ok(engine)
    }

    /// Location of the database file, `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine")
            .field("path", &self.path)
            .field("in_transaction", &self.in_transaction())
            .finish()
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Borrowed(match self {
            SqlValue::Null => ValueRef::Null,
            SqlValue::Integer(v) => ValueRef::Integer(*v),
            SqlValue::Real(v) => ValueRef::Real(*v),
            SqlValue::Text(v) => ValueRef::Text(v.as_bytes()),
            SqlValue::Blob(v) => ValueRef::Blob(v),
        }))
    }
}

impl From<rusqlite::types::Value> for SqlValue {
    fn from(value: rusqlite::types::Value) -> Self {
        match value {
            rusqlite::types::Value::Null => SqlValue::Null,
            rusqlite::types::Value::Integer(v) => SqlValue::Integer(v),
            rusqlite::types::Value::Real(v) => SqlValue::Real(v),
            rusqlite::types::Value::Text(v) => SqlValue::Text(v),
            rusqlite::types::Value::Blob(v) => SqlValue::Blob(v),
        }
    }
}

impl Engine for SqliteEngine {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> EngineResult<usize> {
        Ok(self.conn.execute(sql, params_from_iter(params))?)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> EngineResult<Vec<Vec<SqlValue>>> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns = stmt.column_count();
        let rows = stmt.query_map(params_from_iter(params), |row| {
            (0..columns)
                .map(|i| row.get::<_, rusqlite::types::Value>(i).map(SqlValue::from))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn begin(&self) -> EngineResult<()> {
        if self.in_transaction() {
            return Err(EngineError::TransactionActive);
        }
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> EngineResult<()> {
        if !self.in_transaction() {
            return Err(EngineError::NoTransaction);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> EngineResult<()> {
        if !self.in_transaction() {
            return Err(EngineError::NoTransaction);
        }
        self.conn.execute_batch("ROLLBACK")?;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    fn list_tables(&self) -> EngineResult<Vec<String>> {
        self.query(
            "SELECT name FROM sqlite_master WHERE type = 'table' \
             AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?
        .into_iter()
        .map(|row| match row.into_iter().next() {
            Some(SqlValue::Text(name)) => Ok(name),
            Some(other) => Err(EngineError::Decode {
                expected: "text",
                found: other.kind_name(),
            }),
            None => Err(EngineError::Decode {
                expected: "text",
                found: "nothing",
            }),
        })
        .collect()
    }

    fn table_exists(&self, name: &str) -> EngineResult<bool> {
        let rows = self.query(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            &[SqlValue::from(name)],
        )?;
        Ok(!rows.is_empty())
    }

    fn next_id(&self) -> EngineResult<ObjectId> {
        self.conn
            .execute("UPDATE _id_counter SET value = value + 1", [])?;
        let id: i64 = self
            .conn
            .query_row("SELECT value FROM _id_counter", [], |row| row.get(0))?;
        Ok(ObjectId::new(id))
    }

    fn column_type(&self, tag: TypeTag) -> Option<&'static str> {
        match tag {
            TypeTag::Int | TypeTag::Map | TypeTag::List => Some("INTEGER"),
            TypeTag::Float => Some("REAL"),
            TypeTag::Text => Some("TEXT"),
            TypeTag::Bytes => Some("BLOB"),
            TypeTag::Null => None,
        }
    }

    fn register_regexp(&self) -> EngineResult<()> {
        // `x REGEXP p` calls regexp(p, x). Patterns are compiled once per
        // statement and cached as auxiliary data on the pattern argument.
        self.conn.create_scalar_function(
            "regexp",
            2,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                let pattern: Arc<Regex> = ctx.get_or_create_aux(0, |raw| -> Result<_, BoxError> {
                    let source = std::str::from_utf8(raw.as_bytes()?)?;
                    Ok(Regex::new(source)?)
                })?;
                Ok(match ctx.get_raw(1) {
                    ValueRef::Text(bytes) | ValueRef::Blob(bytes) => pattern.is_match(bytes),
                    _ => false,
                })
            },
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> SqliteEngine {
        SqliteEngine::open_in_memory().unwrap()
    }

    #[test]
    fn ids_are_monotonic() {
        let e = engine();
        let a = e.next_id().unwrap();
        let b = e.next_id().unwrap();
        assert!(b > a);
        assert_eq!(a, ObjectId::new(1));
    }

    #[test]
    fn execute_and_query_roundtrip() {
        let e = engine();
        e.execute("CREATE TABLE t (a INTEGER, b TEXT, c BLOB, d REAL)", &[])
            .unwrap();
        e.execute(
            "INSERT INTO t VALUES (?1, ?2, ?3, ?4)",
            &[
                SqlValue::Integer(5),
                SqlValue::from("x"),
                SqlValue::Blob(vec![1, 2]),
                SqlValue::Real(1.5),
            ],
        )
        .unwrap();
        let rows = e.query("SELECT a, b, c, d FROM t", &[]).unwrap();
        assert_eq!(
            rows,
            vec![vec![
                SqlValue::Integer(5),
                SqlValue::from("x"),
                SqlValue::Blob(vec![1, 2]),
                SqlValue::Real(1.5),
            ]]
        );
    }

    #[test]
    fn table_management() {
        let e = engine();
        let name = "field:text:.a";
        let quoted = e.quote_identifier(name);
        assert!(!e.table_exists(name).unwrap());
        e.execute(&format!("CREATE TABLE {quoted} (id INTEGER)"), &[])
            .unwrap();
        assert!(e.table_exists(name).unwrap());
        assert!(e.list_tables().unwrap().contains(&name.to_string()));
        e.drop_table(name).unwrap();
        assert!(!e.table_exists(name).unwrap());
    }

    #[test]
    fn quoting_doubles_delimiters() {
        let e = engine();
        assert_eq!(e.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(e.quote_literal("it's"), "'it''s'");
    }

    #[test]
    fn rollback_discards_changes() {
        let e = engine();
        e.execute("CREATE TABLE t (a INTEGER)", &[]).unwrap();
        e.begin().unwrap();
        assert!(e.in_transaction());
        assert!(matches!(e.begin(), Err(EngineError::TransactionActive)));
        e.execute("INSERT INTO t VALUES (1)", &[]).unwrap();
        e.rollback().unwrap();
        assert!(!e.in_transaction());
        assert!(e.query("SELECT a FROM t", &[]).unwrap().is_empty());
        assert!(matches!(e.commit(), Err(EngineError::NoTransaction)));
    }

    #[test]
    fn regexp_matches_text_and_blobs() {
        let e = engine();
        let op = e.regexp_operator();
        let hit = |value: SqlValue, pattern: &str| {
            let rows = e
                .query(
                    &format!("SELECT ?1 {op} ?2"),
                    &[value, SqlValue::from(pattern)],
                )
                .unwrap();
            rows[0][0] == SqlValue::Integer(1)
        };
        assert!(hit(SqlValue::from("Alex"), "^Al"));
        assert!(!hit(SqlValue::from("Bob"), "^Al"));
        assert!(hit(SqlValue::Blob(b"raw\x00bytes".to_vec()), "bytes$"));
        assert!(!hit(SqlValue::Null, "."));
    }

    #[test]
    fn empty_set_query_has_no_rows() {
        let e = engine();
        let sql = format!("SELECT id FROM ({}) UNION SELECT 5", e.empty_set_query());
        assert_eq!(
            e.query(&sql, &[]).unwrap(),
            vec![vec![SqlValue::Integer(5)]]
        );
    }

    #[test]
    fn open_modes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.sqlite");

        assert!(matches!(
            SqliteEngine::open(&path, OpenMode::MustExist),
            Err(EngineError::MissingDatabase(_))
        ));

        {
            let e = SqliteEngine::open(&path, OpenMode::OpenOrCreate).unwrap();
            e.next_id().unwrap();
            e.next_id().unwrap();
        }
        {
            let e = SqliteEngine::open(&path, OpenMode::MustExist).unwrap();
            assert_eq!(e.next_id().unwrap(), ObjectId::new(3));
            assert_eq!(e.path(), Some(path.as_path()));
        }
        {
            let e = SqliteEngine::open(&path, OpenMode::CreateFresh).unwrap();
            assert_eq!(e.next_id().unwrap(), ObjectId::new(1));
        }
    }
}
