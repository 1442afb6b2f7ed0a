use serde::{Deserialize, Serialize};

use arbor_types::{ObjectId, TypeTag};

use crate::error::EngineResult;
use crate::value::SqlValue;

/// How a file-backed database is opened.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    /// Fail unless the file already exists.
    MustExist,
    /// Delete any existing file and start empty.
    CreateFresh,
    /// Open the file, creating it when missing.
    #[default]
    OpenOrCreate,
}

/// A relational backend.
///
/// Implementations must satisfy:
/// - statements run inside the bracket opened by [`Engine::begin`] until
///   [`Engine::commit`] or [`Engine::rollback`];
/// - [`Engine::next_id`] never returns the same ID twice for one database;
/// - errors are propagated, never swallowed.
pub trait Engine: Send {
    /// Short tag naming the backend, e.g. `"sqlite"`.
    fn name(&self) -> &'static str;

    /// Execute a statement and return the number of affected rows.
    fn execute(&self, sql: &str, params: &[SqlValue]) -> EngineResult<usize>;

    /// Run a query and collect every row.
    fn query(&self, sql: &str, params: &[SqlValue]) -> EngineResult<Vec<Vec<SqlValue>>>;

    fn begin(&self) -> EngineResult<()>;
    fn commit(&self) -> EngineResult<()>;
    fn rollback(&self) -> EngineResult<()>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// Names of every user table.
    fn list_tables(&self) -> EngineResult<Vec<String>>;

    fn table_exists(&self, name: &str) -> EngineResult<bool>;

    /// Drop a table if it exists.
    fn drop_table(&self, name: &str) -> EngineResult<()> {
        self.execute(
            &format!("DROP TABLE IF EXISTS {}", self.quote_identifier(name)),
            &[],
        )?;
        Ok(())
    }

    /// Allocate the next object ID.
    fn next_id(&self) -> EngineResult<ObjectId>;

    /// Column type for the `value` column of a field table, or `None` when
    /// values of this type store no column at all.
    fn column_type(&self, tag: TypeTag) -> Option<&'static str>;

    /// Quote a table or column name.
    fn quote_identifier(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Quote a string literal.
    fn quote_literal(&self, text: &str) -> String {
        format!("'{}'", text.replace('\'', "''"))
    }

    /// Install the regex match function behind [`Engine::regexp_operator`].
    fn register_regexp(&self) -> EngineResult<()>;

    /// Infix operator for `value <op> pattern` regex matching.
    fn regexp_operator(&self) -> &'static str {
        "REGEXP"
    }

    /// A query returning no rows, with a single `id` column. Usable as an
    /// operand of `UNION`, `INTERSECT` and `EXCEPT`.
    fn empty_set_query(&self) -> &'static str {
        "SELECT 0 AS id WHERE 0"
    }
}

/// Boxed engines are engines too, so the layers above can stay generic.
impl<E: Engine + ?Sized> Engine for Box<E> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn execute(&self, sql: &str, params: &[SqlValue]) -> EngineResult<usize> {
        (**self).execute(sql, params)
    }

    fn query(&self, sql: &str, params: &[SqlValue]) -> EngineResult<Vec<Vec<SqlValue>>> {
        (**self).query(sql, params)
    }

    fn begin(&self) -> EngineResult<()> {
        (**self).begin()
    }

    fn commit(&self) -> EngineResult<()> {
        (**self).commit()
    }

    fn rollback(&self) -> EngineResult<()> {
        (**self).rollback()
    }

    fn in_transaction(&self) -> bool {
        (**self).in_transaction()
    }

    fn list_tables(&self) -> EngineResult<Vec<String>> {
        (**self).list_tables()
    }

    fn table_exists(&self, name: &str) -> EngineResult<bool> {
        (**self).table_exists(name)
    }

    fn drop_table(&self, name: &str) -> EngineResult<()> {
        (**self).drop_table(name)
    }

    fn next_id(&self) -> EngineResult<ObjectId> {
        (**self).next_id()
    }

    fn column_type(&self, tag: TypeTag) -> Option<&'static str> {
        (**self).column_type(tag)
    }

    fn quote_identifier(&self, name: &str) -> String {
        (**self).quote_identifier(name)
    }

    fn quote_literal(&self, text: &str) -> String {
        (**self).quote_literal(text)
    }

    fn register_regexp(&self) -> EngineResult<()> {
        (**self).register_regexp()
    }

    fn regexp_operator(&self) -> &'static str {
        (**self).regexp_operator()
    }

    fn empty_set_query(&self) -> &'static str {
        (**self).empty_set_query()
    }
}
