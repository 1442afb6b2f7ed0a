//! Field tables: creation, row writes and reads, deletion and list
//! renumbering.

use tracing::debug;

use arbor_engine::{Engine, SqlValue};
use arbor_types::{column_name, Field, ObjectId, Path, TypeTag};

use crate::catalog::non_negative;
use crate::error::{StructureError, StructureResult};
use crate::Structure;

/// A field table found in the database.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldTable {
    pub name: String,
    /// Signature path: every list position is `ANY`.
    pub path: Path,
    pub tag: TypeTag,
}

impl<'e, E: Engine + ?Sized> Structure<'e, E> {
    fn quoted(&self, path: &Path, tag: TypeTag) -> String {
        self.engine.quote_identifier(&path.table_name(tag))
    }

    /// `id = ?1` plus the equalities pinning the concrete list positions
    /// of `path`.
    fn row_filter(path: &Path) -> String {
        let columns = path.column_condition();
        if columns.is_empty() {
            "id = ?1".to_string()
        } else {
            format!("id = ?1 AND {columns}")
        }
    }

    /// Create the table backing `path` / `tag` if it does not exist.
    pub fn assure_field_table(&self, path: &Path, tag: TypeTag) -> StructureResult<()> {
        let name = path.table_name(tag);
        if self.engine.table_exists(&name)? {
            return Ok(());
        }
        let mut columns = vec!["id INTEGER NOT NULL".to_string()];
        columns.extend(
            path.list_columns()
                .into_iter()
                .map(|c| format!("{c} INTEGER NOT NULL")),
        );
        if let Some(ty) = self.engine.column_type(tag) {
            columns.push(format!("value {ty}"));
        }
        self.engine.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                self.engine.quote_identifier(&name),
                columns.join(", ")
            ),
            &[],
        )?;
        debug!(table = %name, "field table created");
        Ok(())
    }

    /// Insert one row for `field`. Null fields write no value column.
    pub fn add_value_record(&self, id: ObjectId, field: &Field) -> StructureResult<()> {
        let tag = field.type_tag();
        let mut columns = vec!["id".to_string()];
        let mut params = vec![SqlValue::from(id.get())];
        for (k, index) in field.column_values()?.into_iter().enumerate() {
            columns.push(column_name(k));
            params.push(SqlValue::Integer(index));
        }
        if tag.has_value_column() {
            columns.push("value".to_string());
            params.push(SqlValue::from(&field.value));
        }
        let placeholders: Vec<String> = (1..=params.len()).map(|i| format!("?{i}")).collect();
        self.engine.execute(
            &format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quoted(&field.path, tag),
                columns.join(", "),
                placeholders.join(", ")
            ),
            &params,
        )?;
        Ok(())
    }

    /// Rows of object `id` at `path` (possibly masked) in the `tag` table,
    /// as concrete fields in index order. `None` if the table is absent.
    pub fn field_values(
        &self,
        id: ObjectId,
        path: &Path,
        tag: TypeTag,
    ) -> StructureResult<Option<Vec<Field>>> {
        let name = path.table_name(tag);
        if !self.engine.table_exists(&name)? {
            return Ok(None);
        }
        let list_columns = path.list_columns();
        let mut select = list_columns.clone();
        if tag.has_value_column() {
            select.push("value".to_string());
        }
        if select.is_empty() {
            select.push("id".to_string());
        }
        let order = if list_columns.is_empty() {
            String::new()
        } else {
            format!(" ORDER BY {}", list_columns.join(", "))
        };
        let rows = self.engine.query(
            &format!(
                "SELECT {} FROM {} WHERE {}{order}",
                select.join(", "),
                self.engine.quote_identifier(&name),
                Self::row_filter(path)
            ),
            &[SqlValue::from(id.get())],
        )?;

        let positions: Vec<usize> = path
            .elements()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_list_position())
            .map(|(pos, _)| pos)
            .collect();
        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            let mut concrete = path.clone();
            for (column, pos) in positions.iter().enumerate() {
                concrete = concrete.with_index(*pos, non_negative(&row[column])?);
            }
            let value = match row.get(positions.len()) {
                Some(raw) if tag.has_value_column() => raw.to_scalar(tag)?,
                _ => SqlValue::Null.to_scalar(tag)?,
            };
            fields.push(Field::new(concrete, value));
        }
        Ok(Some(fields))
    }

    /// Number of rows of object `id` at `path` in the `tag` table.
    pub fn count_values(&self, id: ObjectId, path: &Path, tag: TypeTag) -> StructureResult<u64> {
        let name = path.table_name(tag);
        if !self.engine.table_exists(&name)? {
            return Ok(0);
        }
        let rows = self.engine.query(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE {}",
                self.engine.quote_identifier(&name),
                Self::row_filter(path)
            ),
            &[SqlValue::from(id.get())],
        )?;
        match rows.first() {
            Some(row) => Ok(non_negative(&row[0])? as u64),
            None => Ok(0),
        }
    }

    /// Delete the rows of object `id` at `path` in every catalogued type.
    ///
    /// Refcounts are decremented by the number of rows removed and tables
    /// left empty are dropped. Returns the number of rows removed.
    pub fn delete_values(&self, id: ObjectId, path: &Path) -> StructureResult<u64> {
        let mut removed = 0;
        for tag in self.value_types(id, path)? {
            let n = self.count_values(id, path, tag)?;
            if n == 0 {
                continue;
            }
            self.decrease_refcount(id, path, tag, n)?;
            let name = path.table_name(tag);
            self.engine.execute(
                &format!(
                    "DELETE FROM {} WHERE {}",
                    self.engine.quote_identifier(&name),
                    Self::row_filter(path)
                ),
                &[SqlValue::from(id.get())],
            )?;
            self.drop_if_empty(&name)?;
            removed += n;
        }
        Ok(removed)
    }

    /// Drop a field table that holds no rows. Returns `true` if dropped.
    pub fn drop_if_empty(&self, name: &str) -> StructureResult<bool> {
        let rows = self.engine.query(
            &format!("SELECT 1 FROM {} LIMIT 1", self.engine.quote_identifier(name)),
            &[],
        )?;
        if rows.is_empty() {
            self.engine.drop_table(name)?;
            debug!(table = name, "empty field table dropped");
            return Ok(true);
        }
        Ok(false)
    }

    /// Shift the elements of `list` at index `from` and above by `shift`.
    ///
    /// Rewrites the element column of every field table below the list,
    /// the cache keys of nested lists, and the list's own maximum index.
    pub fn renumber_list(
        &self,
        id: ObjectId,
        list: &Path,
        from: usize,
        shift: i64,
    ) -> StructureResult<()> {
        list.require_concrete()?;
        let element = list.any();
        let column = column_name(list.list_position_count());
        let pinned = list.column_condition();
        let pinned = if pinned.is_empty() {
            String::new()
        } else {
            format!(" AND {pinned}")
        };

        for (path, tag) in self.field_list(id, Some(&element), false)? {
            let name = path.table_name(tag);
            if !self.engine.table_exists(&name)? {
                continue;
            }
            self.engine.execute(
                &format!(
                    "UPDATE {} SET {column} = {column} + ?2 WHERE id = ?1{pinned} AND {column} >= ?3",
                    self.engine.quote_identifier(&name)
                ),
                &[
                    SqlValue::from(id.get()),
                    SqlValue::Integer(shift),
                    SqlValue::Integer(from as i64),
                ],
            )?;
        }

        self.shift_nested_list_sizes(id, list, from, shift)?;

        if let Some(max_index) = self.list_size(id, list)? {
            self.remove_list_size(id, list)?;
            // Shrinking below index 0 leaves the list without a cache entry.
            if let Some(shifted) = max_index.checked_add_signed(shift as isize) {
                self.update_list_size(id, list, shifted)?;
            }
        }
        debug!(%id, %list, from, shift, "list renumbered");
        Ok(())
    }

    /// Every field table in the database.
    pub fn field_tables(&self) -> StructureResult<Vec<FieldTable>> {
        Ok(self
            .engine
            .list_tables()?
            .into_iter()
            .filter_map(|name| {
                Path::parse_table_name(&name).map(|(path, tag)| FieldTable { name, path, tag })
            })
            .collect())
    }

    /// Per-object row counts of a field table.
    pub fn table_row_counts(&self, table: &FieldTable) -> StructureResult<Vec<(ObjectId, u64)>> {
        self.engine
            .query(
                &format!(
                    "SELECT id, COUNT(*) FROM {} GROUP BY id ORDER BY id",
                    self.engine.quote_identifier(&table.name)
                ),
                &[],
            )?
            .iter()
            .map(|row| -> StructureResult<(ObjectId, u64)> {
                Ok((ObjectId::new(row[0].as_i64()?), non_negative(&row[1])? as u64))
            })
            .collect()
    }

    /// Distinct `(object, concrete list, index)` triples for the list at
    /// the `level`-th list position of a field table.
    ///
    /// `level` 0 is the outermost list of the table's path.
    pub fn table_list_indices(
        &self,
        table: &FieldTable,
        level: usize,
    ) -> StructureResult<Vec<(ObjectId, Path, usize)>> {
        let list_pos = table
            .path
            .elements()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_list_position())
            .nth(level)
            .map(|(pos, _)| pos)
            .ok_or_else(|| {
                StructureError::Corrupt(format!("{} has no list level {level}", table.name))
            })?;
        let outer: Vec<String> = (0..level).map(column_name).collect();
        let mut select = vec!["id".to_string()];
        select.extend(outer.iter().cloned());
        select.push(column_name(level));

        let rows = self.engine.query(
            &format!(
                "SELECT DISTINCT {} FROM {}",
                select.join(", "),
                self.engine.quote_identifier(&table.name)
            ),
            &[],
        )?;

        let list_sig = table.path.prefix(list_pos);
        let outer_positions: Vec<usize> = list_sig
            .elements()
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_list_position())
            .map(|(pos, _)| pos)
            .collect();
        let mut result = Vec::with_capacity(rows.len());
        for row in rows {
            let id = ObjectId::new(row[0].as_i64()?);
            let mut list = list_sig.clone();
            for (k, pos) in outer_positions.iter().enumerate() {
                list = list.with_index(*pos, non_negative(&row[1 + k])?);
            }
            let index = non_negative(&row[1 + level])?;
            result.push((id, list, index));
        }
        Ok(result)
    }
}
