//! The `_spec` catalog: which (path signature, type) pairs an object uses,
//! and how many rows it has in each field table.

use std::collections::BTreeSet;

use tracing::debug;

use arbor_engine::{Engine, SqlValue};
use arbor_types::{ObjectId, Path, TypeTag};

use crate::error::{StructureError, StructureResult};
use crate::{Structure, SPEC_TABLE};

/// One row of the catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CatalogEntry {
    pub id: ObjectId,
    /// Signature path: every list position is `ANY`.
    pub path: Path,
    pub tag: TypeTag,
    pub refcount: u64,
}

impl<'e, E: Engine + ?Sized> Structure<'e, E> {
    /// Count one more row of `tag` values at `path` for object `id`.
    ///
    /// `new_type` inserts a fresh catalog row instead of bumping an
    /// existing one.
    pub fn increase_refcount(
        &self,
        id: ObjectId,
        path: &Path,
        tag: TypeTag,
        new_type: bool,
    ) -> StructureResult<()> {
        let params = [
            SqlValue::from(id.get()),
            SqlValue::from(path.signature()),
            SqlValue::from(tag.as_str()),
        ];
        if new_type {
            self.engine.execute(
                &format!(
                    "INSERT INTO {SPEC_TABLE} (id, field, type, refcount) VALUES (?1, ?2, ?3, 1)"
                ),
                &params,
            )?;
        } else {
            self.engine.execute(
                &format!(
                    "UPDATE {SPEC_TABLE} SET refcount = refcount + 1 \
                     WHERE id = ?1 AND field = ?2 AND type = ?3"
                ),
                &params,
            )?;
        }
        Ok(())
    }

    /// Count `n` fewer rows. Reaching zero removes the catalog row.
    pub fn decrease_refcount(
        &self,
        id: ObjectId,
        path: &Path,
        tag: TypeTag,
        n: u64,
    ) -> StructureResult<()> {
        let have = self.refcount(id, path, tag)?.unwrap_or(0);
        if have < n {
            return Err(StructureError::RefcountUnderflow {
                id,
                path: path.clone(),
                tag,
                have,
                remove: n,
            });
        }
        let params = [
            SqlValue::from(id.get()),
            SqlValue::from(path.signature()),
            SqlValue::from(tag.as_str()),
        ];
        if have == n {
            self.engine.execute(
                &format!("DELETE FROM {SPEC_TABLE} WHERE id = ?1 AND field = ?2 AND type = ?3"),
                &params,
            )?;
        } else {
            self.engine.execute(
                &format!(
                    "UPDATE {SPEC_TABLE} SET refcount = refcount - ?4 \
                     WHERE id = ?1 AND field = ?2 AND type = ?3"
                ),
                &[params[0].clone(), params[1].clone(), params[2].clone(), SqlValue::Integer(n as i64)],
            )?;
        }
        debug!(%id, %path, %tag, removed = n, remaining = have - n, "refcount decreased");
        Ok(())
    }

    /// Current refcount, `None` when the catalog has no such row.
    pub fn refcount(&self, id: ObjectId, path: &Path, tag: TypeTag) -> StructureResult<Option<u64>> {
        let rows = self.engine.query(
            &format!("SELECT refcount FROM {SPEC_TABLE} WHERE id = ?1 AND field = ?2 AND type = ?3"),
            &[
                SqlValue::from(id.get()),
                SqlValue::from(path.signature()),
                SqlValue::from(tag.as_str()),
            ],
        )?;
        match rows.first() {
            Some(row) => Ok(Some(non_negative(&row[0])? as u64)),
            None => Ok(None),
        }
    }

    /// Types the catalog records for `path` (by signature) in object `id`.
    pub fn value_types(&self, id: ObjectId, path: &Path) -> StructureResult<BTreeSet<TypeTag>> {
        let rows = self.engine.query(
            &format!("SELECT type FROM {SPEC_TABLE} WHERE id = ?1 AND field = ?2"),
            &[SqlValue::from(id.get()), SqlValue::from(path.signature())],
        )?;
        rows.iter()
            .map(|row| -> StructureResult<TypeTag> { Ok(row[0].as_str()?.parse()?) })
            .collect()
    }

    /// Catalogued fields of object `id`, optionally restricted to `path`
    /// and its descendants.
    ///
    /// The catalog only knows signatures, so every list position comes
    /// back as `ANY`; the elements of `path` are spliced back over each
    /// result to restore its concrete indices.
    pub fn field_list(
        &self,
        id: ObjectId,
        path: Option<&Path>,
        exclude_self: bool,
    ) -> StructureResult<Vec<(Path, TypeTag)>> {
        let mut sql = format!("SELECT field, type FROM {SPEC_TABLE} WHERE id = ?1");
        let mut params = vec![SqlValue::from(id.get())];
        if let Some(path) = path {
            sql.push_str(&format!(" AND field {} ?2", self.engine.regexp_operator()));
            params.push(SqlValue::from(path.descendants_pattern(!exclude_self)));
        }
        sql.push_str(" ORDER BY field, type");

        self.engine
            .query(&sql, &params)?
            .iter()
            .map(|row| -> StructureResult<(Path, TypeTag)> {
                let signature = Path::from_signature(row[0].as_str()?)?;
                let tag = row[1].as_str()?.parse::<TypeTag>()?;
                let path = match path {
                    Some(prefix) => signature.splice_prefix(prefix),
                    None => signature,
                };
                Ok((path, tag))
            })
            .collect()
    }

    pub fn object_exists(&self, id: ObjectId) -> StructureResult<bool> {
        let rows = self.engine.query(
            &format!("SELECT COUNT(*) FROM {SPEC_TABLE} WHERE id = ?1"),
            &[SqlValue::from(id.get())],
        )?;
        Ok(rows.first().map(|row| row[0].as_i64()).transpose()?.unwrap_or(0) > 0)
    }

    /// Every object with at least one catalogued field, ascending.
    pub fn object_ids(&self) -> StructureResult<Vec<ObjectId>> {
        self.engine
            .query(&format!("SELECT DISTINCT id FROM {SPEC_TABLE} ORDER BY id"), &[])?
            .iter()
            .map(|row| -> StructureResult<ObjectId> { Ok(ObjectId::new(row[0].as_i64()?)) })
            .collect()
    }

    /// The whole catalog, ordered by object, signature and type.
    pub fn catalog_entries(&self) -> StructureResult<Vec<CatalogEntry>> {
        self.engine
            .query(
                &format!("SELECT id, field, type, refcount FROM {SPEC_TABLE} ORDER BY id, field, type"),
                &[],
            )?
            .iter()
            .map(|row| -> StructureResult<CatalogEntry> {
                Ok(CatalogEntry {
                    id: ObjectId::new(row[0].as_i64()?),
                    path: Path::from_signature(row[1].as_str()?)?,
                    tag: row[2].as_str()?.parse()?,
                    refcount: non_negative(&row[3])? as u64,
                })
            })
            .collect()
    }

    /// Remove every catalog row of object `id`.
    pub fn delete_object_catalog(&self, id: ObjectId) -> StructureResult<()> {
        self.engine.execute(
            &format!("DELETE FROM {SPEC_TABLE} WHERE id = ?1"),
            &[SqlValue::from(id.get())],
        )?;
        Ok(())
    }

    /// Empty the catalog. Only repair does this.
    pub fn clear_catalog(&self) -> StructureResult<()> {
        self.engine
            .execute(&format!("DELETE FROM {SPEC_TABLE}"), &[])?;
        Ok(())
    }

    /// Write a catalog row with an explicit refcount. Used by repair.
    pub fn insert_catalog_entry(&self, entry: &CatalogEntry) -> StructureResult<()> {
        self.engine.execute(
            &format!("INSERT INTO {SPEC_TABLE} (id, field, type, refcount) VALUES (?1, ?2, ?3, ?4)"),
            &[
                SqlValue::from(entry.id.get()),
                SqlValue::from(entry.path.signature()),
                SqlValue::from(entry.tag.as_str()),
                SqlValue::Integer(entry.refcount as i64),
            ],
        )?;
        Ok(())
    }
}

pub(crate) fn non_negative(value: &SqlValue) -> StructureResult<usize> {
    let raw = value.as_i64()?;
    usize::try_from(raw).map_err(|_| StructureError::Corrupt(format!("negative counter {raw}")))
}
