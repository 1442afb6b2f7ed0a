//! The `_listsizes` cache: the maximum index of every concrete list
//! instance, keyed by the list's instance key.

use tracing::debug;

use arbor_engine::{Engine, SqlValue};
use arbor_types::{ObjectId, Path, PathElem};

use crate::catalog::non_negative;
use crate::error::StructureResult;
use crate::{Structure, LIST_SIZE_TABLE};

/// One row of the list-size cache.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListSize {
    pub id: ObjectId,
    /// Concrete path of the list.
    pub list: Path,
    pub max_index: usize,
}

impl<'e, E: Engine + ?Sized> Structure<'e, E> {
    /// Maximum index of the list at `list`, `None` if it has no elements.
    pub fn list_size(&self, id: ObjectId, list: &Path) -> StructureResult<Option<usize>> {
        let rows = self.engine.query(
            &format!("SELECT max_index FROM {LIST_SIZE_TABLE} WHERE id = ?1 AND list = ?2"),
            &[SqlValue::from(id.get()), SqlValue::from(list.instance_key()?)],
        )?;
        rows.first().map(|row| non_negative(&row[0])).transpose()
    }

    /// Record that index `index` is live in `list`. Never shrinks.
    pub fn update_list_size(&self, id: ObjectId, list: &Path, index: usize) -> StructureResult<()> {
        self.engine.execute(
            &format!(
                "INSERT INTO {LIST_SIZE_TABLE} (id, list, max_index) VALUES (?1, ?2, ?3) \
                 ON CONFLICT (id, list) DO UPDATE SET max_index = MAX(max_index, excluded.max_index)"
            ),
            &[
                SqlValue::from(id.get()),
                SqlValue::from(list.instance_key()?),
                SqlValue::Integer(index as i64),
            ],
        )?;
        Ok(())
    }

    /// Drop the cache entry of one list.
    pub fn remove_list_size(&self, id: ObjectId, list: &Path) -> StructureResult<()> {
        self.engine.execute(
            &format!("DELETE FROM {LIST_SIZE_TABLE} WHERE id = ?1 AND list = ?2"),
            &[SqlValue::from(id.get()), SqlValue::from(list.instance_key()?)],
        )?;
        Ok(())
    }

    /// Drop every cache entry of `id` whose instance key matches `pattern`.
    pub fn delete_list_sizes(&self, id: ObjectId, pattern: &str) -> StructureResult<usize> {
        let removed = self.engine.execute(
            &format!(
                "DELETE FROM {LIST_SIZE_TABLE} WHERE id = ?1 AND list {} ?2",
                self.engine.regexp_operator()
            ),
            &[SqlValue::from(id.get()), SqlValue::from(pattern)],
        )?;
        if removed > 0 {
            debug!(%id, pattern, removed, "list sizes removed");
        }
        Ok(removed)
    }

    /// Drop every cache entry of `id`.
    pub fn delete_object_list_sizes(&self, id: ObjectId) -> StructureResult<()> {
        self.engine.execute(
            &format!("DELETE FROM {LIST_SIZE_TABLE} WHERE id = ?1"),
            &[SqlValue::from(id.get())],
        )?;
        Ok(())
    }

    /// Concrete lists of `id` addressed by `mask`, with their maximum
    /// index, ordered by instance key.
    pub fn list_instances(&self, id: ObjectId, mask: &Path) -> StructureResult<Vec<(Path, usize)>> {
        let rows = self.engine.query(
            &format!(
                "SELECT list, max_index FROM {LIST_SIZE_TABLE} \
                 WHERE id = ?1 AND list {} ?2 ORDER BY list",
                self.engine.regexp_operator()
            ),
            &[SqlValue::from(id.get()), SqlValue::from(mask.instances_pattern(true))],
        )?;
        let mut lists = Vec::new();
        for row in &rows {
            let list = Path::from_instance_key(row[0].as_str()?)?;
            if list.matches(mask) {
                lists.push((list, non_negative(&row[1])?));
            }
        }
        Ok(lists)
    }

    /// The whole cache, or one object's part of it.
    pub fn list_sizes(&self, id: Option<ObjectId>) -> StructureResult<Vec<ListSize>> {
        let rows = match id {
            Some(id) => self.engine.query(
                &format!(
                    "SELECT id, list, max_index FROM {LIST_SIZE_TABLE} WHERE id = ?1 ORDER BY id, list"
                ),
                &[SqlValue::from(id.get())],
            )?,
            None => self.engine.query(
                &format!("SELECT id, list, max_index FROM {LIST_SIZE_TABLE} ORDER BY id, list"),
                &[],
            )?,
        };
        rows.iter()
            .map(|row| -> StructureResult<ListSize> {
                Ok(ListSize {
                    id: ObjectId::new(row[0].as_i64()?),
                    list: Path::from_instance_key(row[1].as_str()?)?,
                    max_index: non_negative(&row[2])?,
                })
            })
            .collect()
    }

    /// Empty the cache. Only repair does this.
    pub fn clear_list_sizes(&self) -> StructureResult<()> {
        self.engine
            .execute(&format!("DELETE FROM {LIST_SIZE_TABLE}"), &[])?;
        Ok(())
    }

    /// Shift the element index of every nested list instance below `list`
    /// whose position in `list` is at least `from`.
    ///
    /// All affected rows are removed before the shifted keys are written
    /// back, so a positive shift never collides with a key not yet moved.
    pub(crate) fn shift_nested_list_sizes(
        &self,
        id: ObjectId,
        list: &Path,
        from: usize,
        shift: i64,
    ) -> StructureResult<()> {
        let pos = list.len();
        let moved: Vec<(Path, usize)> = self
            .list_instances_below(id, &list.any())?
            .into_iter()
            .filter(|(nested, _)| {
                matches!(nested.elements().get(pos), Some(PathElem::Index(i)) if *i >= from)
            })
            .collect();
        if moved.is_empty() {
            return Ok(());
        }
        for (nested, _) in &moved {
            self.remove_list_size(id, nested)?;
        }
        for (nested, max_index) in &moved {
            let Some(PathElem::Index(i)) = nested.elements().get(pos) else {
                continue;
            };
            let shifted = shift_index(*i, shift)?;
            self.update_list_size(id, &nested.with_index(pos, shifted), *max_index)?;
        }
        debug!(%id, %list, from, shift, moved = moved.len(), "nested list sizes shifted");
        Ok(())
    }

    /// List instances strictly below the paths addressed by `mask`.
    fn list_instances_below(&self, id: ObjectId, mask: &Path) -> StructureResult<Vec<(Path, usize)>> {
        let rows = self.engine.query(
            &format!(
                "SELECT list, max_index FROM {LIST_SIZE_TABLE} WHERE id = ?1 AND list {} ?2",
                self.engine.regexp_operator()
            ),
            &[SqlValue::from(id.get()), SqlValue::from(mask.instances_pattern(true))],
        )?;
        rows.iter()
            .map(|row| -> StructureResult<(Path, usize)> {
                Ok((
                    Path::from_instance_key(row[0].as_str()?)?,
                    non_negative(&row[1])?,
                ))
            })
            .collect()
    }
}

pub(crate) fn shift_index(index: usize, shift: i64) -> StructureResult<usize> {
    let shifted = index as i64 + shift;
    usize::try_from(shifted).map_err(|_| {
        crate::error::StructureError::Corrupt(format!("index {index} shifted by {shift} is negative"))
    })
}
