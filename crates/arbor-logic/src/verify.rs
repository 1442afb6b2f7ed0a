//! Read-only consistency check of the stored data against the storage
//! invariants.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use arbor_engine::Engine;
use arbor_types::{ObjectId, Path, PathElem, TypeTag};

use crate::error::LogicResult;
use crate::Logic;

/// Result of a verification pass.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub objects: usize,
    pub field_tables: usize,
    pub catalog_rows: usize,
    pub violations: Vec<Violation>,
}

impl VerifyReport {
    /// Returns `true` if no invariant is broken.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// One broken invariant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// The object concerned, or `None` for database-wide problems.
    pub id: Option<ObjectId>,
    pub kind: ViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ViolationKind {
    /// Catalog refcount differs from the rows in the field table.
    RefcountMismatch,
    /// Rows with no catalog entry.
    OrphanRows,
    /// Catalog entry with no rows behind it.
    StaleCatalog,
    /// A field table holding no rows.
    EmptyTable,
    /// List indices not contiguous from zero.
    ListGap,
    /// Cached maximum index differs from the stored elements.
    ListSizeMismatch,
    /// A node with both list elements and mapping keys below it.
    MixedSiblings,
    /// A leaf stored at a path that also has children.
    ShadowedLeaf,
}

type FieldKey = (ObjectId, Path, TypeTag);

impl<'e, E: Engine + ?Sized> Logic<'e, E> {
    /// Check every invariant without changing anything.
    ///
    /// Field tables are read directly, so the check does not trust the
    /// catalog or the list-size cache it is validating.
    pub fn verify(&self) -> LogicResult<VerifyReport> {
        let structure = &self.structure;
        let mut violations = Vec::new();

        let tables = structure.field_tables()?;
        let mut rows: BTreeMap<FieldKey, u64> = BTreeMap::new();
        let mut paths: BTreeMap<ObjectId, BTreeSet<Path>> = BTreeMap::new();
        let mut elements: BTreeMap<(ObjectId, Path), BTreeSet<usize>> = BTreeMap::new();

        for table in &tables {
            let counts = structure.table_row_counts(table)?;
            if counts.is_empty() {
                violations.push(Violation {
                    id: None,
                    kind: ViolationKind::EmptyTable,
                    description: format!("table {} holds no rows", table.name),
                });
                continue;
            }
            for (id, count) in counts {
                rows.insert((id, table.path.clone(), table.tag), count);
                let fields = structure
                    .field_values(id, &table.path, table.tag)?
                    .unwrap_or_default();
                paths
                    .entry(id)
                    .or_default()
                    .extend(fields.into_iter().map(|f| f.path));
            }
            for level in 0..table.path.list_position_count() {
                for (id, list, index) in structure.table_list_indices(table, level)? {
                    elements.entry((id, list)).or_default().insert(index);
                }
            }
        }

        let catalog = structure.catalog_entries()?;
        let catalog_rows = catalog.len();
        let mut catalogued: BTreeMap<FieldKey, u64> = catalog
            .into_iter()
            .map(|entry| ((entry.id, entry.path, entry.tag), entry.refcount))
            .collect();
        let mut objects: BTreeSet<ObjectId> = catalogued.keys().map(|(id, _, _)| *id).collect();
        objects.extend(paths.keys().copied());

        check_refcounts(&rows, &mut catalogued, &mut violations);
        self.check_lists(&elements, &mut violations)?;
        for (id, object_paths) in &paths {
            check_shape(*id, object_paths, &mut violations);
        }

        let report = VerifyReport {
            objects: objects.len(),
            field_tables: tables.len(),
            catalog_rows,
            violations,
        };
        if report.is_valid() {
            info!(objects = report.objects, tables = report.field_tables, "verify passed");
        } else {
            warn!(violations = report.violations.len(), "verify found violations");
        }
        Ok(report)
    }

    fn check_lists(
        &self,
        elements: &BTreeMap<(ObjectId, Path), BTreeSet<usize>>,
        violations: &mut Vec<Violation>,
    ) -> LogicResult<()> {
        let mut cached: BTreeMap<(ObjectId, Path), usize> = self
            .structure
            .list_sizes(None)?
            .into_iter()
            .map(|size| ((size.id, size.list), size.max_index))
            .collect();

        for ((id, list), indices) in elements {
            let max = indices.iter().next_back().copied().unwrap_or(0);
            if indices.len() != max + 1 {
                violations.push(Violation {
                    id: Some(*id),
                    kind: ViolationKind::ListGap,
                    description: format!(
                        "list {list} has {} elements but maximum index {max}",
                        indices.len()
                    ),
                });
            }
            match cached.remove(&(*id, list.clone())) {
                Some(stored) if stored == max => {}
                Some(stored) => violations.push(Violation {
                    id: Some(*id),
                    kind: ViolationKind::ListSizeMismatch,
                    description: format!("list {list}: cached maximum {stored}, stored {max}"),
                }),
                None => violations.push(Violation {
                    id: Some(*id),
                    kind: ViolationKind::ListSizeMismatch,
                    description: format!("list {list}: no cached size"),
                }),
            }
        }
        for ((id, list), stored) in cached {
            violations.push(Violation {
                id: Some(id),
                kind: ViolationKind::ListSizeMismatch,
                description: format!("list {list}: cached maximum {stored} but no elements"),
            });
        }
        Ok(())
    }
}

fn check_refcounts(
    rows: &BTreeMap<FieldKey, u64>,
    catalogued: &mut BTreeMap<FieldKey, u64>,
    violations: &mut Vec<Violation>,
) {
    for ((id, path, tag), count) in rows {
        let key = (*id, path.clone(), *tag);
        match catalogued.remove(&key) {
            Some(refcount) if refcount == *count => {}
            Some(refcount) => violations.push(Violation {
                id: Some(*id),
                kind: ViolationKind::RefcountMismatch,
                description: format!("{path} ({tag}): refcount {refcount}, rows {count}"),
            }),
            None => violations.push(Violation {
                id: Some(*id),
                kind: ViolationKind::OrphanRows,
                description: format!("{path} ({tag}): {count} rows without catalog entry"),
            }),
        }
    }
    for ((id, path, tag), refcount) in std::mem::take(catalogued) {
        violations.push(Violation {
            id: Some(id),
            kind: ViolationKind::StaleCatalog,
            description: format!("{path} ({tag}): refcount {refcount} but no rows"),
        });
    }
}

/// Mixed siblings and leaves with children, over one object's concrete
/// field paths.
fn check_shape(id: ObjectId, paths: &BTreeSet<Path>, violations: &mut Vec<Violation>) {
    let mut kinds: BTreeMap<Path, (bool, bool)> = BTreeMap::new();
    for path in paths {
        for (node, next) in path.ancestors() {
            let entry = kinds.entry(node).or_default();
            match next {
                PathElem::Key(_) => entry.0 = true,
                _ => entry.1 = true,
            }
        }
    }
    for (node, (keys, indices)) in kinds {
        if keys && indices {
            violations.push(Violation {
                id: Some(id),
                kind: ViolationKind::MixedSiblings,
                description: format!("{node} has both mapping keys and list elements"),
            });
        }
    }

    // In sorted order a path is directly followed by its descendants.
    let sorted: Vec<&Path> = paths.iter().collect();
    for pair in sorted.windows(2) {
        if pair[1].len() > pair[0].len() && pair[1].starts_with(pair[0]) {
            violations.push(Violation {
                id: Some(id),
                kind: ViolationKind::ShadowedLeaf,
                description: format!("leaf at {} has children", pair[0]),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_engine::SqliteEngine;
    use arbor_structure::Structure;
    use arbor_types::{flatten, path, Field, Value};
    use serde_json::json;

    fn populated() -> (SqliteEngine, ObjectId) {
        let engine = SqliteEngine::open_in_memory().unwrap();
        Structure::new(&engine).initialize().unwrap();
        let id = {
            let logic = Logic::new(&engine);
            let doc = Value::from(json!({"a": [{"b": [1, 2]}, "s"], "m": {}, "n": null}));
            logic.create(&flatten(&doc, &Path::root()).unwrap()).unwrap()
        };
        (engine, id)
    }

    fn kinds(report: &VerifyReport) -> BTreeSet<ViolationKind> {
        report.violations.iter().map(|v| v.kind).collect()
    }

    #[test]
    fn healthy_database_passes() {
        let (engine, _) = populated();
        let report = Logic::new(&engine).verify().unwrap();
        assert!(report.is_valid(), "{:?}", report.violations);
        assert_eq!(report.objects, 1);
    }

    #[test]
    fn detects_bookkeeping_damage_and_repair_fixes_it() {
        let (engine, _) = populated();
        engine.execute("UPDATE _spec SET refcount = refcount + 1", &[]).unwrap();
        engine.execute("UPDATE _listsizes SET max_index = 7", &[]).unwrap();
        let logic = Logic::new(&engine);
        let found = kinds(&logic.verify().unwrap());
        assert!(found.contains(&ViolationKind::RefcountMismatch));
        assert!(found.contains(&ViolationKind::ListSizeMismatch));

        logic.repair().unwrap();
        assert!(logic.verify().unwrap().is_valid());
    }

    #[test]
    fn detects_shape_damage() {
        let (engine, id) = populated();
        let s = Structure::new(&engine);
        for field in [
            Field::new(path!["a", "k"].unwrap(), 1),
            Field::new(path!["a", 0, "b", 5].unwrap(), 9),
            Field::new(path!["n", "x"].unwrap(), 2),
        ] {
            let tag = field.type_tag();
            s.assure_field_table(&field.path, tag).unwrap();
            let new_type = !s.value_types(id, &field.path).unwrap().contains(&tag);
            s.increase_refcount(id, &field.path, tag, new_type).unwrap();
            s.add_value_record(id, &field).unwrap();
        }
        let found = kinds(&Logic::new(&engine).verify().unwrap());
        assert!(found.contains(&ViolationKind::MixedSiblings));
        assert!(found.contains(&ViolationKind::ShadowedLeaf));
        assert!(found.contains(&ViolationKind::ListGap));
    }

    #[test]
    fn detects_orphans_and_stale_entries() {
        let (engine, _) = populated();
        engine.execute("DELETE FROM _spec WHERE field = '.m'", &[]).unwrap();
        engine
            .execute(
                "INSERT INTO _spec (id, field, type, refcount) VALUES (42, '.gone', 'int', 1)",
                &[],
            )
            .unwrap();
        let report = Logic::new(&engine).verify().unwrap();
        let found = kinds(&report);
        assert!(found.contains(&ViolationKind::OrphanRows));
        assert!(found.contains(&ViolationKind::StaleCatalog));
        assert_eq!(report.objects, 2);
    }
}
