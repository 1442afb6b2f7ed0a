//! Writes: create, modify, insert and delete, built on
//! [`Logic::set_field_value`].

use std::collections::BTreeSet;

use tracing::debug;

use arbor_engine::Engine;
use arbor_structure::StructureError;
use arbor_types::{Field, FormatError, ObjectId, Path, PathElem, Scalar, TypeTag};

use crate::error::LogicResult;
use crate::Logic;

/// Which kind of container a node is, judged by its children.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeKind {
    Map,
    List,
}

impl NodeKind {
    fn of(elem: &PathElem) -> Self {
        if elem.is_key() {
            NodeKind::Map
        } else {
            NodeKind::List
        }
    }

    fn opposite(self) -> Self {
        match self {
            NodeKind::Map => NodeKind::List,
            NodeKind::List => NodeKind::Map,
        }
    }

    fn describe(self) -> &'static str {
        match self {
            NodeKind::Map => "mapping keys",
            NodeKind::List => "list elements",
        }
    }
}

/// Live fields below a node, split by the kind of the next element.
#[derive(Debug, Default)]
struct Children {
    keys: Vec<(Path, TypeTag)>,
    elements: Vec<(Path, TypeTag)>,
}

impl Children {
    fn of(&self, kind: NodeKind) -> &[(Path, TypeTag)] {
        match kind {
            NodeKind::Map => &self.keys,
            NodeKind::List => &self.elements,
        }
    }

    fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.elements.is_empty()
    }
}

impl<'e, E: Engine + ?Sized> Logic<'e, E> {
    // ---------------------------------------------------------------
    // Single-field writes
    // ---------------------------------------------------------------

    /// Store one leaf, keeping every storage invariant.
    ///
    /// Ancestors are made into containers of the right kind (clashing
    /// siblings are an error unless `remove_conflicts`), missing list
    /// positions are padded with nulls, and whatever was stored at the
    /// path is replaced. A pointer onto a non-empty container of the same
    /// kind changes nothing.
    pub fn set_field_value(
        &self,
        id: ObjectId,
        field: &Field,
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        let path = &field.path;
        path.require_concrete()?;
        self.prepare_ancestors(id, path, remove_conflicts)?;

        match &field.value {
            Scalar::MapPointer | Scalar::ListPointer => {
                let own = if field.value == Scalar::MapPointer {
                    NodeKind::Map
                } else {
                    NodeKind::List
                };
                let children = self.children(id, path)?;
                if !children.of(own).is_empty() {
                    return Ok(());
                }
                let clashing = children.of(own.opposite());
                if !clashing.is_empty() {
                    self.clear_conflict(id, path, clashing, own, remove_conflicts)?;
                }
            }
            _ => {
                self.delete_below(id, path)?;
            }
        }

        let structure = &self.structure;
        structure.delete_values(id, path)?;
        let tag = field.type_tag();
        structure.assure_field_table(path, tag)?;
        let new_type = !structure.value_types(id, path)?.contains(&tag);
        structure.increase_refcount(id, path, tag, new_type)?;
        structure.add_value_record(id, field)?;
        Ok(())
    }

    /// Walk the ancestors of `path` from the root, resolving kind conflicts,
    /// removing leaves that stand where a container is needed, and padding
    /// lists up to the index the path goes through.
    fn prepare_ancestors(
        &self,
        id: ObjectId,
        path: &Path,
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        for (node, next) in path.ancestors() {
            let wanted = NodeKind::of(next);
            let children = self.children(id, &node)?;
            let clashing = children.of(wanted.opposite());
            if !clashing.is_empty() {
                self.clear_conflict(id, &node, clashing, wanted, remove_conflicts)?;
            }

            self.structure.delete_values(id, &node)?;

            if let PathElem::Index(index) = next {
                self.pad_list(id, &node, *index)?;
            }
        }
        Ok(())
    }

    fn clear_conflict(
        &self,
        id: ObjectId,
        node: &Path,
        clashing: &[(Path, TypeTag)],
        wanted: NodeKind,
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        if !remove_conflicts {
            return Err(StructureError::Conflict {
                id,
                path: node.clone(),
                existing: wanted.opposite().describe(),
                wanted: wanted.describe(),
            }
            .into());
        }
        for (path, _) in clashing {
            self.structure.delete_values(id, path)?;
        }
        let key = regex::escape(&node.instance_key()?);
        let pattern = match wanted.opposite() {
            // The list at `node` and everything below its elements.
            NodeKind::List => format!(r"^{key}(\.#|$)"),
            NodeKind::Map => format!(r"^{key}\.[^#]"),
        };
        self.structure.delete_list_sizes(id, &pattern)?;
        debug!(%id, %node, removed = wanted.opposite().describe(), "conflicting subtree removed");
        Ok(())
    }

    /// Make `list` hold every index below `index` and record `index` in the
    /// list-size cache.
    fn pad_list(&self, id: ObjectId, list: &Path, index: usize) -> LogicResult<()> {
        let first_missing = self
            .structure
            .list_size(id, list)?
            .map_or(0, |max| max + 1);
        for gap in first_missing..index {
            self.set_field_value(id, &Field::new(list.index(gap), Scalar::Null), false)?;
        }
        self.structure.update_list_size(id, list, index)?;
        Ok(())
    }

    /// Live fields strictly below `node` in object `id`.
    fn children(&self, id: ObjectId, node: &Path) -> LogicResult<Children> {
        let mut children = Children::default();
        for (path, tag) in self.structure.field_list(id, Some(node), true)? {
            if self.structure.count_values(id, &path, tag)? == 0 {
                continue;
            }
            match path.elements().get(node.len()) {
                Some(PathElem::Key(_)) => children.keys.push((path, tag)),
                Some(_) => children.elements.push((path, tag)),
                None => {}
            }
        }
        Ok(children)
    }

    /// Remove every field and list-size entry strictly below `path`.
    fn delete_below(&self, id: ObjectId, path: &Path) -> LogicResult<u64> {
        let mut removed = 0;
        for (below, _) in self.structure.field_list(id, Some(path), true)? {
            removed += self.structure.delete_values(id, &below)?;
        }
        self.structure
            .delete_list_sizes(id, &path.instances_pattern(true))?;
        Ok(removed)
    }

    /// Remove `path` itself and everything below it.
    fn delete_subtree(&self, id: ObjectId, path: &Path) -> LogicResult<u64> {
        let removed = self.delete_below(id, path)? + self.structure.delete_values(id, path)?;
        Ok(removed)
    }

    // ---------------------------------------------------------------
    // Document writes
    // ---------------------------------------------------------------

    /// Store a new object made of `fields` and return its ID.
    pub fn create(&self, fields: &[Field]) -> LogicResult<ObjectId> {
        for field in fields {
            field.path.require_concrete()?;
        }
        let id = self.structure.engine().next_id()?;
        for field in fields {
            self.set_field_value(id, field, false)?;
        }
        debug!(%id, fields = fields.len(), "object created");
        Ok(id)
    }

    /// Write `fields`, all at or below `path`, into an existing object.
    ///
    /// With `remove_conflicts` the old subtree at `path` is removed first,
    /// so the new value replaces it instead of merging into it.
    pub fn modify(
        &self,
        id: ObjectId,
        path: &Path,
        fields: &[Field],
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        self.require_object(id)?;
        path.require_concrete()?;
        if remove_conflicts {
            self.delete_subtree(id, path)?;
        }
        for field in fields {
            self.set_field_value(id, field, remove_conflicts)?;
        }
        Ok(())
    }

    /// Insert a run of values into the list addressed by `target`.
    ///
    /// `target` ends in the insertion position: `ANY` appends, an index
    /// inserts before the element currently there (clamped to one past
    /// the end). Each group holds the fields of one value, with `ANY` at
    /// the list position as placeholder for its final index.
    pub fn insert(
        &self,
        id: ObjectId,
        target: &Path,
        groups: &[Vec<Field>],
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        self.require_object(id)?;
        let list = match (target.points_to_list_element(), target.parent()) {
            (true, Some(list)) => list,
            _ => return Err(FormatError::NotAListElement(target.to_string()).into()),
        };
        list.require_concrete()?;
        if groups.is_empty() {
            return Ok(());
        }

        let pos = list.len();
        let start = match (self.structure.list_size(id, &list)?, target.last()) {
            (None, _) => 0,
            (Some(max), Some(PathElem::Index(index))) => {
                let cursor = (*index).min(max + 1);
                if cursor <= max {
                    self.structure
                        .renumber_list(id, &list, cursor, groups.len() as i64)?;
                }
                cursor
            }
            (Some(max), _) => max + 1,
        };
        debug!(%id, %list, start, count = groups.len(), "inserting into list");

        for (offset, group) in groups.iter().enumerate() {
            for field in group {
                let placed = Field::new(field.path.with_index(pos, start + offset), field.value.clone());
                self.set_field_value(id, &placed, remove_conflicts)?;
            }
        }
        Ok(())
    }

    /// Delete paths from an object, or the whole object when `paths` is
    /// empty or contains the root.
    ///
    /// Masks expand to every concrete instance present. A trailing `ANY`
    /// empties the list it addresses. Concrete paths are removed in
    /// descending order so indices named in one call all refer to the
    /// state before the call.
    pub fn delete(&self, id: ObjectId, paths: &[Path]) -> LogicResult<()> {
        self.require_object(id)?;
        if paths.is_empty() || paths.iter().any(Path::is_root) {
            return self.delete_object(id);
        }

        let mut lists = BTreeSet::new();
        let mut concrete = BTreeSet::new();
        for path in paths {
            match (path.last(), path.parent()) {
                (Some(PathElem::Any), Some(list)) => lists.extend(self.expand(id, &list)?),
                _ => concrete.extend(self.expand(id, path)?),
            }
        }

        for list in &lists {
            self.empty_list(id, list)?;
        }
        for path in concrete.iter().rev() {
            self.delete_path(id, path)?;
        }
        Ok(())
    }

    fn delete_object(&self, id: ObjectId) -> LogicResult<()> {
        for (path, _) in self.structure.field_list(id, None, false)? {
            self.structure.delete_values(id, &path)?;
        }
        self.structure.delete_object_list_sizes(id)?;
        self.structure.delete_object_catalog(id)?;
        debug!(%id, "object deleted");
        Ok(())
    }

    /// Concrete instances of `mask` that exist in object `id`.
    ///
    /// Concrete paths are returned as-is; whether anything is stored there
    /// is checked when they are deleted.
    fn expand(&self, id: ObjectId, mask: &Path) -> LogicResult<Vec<Path>> {
        let Some(pos) = mask.elements().iter().rposition(|e| *e == PathElem::Any) else {
            return Ok(vec![mask.clone()]);
        };
        let tail = Path::new(mask.elements()[pos + 1..].to_vec())?;
        let lists = self.structure.list_instances(id, &mask.prefix(pos))?;
        Ok(lists
            .into_iter()
            .flat_map(|(list, max)| (0..=max).map(move |i| list.index(i)))
            .map(|element| element.concat(&tail))
            .collect())
    }

    fn delete_path(&self, id: ObjectId, path: &Path) -> LogicResult<()> {
        if self.delete_subtree(id, path)? == 0 {
            return Ok(());
        }
        let Some(parent) = path.parent() else {
            return Ok(());
        };
        match path.last() {
            Some(PathElem::Index(index)) => {
                self.structure.renumber_list(id, &parent, index + 1, -1)?;
                if self.structure.list_size(id, &parent)?.is_none() {
                    self.set_field_value(id, &Field::new(parent, Scalar::ListPointer), false)?;
                }
            }
            Some(PathElem::Key(_)) => {
                if self.children(id, &parent)?.is_empty() {
                    self.set_field_value(id, &Field::new(parent, Scalar::MapPointer), false)?;
                }
            }
            _ => {}
        }
        debug!(%id, %path, "path deleted");
        Ok(())
    }

    /// Remove every element of a list, leaving an empty-list pointer.
    fn empty_list(&self, id: ObjectId, list: &Path) -> LogicResult<()> {
        if self.structure.list_size(id, list)?.is_none() {
            return Ok(());
        }
        self.delete_below(id, list)?;
        self.set_field_value(id, &Field::new(list.clone(), Scalar::ListPointer), false)?;
        debug!(%id, %list, "list emptied");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{LogicError, LogicResult};
    use arbor_engine::SqliteEngine;
    use arbor_structure::Structure;
    use arbor_types::{flatten, path, Value, ANY};
    use serde_json::json;

    fn engine() -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        Structure::new(&engine).initialize().unwrap();
        engine
    }

    fn fields(json: serde_json::Value) -> Vec<Field> {
        flatten(&Value::from(json), &Path::root()).unwrap()
    }

    fn at(base: Path, json: serde_json::Value) -> Vec<Field> {
        flatten(&Value::from(json), &base).unwrap()
    }

    fn whole(logic: &Logic<'_, SqliteEngine>, id: ObjectId) -> Value {
        logic.read(id, None, &[]).unwrap()
    }

    fn put(
        logic: &Logic<'_, SqliteEngine>,
        id: ObjectId,
        path: Path,
        json: serde_json::Value,
        remove_conflicts: bool,
    ) -> LogicResult<()> {
        let fields = at(path.clone(), json);
        logic.modify(id, &path, &fields, remove_conflicts)
    }

    #[test]
    fn modify_replaces_leaf_and_pads() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"key": [[null], [77, null]]}))).unwrap();
        put(&logic, id, path!["key", 1, 1].unwrap(), json!("aaa"), false).unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"key": [[null], [77, "aaa"]]}))
        );

        put(&logic, id, path!["key", 0, 3].unwrap(), json!(5), false).unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"key": [[null, null, null, 5], [77, "aaa"]]}))
        );
    }

    #[test]
    fn modify_merges_unless_replacing() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"m": {"j": 5, "k": [0, 0, 0]}}))).unwrap();
        put(&logic, id, path!["m"].unwrap(), json!({"k": [1]}), false).unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"m": {"j": 5, "k": [1, 0, 0]}}))
        );

        put(&logic, id, path!["m"].unwrap(), json!({"k": [1]}), true).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"m": {"k": [1]}})));
        assert_eq!(
            logic.structure().list_size(id, &path!["m", "k"].unwrap()).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn conflicts_error_without_removal() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": [1, 2]}))).unwrap();
        let err = put(&logic, id, path!["a", "k"].unwrap(), json!(1), false).unwrap_err();
        assert!(matches!(
            err,
            LogicError::Structure(StructureError::Conflict { .. })
        ));
        assert_eq!(whole(&logic, id), Value::from(json!({"a": [1, 2]})));
    }

    #[test]
    fn conflicts_removed_on_request() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": 1}))).unwrap();
        put(&logic, id, path![0, 2, "k1", "k2"].unwrap(), json!(3), true).unwrap();
        assert_eq!(logic.read(id, Some(&path![0, 0].unwrap()), &[]).unwrap(), Value::Null);
        assert_eq!(
            whole(&logic, id),
            Value::from(json!([[null, null, {"k1": {"k2": 3}}]]))
        );
        assert_eq!(logic.structure().list_size(id, &Path::root()).unwrap(), Some(0));
    }

    #[test]
    fn scalar_replaces_structure_and_container_replaces_scalar() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": {"b": [1, 2]}}))).unwrap();
        put(&logic, id, path!["a"].unwrap(), json!(7), false).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"a": 7})));
        assert!(logic.structure().list_sizes(Some(id)).unwrap().is_empty());

        put(&logic, id, path!["a", "c"].unwrap(), json!("x"), false).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"a": {"c": "x"}})));
    }

    #[test]
    fn pointer_onto_populated_container_is_noop() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": [1]}))).unwrap();
        put(&logic, id, path!["a"].unwrap(), json!([]), false).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"a": [1]})));
        put(&logic, id, path!["b"].unwrap(), json!({}), false).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"a": [1], "b": {}})));
    }

    #[test]
    fn insert_in_middle_and_append() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"tracks": ["t1", "t2", "t3"]}))).unwrap();
        let list_any = path!["tracks", ANY].unwrap();
        let groups = vec![at(list_any.clone(), json!("t4")), at(list_any.clone(), json!("t5"))];
        logic
            .insert(id, &path!["tracks", 1].unwrap(), &groups, false)
            .unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"tracks": ["t1", "t4", "t5", "t2", "t3"]}))
        );

        logic
            .insert(id, &list_any, &[at(list_any.clone(), json!({"n": 1}))], false)
            .unwrap();
        logic
            .insert(id, &path!["tracks", 99].unwrap(), &[at(list_any.clone(), json!("end"))], false)
            .unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"tracks": ["t1", "t4", "t5", "t2", "t3", {"n": 1}, "end"]}))
        );
    }

    #[test]
    fn insert_shifts_nested_lists() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic
            .create(&fields(json!({"t": [{"a": [1, 2]}, {"a": [3]}]})))
            .unwrap();
        let list_any = path!["t", ANY].unwrap();
        logic
            .insert(id, &path!["t", 0].unwrap(), &[at(list_any, json!({"a": []}))], false)
            .unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"t": [{"a": []}, {"a": [1, 2]}, {"a": [3]}]}))
        );
        let s = logic.structure();
        assert_eq!(s.list_size(id, &path!["t", 1, "a"].unwrap()).unwrap(), Some(1));
        assert_eq!(s.list_size(id, &path!["t", 2, "a"].unwrap()).unwrap(), Some(0));
        assert_eq!(s.list_size(id, &path!["t", 0, "a"].unwrap()).unwrap(), None);
    }

    #[test]
    fn insert_with_conflict_removal() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"key": [1, 2, 3]}))).unwrap();
        let target = path!["key", "key2", ANY].unwrap();
        logic
            .insert(id, &target, &[at(target.clone(), json!("val"))], true)
            .unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"key": {"key2": ["val"]}})));
    }

    #[test]
    fn insert_rejects_non_list_target() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": 1}))).unwrap();
        let err = logic
            .insert(id, &path!["a"].unwrap(), &[fields(json!(1))], false)
            .unwrap_err();
        assert!(matches!(err, LogicError::Format(FormatError::NotAListElement(_))));
    }

    #[test]
    fn delete_list_element_renumbers_nested() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic
            .create(&fields(json!({"tracks": [
                {"name": "n1", "authors": ["a", "b"]},
                {"name": "n2", "authors": ["c"]}
            ]})))
            .unwrap();
        logic.delete(id, &[path!["tracks", 0].unwrap()]).unwrap();
        assert_eq!(
            logic
                .read(id, None, &[path!["tracks", ANY, "authors", ANY].unwrap()])
                .unwrap(),
            Value::from(json!({"tracks": [{"authors": ["c"]}]}))
        );
        assert_eq!(
            logic.structure().list_size(id, &path!["tracks", 0, "authors"].unwrap()).unwrap(),
            Some(0)
        );
    }

    #[test]
    fn deleting_last_elements_leaves_sentinels() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"l": [1], "m": {"k": 1}}))).unwrap();
        logic
            .delete(id, &[path!["l", 0].unwrap(), path!["m", "k"].unwrap()])
            .unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"l": [], "m": {}})));
        assert_eq!(logic.structure().list_size(id, &path!["l"].unwrap()).unwrap(), None);
    }

    #[test]
    fn delete_uses_indices_from_before_the_call() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"l": ["a", "b", "c", "d"]}))).unwrap();
        logic
            .delete(id, &[path!["l", 0].unwrap(), path!["l", 2].unwrap()])
            .unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"l": ["b", "d"]})));
    }

    #[test]
    fn trailing_any_empties_list_and_masks_expand() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic
            .create(&fields(json!({"t": [{"a": [1, 2], "b": 1}, {"a": [3], "b": 2}]})))
            .unwrap();
        logic.delete(id, &[path!["t", ANY, "a", ANY].unwrap()]).unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"t": [{"a": [], "b": 1}, {"a": [], "b": 2}]}))
        );
        logic.delete(id, &[path!["t", ANY, "b"].unwrap()]).unwrap();
        assert_eq!(
            whole(&logic, id),
            Value::from(json!({"t": [{"a": []}, {"a": []}]}))
        );
    }

    #[test]
    fn delete_absent_path_is_noop_and_missing_object_errors() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = logic.create(&fields(json!({"a": 1}))).unwrap();
        logic.delete(id, &[path!["zzz"].unwrap()]).unwrap();
        assert_eq!(whole(&logic, id), Value::from(json!({"a": 1})));

        logic.delete(id, &[]).unwrap();
        assert!(!logic.object_exists(id).unwrap());
        assert!(matches!(
            logic.delete(id, &[]).unwrap_err(),
            LogicError::ObjectNotFound(_)
        ));
        assert!(logic.structure().field_tables().unwrap().is_empty());
    }
}
