//! Reads: whole objects, subtrees, masked selections, searches and dumps.

use tracing::debug;

use arbor_engine::Engine;
use arbor_types::{build, subtree, Condition, Field, ObjectId, Path, Value};

use crate::error::{LogicError, LogicResult};
use crate::Logic;

impl<'e, E: Engine + ?Sized> Logic<'e, E> {
    /// Read part or all of object `id`.
    ///
    /// - no `path`, no `masks`: the whole object;
    /// - a concrete `path`: the subtree stored there;
    /// - a masked `path`: the same as passing it as the only mask;
    /// - `masks`: the union of every selection (each prefixed by `path`
    ///   when given), laid out from the root of the object.
    ///
    /// A path or mask selecting nothing is [`LogicError::PathNotFound`].
    pub fn read(&self, id: ObjectId, path: Option<&Path>, masks: &[Path]) -> LogicResult<Value> {
        self.require_object(id)?;
        match (path, masks.is_empty()) {
            (None, true) => self.read_all(id),
            (Some(path), true) if path.is_concrete() => self.read_subtree(id, path),
            (Some(path), true) => self.read_masks(id, std::slice::from_ref(path)),
            (None, false) => self.read_masks(id, masks),
            (Some(base), false) => {
                let masks: Vec<Path> = masks.iter().map(|m| base.concat(m)).collect();
                self.read_masks(id, &masks)
            }
        }
    }

    fn read_all(&self, id: ObjectId) -> LogicResult<Value> {
        let fields = self.fields_below(id, &Path::root())?;
        build(fields)?.ok_or_else(|| LogicError::PathNotFound {
            id,
            path: Path::root(),
        })
    }

    fn read_subtree(&self, id: ObjectId, path: &Path) -> LogicResult<Value> {
        let not_found = || LogicError::PathNotFound {
            id,
            path: path.clone(),
        };
        let fields = self.fields_below(id, path)?;
        let tree = build(fields)?.ok_or_else(not_found)?;
        subtree(&tree, path).cloned().ok_or_else(not_found)
    }

    fn read_masks(&self, id: ObjectId, masks: &[Path]) -> LogicResult<Value> {
        let mut selected = Vec::new();
        for mask in masks {
            let fields = self.fields_below(id, mask)?;
            if fields.is_empty() {
                return Err(LogicError::PathNotFound {
                    id,
                    path: mask.clone(),
                });
            }
            selected.extend(fields);
        }
        debug!(%id, masks = masks.len(), fields = selected.len(), "masked read");
        build(selected)?.ok_or_else(|| LogicError::PathNotFound {
            id,
            path: Path::root(),
        })
    }

    /// Every stored field of object `id` at or below `path`, which may be a
    /// mask.
    pub fn fields_below(&self, id: ObjectId, path: &Path) -> LogicResult<Vec<Field>> {
        let mut fields = Vec::new();
        for (below, tag) in self.structure.field_list(id, Some(path), false)? {
            if let Some(values) = self.structure.field_values(id, &below, tag)? {
                fields.extend(values);
            }
        }
        Ok(fields)
    }

    /// IDs of the objects satisfying `condition`, ascending. With no
    /// condition every object matches.
    pub fn search(&self, condition: Option<&Condition>) -> LogicResult<Vec<ObjectId>> {
        let (sql, params) = self.structure.build_query(condition)?;
        let rows = self.structure.engine().query(&sql, &params)?;
        let ids = rows
            .iter()
            .filter_map(|row| row.first())
            .map(|raw| raw.as_i64().map(ObjectId::new))
            .collect::<Result<Vec<_>, _>>()?;
        debug!(matches = ids.len(), "search finished");
        Ok(ids)
    }

    /// Every object with its full document, by ascending ID.
    pub fn dump(&self) -> LogicResult<Vec<(ObjectId, Value)>> {
        self.structure
            .object_ids()?
            .into_iter()
            .map(|id| Ok((id, self.read_all(id)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_engine::SqliteEngine;
    use arbor_structure::Structure;
    use arbor_types::{flatten, path, Comparator, ANY};
    use serde_json::json;

    fn engine() -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        Structure::new(&engine).initialize().unwrap();
        engine
    }

    fn create(logic: &Logic<'_, SqliteEngine>, json: serde_json::Value) -> ObjectId {
        let fields = flatten(&Value::from(json), &Path::root()).unwrap();
        logic.create(&fields).unwrap()
    }

    fn album() -> serde_json::Value {
        json!({
            "album": "A",
            "tracks": [
                {"name": "n1", "authors": ["x", "y"]},
                {"name": "n2", "authors": ["z"]}
            ]
        })
    }

    #[test]
    fn whole_object_and_subtrees() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = create(&logic, album());
        assert_eq!(logic.read(id, None, &[]).unwrap(), Value::from(album()));
        assert_eq!(
            logic.read(id, Some(&path!["tracks", 1].unwrap()), &[]).unwrap(),
            Value::from(json!({"name": "n2", "authors": ["z"]}))
        );
        assert_eq!(
            logic.read(id, Some(&path!["tracks", 0, "authors", 1].unwrap()), &[]).unwrap(),
            Value::from("y")
        );
    }

    #[test]
    fn empty_containers_survive() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = create(&logic, json!({"a": {}, "b": [], "c": [{}, []]}));
        assert_eq!(
            logic.read(id, None, &[]).unwrap(),
            Value::from(json!({"a": {}, "b": [], "c": [{}, []]}))
        );
        let empty = create(&logic, json!({}));
        assert_eq!(logic.read(empty, None, &[]).unwrap(), Value::from(json!({})));
    }

    #[test]
    fn masks_are_root_relative() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = create(&logic, album());
        let names = logic
            .read(id, Some(&path!["tracks", ANY, "name"].unwrap()), &[])
            .unwrap();
        assert_eq!(
            names,
            Value::from(json!({"tracks": [{"name": "n1"}, {"name": "n2"}]}))
        );

        let both = logic
            .read(
                id,
                None,
                &[path!["album"].unwrap(), path!["tracks", ANY, "authors", 0].unwrap()],
            )
            .unwrap();
        assert_eq!(
            both,
            Value::from(json!({"album": "A", "tracks": [{"authors": ["x"]}, {"authors": ["z"]}]}))
        );

        let based = logic
            .read(id, Some(&path!["tracks"].unwrap()), &[path![1, "name"].unwrap()])
            .unwrap();
        assert_eq!(based, Value::from(json!({"tracks": [null, {"name": "n2"}]})));
    }

    #[test]
    fn missing_paths_and_objects() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let id = create(&logic, album());
        assert!(matches!(
            logic.read(id, Some(&path!["nope"].unwrap()), &[]),
            Err(LogicError::PathNotFound { .. })
        ));
        assert!(matches!(
            logic.read(id, None, &[path!["album"].unwrap(), path!["nope"].unwrap()]),
            Err(LogicError::PathNotFound { .. })
        ));
        assert!(matches!(
            logic.read(ObjectId::new(999), None, &[]),
            Err(LogicError::ObjectNotFound(_))
        ));
    }

    #[test]
    fn search_and_dump() {
        let engine = engine();
        let logic = Logic::new(&engine);
        let a = create(&logic, json!({"name": "Alex", "age": 30}));
        let b = create(&logic, json!({"name": "Bob", "tags": ["x"]}));
        let by_name = Condition::leaf(path!["name"].unwrap(), Comparator::Regex, "^A").unwrap();
        assert_eq!(logic.search(Some(&by_name)).unwrap(), vec![a]);
        assert_eq!(logic.search(Some(&!by_name)).unwrap(), vec![b]);
        assert_eq!(logic.search(None).unwrap(), vec![a, b]);

        let dump = logic.dump().unwrap();
        assert_eq!(dump.len(), 2);
        assert_eq!(dump[1], (b, Value::from(json!({"name": "Bob", "tags": ["x"]}))));
    }
}
