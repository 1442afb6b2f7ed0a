//! Typed requests.
//!
//! Constructors validate their input and flatten documents into owned
//! fields, so format errors surface before any engine work and a queued
//! request shares nothing with the caller.

use arbor_types::{flatten, Condition, Field, FormatError, ObjectId, Path, Value};

use crate::error::SdkResult;

#[derive(Clone, Debug, PartialEq)]
pub enum Request {
    Create {
        fields: Vec<Field>,
    },
    Modify {
        id: ObjectId,
        path: Path,
        fields: Vec<Field>,
        remove_conflicts: bool,
    },
    Insert {
        id: ObjectId,
        target: Path,
        /// One group of fields per inserted value, with `ANY` at the list
        /// position.
        groups: Vec<Vec<Field>>,
        remove_conflicts: bool,
    },
    Delete {
        id: ObjectId,
        paths: Vec<Path>,
    },
    Read {
        id: ObjectId,
        path: Option<Path>,
        masks: Vec<Path>,
    },
    Search {
        condition: Option<Condition>,
    },
    ObjectExists {
        id: ObjectId,
    },
    Dump,
    Repair,
    Verify,
}

impl Request {
    /// A new object holding `value`, placed at `path` when given.
    pub fn create(value: &Value, path: Option<&Path>) -> SdkResult<Self> {
        let base = path.cloned().unwrap_or_default();
        base.require_concrete()?;
        Ok(Request::Create {
            fields: flatten(value, &base)?,
        })
    }

    /// Write `value` at `path`. Without `remove_conflicts` its leaves are
    /// merged into what is stored there; with it the old subtree is
    /// replaced and clashing containers on the way are removed.
    pub fn modify(id: ObjectId, path: &Path, value: &Value, remove_conflicts: bool) -> SdkResult<Self> {
        path.require_concrete()?;
        Ok(Request::Modify {
            id,
            path: path.clone(),
            fields: flatten(value, path)?,
            remove_conflicts,
        })
    }

    pub fn insert(id: ObjectId, target: &Path, value: &Value, remove_conflicts: bool) -> SdkResult<Self> {
        Self::insert_many(id, target, std::slice::from_ref(value), remove_conflicts)
    }

    /// Insert `values` as consecutive elements of the list `target`
    /// points into. `target` ends in an index (insert before it) or `ANY`
    /// (append).
    pub fn insert_many(
        id: ObjectId,
        target: &Path,
        values: &[Value],
        remove_conflicts: bool,
    ) -> SdkResult<Self> {
        let list = match (target.points_to_list_element(), target.parent()) {
            (true, Some(list)) => list,
            _ => return Err(FormatError::NotAListElement(target.to_string()).into()),
        };
        list.require_concrete()?;
        let placeholder = list.any();
        let groups = values
            .iter()
            .map(|value| flatten(value, &placeholder))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Request::Insert {
            id,
            target: target.clone(),
            groups,
            remove_conflicts,
        })
    }

    /// Delete `path` from an object, or the whole object when `None`.
    pub fn delete(id: ObjectId, path: Option<&Path>) -> Self {
        Request::Delete {
            id,
            paths: path.into_iter().cloned().collect(),
        }
    }

    /// Delete several paths at once. Indices all refer to the state
    /// before the request. An empty slice deletes the object.
    pub fn delete_many(id: ObjectId, paths: &[Path]) -> Self {
        Request::Delete {
            id,
            paths: paths.to_vec(),
        }
    }

    pub fn read(id: ObjectId, path: Option<&Path>, masks: &[Path]) -> Self {
        Request::Read {
            id,
            path: path.cloned(),
            masks: masks.to_vec(),
        }
    }

    pub fn search(condition: Option<&Condition>) -> Self {
        Request::Search {
            condition: condition.cloned(),
        }
    }

    pub fn object_exists(id: ObjectId) -> Self {
        Request::ObjectExists { id }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Request::Create { .. } => "create",
            Request::Modify { .. } => "modify",
            Request::Insert { .. } => "insert",
            Request::Delete { .. } => "delete",
            Request::Read { .. } => "read",
            Request::Search { .. } => "search",
            Request::ObjectExists { .. } => "object_exists",
            Request::Dump => "dump",
            Request::Repair => "repair",
            Request::Verify => "verify",
        }
    }

    /// The object this request addresses, if any.
    pub fn object(&self) -> Option<ObjectId> {
        match self {
            Request::Modify { id, .. }
            | Request::Insert { id, .. }
            | Request::Delete { id, .. }
            | Request::Read { id, .. }
            | Request::ObjectExists { id } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use arbor_types::{path, Scalar, ANY};
    use serde_json::json;

    #[test]
    fn create_flattens_at_base() {
        let value = Value::from(json!({"a": [1, {}]}));
        let Request::Create { fields } = Request::create(&value, Some(&path!["doc"].unwrap())).unwrap() else {
            panic!("expected create");
        };
        assert_eq!(
            fields,
            vec![
                Field::new(path!["doc", "a", 0].unwrap(), 1),
                Field::new(path!["doc", "a", 1].unwrap(), Scalar::MapPointer),
            ]
        );
    }

    #[test]
    fn masks_rejected_where_concrete_paths_are_required() {
        let value = Value::from(1);
        let masked = path!["a", ANY].unwrap();
        assert_eq!(
            Request::create(&value, Some(&masked)).unwrap_err().kind(),
            ErrorKind::Format
        );
        assert_eq!(
            Request::modify(ObjectId::new(1), &masked, &value, false).unwrap_err().kind(),
            ErrorKind::Format
        );
    }

    #[test]
    fn insert_groups_carry_placeholder() {
        let values = [Value::from("x"), Value::from(json!({"k": 1}))];
        let request =
            Request::insert_many(ObjectId::new(1), &path!["l", 3].unwrap(), &values, false).unwrap();
        let Request::Insert { groups, .. } = request else {
            panic!("expected insert");
        };
        assert_eq!(groups[0], vec![Field::new(path!["l", ANY].unwrap(), "x")]);
        assert_eq!(groups[1], vec![Field::new(path!["l", ANY, "k"].unwrap(), 1)]);

        let err = Request::insert(ObjectId::new(1), &path!["l", "k"].unwrap(), &values[0], false)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
    }
}
