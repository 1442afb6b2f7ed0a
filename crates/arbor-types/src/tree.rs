//! Conversion between document trees and flat lists of leaf fields.

use crate::error::{FormatError, FormatResult};
use crate::field::Field;
use crate::path::{Path, PathElem};
use crate::value::{Scalar, Value};

/// Decompose `value`, placed at `base`, into its leaf fields.
///
/// Empty mappings and lists produce a pointer leaf so that they survive a
/// round-trip through storage. Fields come out in document order: mapping
/// keys sorted, list elements by index.
pub fn flatten(value: &Value, base: &Path) -> FormatResult<Vec<Field>> {
    let mut fields = Vec::new();
    flatten_into(value, base.clone(), &mut fields)?;
    Ok(fields)
}

fn flatten_into(value: &Value, path: Path, out: &mut Vec<Field>) -> FormatResult<()> {
    match value {
        Value::Map(entries) if !entries.is_empty() => {
            for (key, child) in entries {
                flatten_into(child, path.key(key.as_str())?, out)?;
            }
        }
        Value::List(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten_into(child, path.index(index), out)?;
            }
        }
        Value::Float(f) if f.is_nan() => {
            return Err(FormatError::UnsupportedValue(format!("NaN at {path}")));
        }
        leaf => out.push(Field::new(path, Scalar::from_value(leaf)?)),
    }
    Ok(())
}

/// Rebuild a document tree from concrete leaf fields.
///
/// Returns `None` when there are no fields. List positions that no field
/// covers are filled with `Null`.
pub fn build<I>(fields: I) -> FormatResult<Option<Value>>
where
    I: IntoIterator<Item = Field>,
{
    let mut root: Option<Value> = None;
    for field in fields {
        let node = root.get_or_insert(Value::Null);
        insert(node, field.path.elements(), field.value, &field.path)?;
    }
    Ok(root)
}

fn insert(node: &mut Value, elems: &[PathElem], value: Scalar, full: &Path) -> FormatResult<()> {
    let Some((head, rest)) = elems.split_first() else {
        place(node, value);
        return Ok(());
    };
    match head {
        PathElem::Key(key) => {
            if !matches!(node, Value::Map(_)) {
                *node = Value::empty_map();
            }
            if let Value::Map(entries) = node {
                let child = entries.entry(key.clone()).or_insert(Value::Null);
                insert(child, rest, value, full)?;
            }
        }
        PathElem::Index(index) => {
            if !matches!(node, Value::List(_)) {
                *node = Value::empty_list();
            }
            if let Value::List(items) = node {
                if items.len() <= *index {
                    items.resize(*index + 1, Value::Null);
                }
                insert(&mut items[*index], rest, value, full)?;
            }
        }
        PathElem::Any => return Err(FormatError::MaskNotAllowed(full.to_string())),
    }
    Ok(())
}

fn place(node: &mut Value, value: Scalar) {
    match value {
        // A pointer never erases children that other fields already placed.
        Scalar::MapPointer => {
            if !matches!(node, Value::Map(_)) {
                *node = Value::empty_map();
            }
        }
        Scalar::ListPointer => {
            if !matches!(node, Value::List(_)) {
                *node = Value::empty_list();
            }
        }
        scalar => *node = Value::from(scalar),
    }
}

/// The node at a concrete `path` inside `value`.
pub fn subtree<'a>(value: &'a Value, path: &Path) -> Option<&'a Value> {
    path.elements()
        .iter()
        .try_fold(value, |node, elem| match (node, elem) {
            (Value::Map(entries), PathElem::Key(key)) => entries.get(key),
            (Value::List(items), PathElem::Index(index)) => items.get(*index),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Value {
        Value::from(json)
    }

    #[test]
    fn flatten_nested_document() {
        let value = doc(json!({"tracks": [{"name": "n1"}, "x"], "tags": []}));
        let fields = flatten(&value, &Path::root()).unwrap();
        assert_eq!(
            fields,
            vec![
                Field::new(path!["tags"].unwrap(), Scalar::ListPointer),
                Field::new(path!["tracks", 0, "name"].unwrap(), "n1"),
                Field::new(path!["tracks", 1].unwrap(), "x"),
            ]
        );
    }

    #[test]
    fn flatten_relative_to_base() {
        let fields = flatten(&Value::from(5), &path!["a", 2].unwrap()).unwrap();
        assert_eq!(fields, vec![Field::new(path!["a", 2].unwrap(), 5)]);
    }

    #[test]
    fn flatten_rejects_empty_keys_and_nan() {
        let bad = Value::map([("", 1)]);
        assert_eq!(flatten(&bad, &Path::root()).unwrap_err(), FormatError::EmptyKey);
        assert!(flatten(&Value::Float(f64::NAN), &Path::root()).is_err());
    }

    #[test]
    fn empty_root_map_is_a_pointer() {
        let fields = flatten(&Value::empty_map(), &Path::root()).unwrap();
        assert_eq!(fields, vec![Field::new(Path::root(), Scalar::MapPointer)]);
    }

    #[test]
    fn build_inverts_flatten() {
        let value = doc(json!({
            "a": [[null], [77, null]],
            "b": {"c": {}, "d": [1.5, "s"]},
            "e": null
        }));
        let fields = flatten(&value, &Path::root()).unwrap();
        assert_eq!(build(fields).unwrap(), Some(value));
    }

    #[test]
    fn build_pads_missing_list_positions() {
        let fields = vec![Field::new(path![2].unwrap(), "z")];
        assert_eq!(
            build(fields).unwrap(),
            Some(doc(json!([null, null, "z"])))
        );
    }

    #[test]
    fn pointer_does_not_erase_siblings() {
        let fields = vec![
            Field::new(path!["m", "k"].unwrap(), 1),
            Field::new(path!["m"].unwrap(), Scalar::MapPointer),
        ];
        assert_eq!(build(fields).unwrap(), Some(doc(json!({"m": {"k": 1}}))));
    }

    #[test]
    fn build_of_nothing_is_none() {
        assert_eq!(build(Vec::new()).unwrap(), None);
    }

    #[test]
    fn subtree_walks_concrete_paths() {
        let value = doc(json!({"t": [{"n": "x"}]}));
        assert_eq!(
            subtree(&value, &path!["t", 0, "n"].unwrap()),
            Some(&Value::from("x"))
        );
        assert_eq!(subtree(&value, &path!["t", 1].unwrap()), None);
        assert_eq!(subtree(&value, &Path::root()), Some(&value));
    }
}
