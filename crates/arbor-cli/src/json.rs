//! Conversions between command-line text and Arbor types.
//!
//! Documents are plain JSON; a byte string is written as
//! `{"$bytes": "<hex>"}`. Paths take either a dotted form (`tracks.0.title`,
//! `*` for any index, empty for the root) or a JSON array where `null` is
//! any index.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail, Context};
use serde_json::{json, Map, Number};

use arbor_sdk::{Comparator, Condition, Path, PathElem, Scalar, Term, Value};

const BYTES_KEY: &str = "$bytes";

pub fn parse_value(raw: &str) -> anyhow::Result<Value> {
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("invalid JSON document: {raw}"))?;
    from_json(json)
}

pub fn from_json(json: serde_json::Value) -> anyhow::Result<Value> {
    Ok(match json {
        serde_json::Value::Array(items) => Value::List(
            items
                .into_iter()
                .map(from_json)
                .collect::<anyhow::Result<_>>()?,
        ),
        serde_json::Value::Object(entries) => {
            if let Some(hex) = bytes_literal(&entries) {
                let bytes = hex::decode(hex).with_context(|| format!("bad hex in $bytes: {hex}"))?;
                return Ok(Value::Bytes(bytes));
            }
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                map.insert(key, from_json(value)?);
            }
            Value::Map(map)
        }
        scalar => Value::from(scalar),
    })
}

fn bytes_literal(entries: &Map<String, serde_json::Value>) -> Option<&str> {
    if entries.len() != 1 {
        return None;
    }
    entries.get(BYTES_KEY).and_then(serde_json::Value::as_str)
}

pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(v) => json!(v),
        Value::Float(v) => Number::from_f64(*v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Str(v) => json!(v),
        Value::Bytes(v) => json!({ BYTES_KEY: hex::encode(v) }),
        Value::List(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.clone(), to_json(v)))
                .collect(),
        ),
    }
}

pub fn parse_path(raw: &str) -> anyhow::Result<Path> {
    let raw = raw.trim();
    if raw.starts_with('[') {
        let json: serde_json::Value =
            serde_json::from_str(raw).with_context(|| format!("invalid JSON path: {raw}"))?;
        return path_from_json(&json);
    }
    if raw.is_empty() {
        return Ok(Path::root());
    }
    let elems = raw
        .split('.')
        .map(|part| match part {
            "*" => PathElem::Any,
            _ if !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit()) => {
                part.parse().map(PathElem::Index).unwrap_or_else(|_| PathElem::Key(part.into()))
            }
            _ => PathElem::Key(part.to_string()),
        })
        .collect();
    Ok(Path::new(elems)?)
}

fn path_from_json(json: &serde_json::Value) -> anyhow::Result<Path> {
    let items = match json {
        serde_json::Value::String(s) => return parse_path(s),
        serde_json::Value::Array(items) => items,
        other => bail!("path must be a string or an array, got {other}"),
    };
    let elems = items
        .iter()
        .map(|item| match item {
            serde_json::Value::Null => Ok(PathElem::Any),
            serde_json::Value::String(key) => Ok(PathElem::Key(key.clone())),
            serde_json::Value::Number(n) => n
                .as_u64()
                .and_then(|i| usize::try_from(i).ok())
                .map(PathElem::Index)
                .ok_or_else(|| anyhow!("list index must be a non-negative integer, got {n}")),
            other => Err(anyhow!("unsupported path element {other}")),
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Path::new(elems)?)
}

/// Parse a search condition from a JSON term list.
///
/// Terms are `"NOT"`, `"AND"`, `"OR"`, nested arrays for groups, and leaf
/// objects `{"path": ..., "op": "==", "value": ...}`.
pub fn parse_condition(raw: &str) -> anyhow::Result<Condition> {
    let json: serde_json::Value =
        serde_json::from_str(raw).with_context(|| format!("invalid JSON condition: {raw}"))?;
    let terms = match json {
        serde_json::Value::Array(items) => items,
        leaf @ serde_json::Value::Object(_) => vec![leaf],
        other => bail!("condition must be an array of terms, got {other}"),
    };
    Ok(Condition::from_terms(parse_terms(terms)?)?)
}

fn parse_terms(items: Vec<serde_json::Value>) -> anyhow::Result<Vec<Term>> {
    items.into_iter().map(parse_term).collect()
}

fn parse_term(json: serde_json::Value) -> anyhow::Result<Term> {
    match json {
        serde_json::Value::String(word) => match word.to_ascii_uppercase().as_str() {
            "NOT" => Ok(Term::Not),
            "AND" => Ok(Term::And),
            "OR" => Ok(Term::Or),
            _ => bail!("unknown operator {word:?}"),
        },
        serde_json::Value::Array(items) => Ok(Term::Group(parse_terms(items)?)),
        serde_json::Value::Object(mut leaf) => {
            let path = leaf
                .remove("path")
                .ok_or_else(|| anyhow!("condition leaf needs a \"path\""))?;
            let op = match leaf.remove("op") {
                Some(serde_json::Value::String(op)) => op.parse::<Comparator>()?,
                None => Comparator::Eq,
                Some(other) => bail!("comparator must be a string, got {other}"),
            };
            let value = leaf
                .remove("value")
                .ok_or_else(|| anyhow!("condition leaf needs a \"value\""))?;
            let scalar = Scalar::from_value(&from_json(value)?)?;
            Ok(Term::Leaf(path_from_json(&path)?, op, scalar))
        }
        other => bail!("unsupported condition term {other}"),
    }
}
