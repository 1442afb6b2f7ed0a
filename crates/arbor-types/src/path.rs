//! Paths inside a document and the names derived from them.
//!
//! A [`Path`] is a sequence of mapping keys, list indices and `ANY`
//! wildcards. Storage never sees a path directly; it sees one of three
//! derived strings:
//!
//! - the **signature** (`.tracks..name`), shared by every instance of the
//!   path: list positions render blank. It names field tables and catalog
//!   rows.
//! - the **instance key** (`.tracks.#1.authors`), which keeps concrete
//!   indices. It names entries of the list-size cache.
//! - the **table name** `field:<type>:<signature>`.
//!
//! Keys are escaped so that the separator `.` and the index marker `#`
//! never occur inside an encoded key. A regex anchored on an encoded prefix
//! followed by `\.` or end-of-string therefore cannot match a neighbour
//! whose key merely shares a textual prefix.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FormatError, FormatResult};
use crate::value::TypeTag;

/// Prefix shared by the names of all field tables.
pub const FIELD_TABLE_PREFIX: &str = "field:";

/// One step of a path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PathElem {
    /// A mapping key. Never empty.
    Key(String),
    /// A list index.
    Index(usize),
    /// Wildcard list position, matching every index.
    Any,
}

/// The wildcard list position.
pub const ANY: PathElem = PathElem::Any;

impl PathElem {
    /// Returns `true` for list positions (`Index` or `Any`).
    pub fn is_list_position(&self) -> bool {
        matches!(self, PathElem::Index(_) | PathElem::Any)
    }

    /// Returns `true` for mapping keys.
    pub fn is_key(&self) -> bool {
        matches!(self, PathElem::Key(_))
    }
}

impl From<&str> for PathElem {
    fn from(key: &str) -> Self {
        PathElem::Key(key.to_string())
    }
}

impl From<String> for PathElem {
    fn from(key: String) -> Self {
        PathElem::Key(key)
    }
}

impl From<usize> for PathElem {
    fn from(index: usize) -> Self {
        PathElem::Index(index)
    }
}

impl fmt::Display for PathElem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathElem::Key(k) => write!(f, "{k:?}"),
            PathElem::Index(i) => write!(f, "{i}"),
            PathElem::Any => f.write_str("ANY"),
        }
    }
}

/// Build a [`Path`] from keys, indices and [`ANY`].
///
/// Expands to `Path::new(...)` and so returns a `FormatResult<Path>`.
///
/// ```
/// use arbor_types::{path, ANY};
/// let p = path!["tracks", 0, ANY].unwrap();
/// assert_eq!(p.len(), 3);
/// ```
#[macro_export]
macro_rules! path {
    () => {
        $crate::Path::new(::std::vec::Vec::new())
    };
    ($($elem:expr),+ $(,)?) => {
        $crate::Path::new(::std::vec![$($crate::PathElem::from($elem)),+])
    };
}

/// Address of a subtree inside a document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Path(Vec<PathElem>);

impl Path {
    /// The empty path, addressing the document root.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path, rejecting empty mapping keys.
    pub fn new(elems: Vec<PathElem>) -> FormatResult<Self> {
        if elems
            .iter()
            .any(|e| matches!(e, PathElem::Key(k) if k.is_empty()))
        {
            return Err(FormatError::EmptyKey);
        }
        Ok(Self(elems))
    }

    pub fn elements(&self) -> &[PathElem] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns `true` for the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathElem> {
        self.0.last()
    }

    /// The path without its last element, or `None` for the root.
    pub fn parent(&self) -> Option<Path> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.prefix(self.0.len() - 1))
        }
    }

    /// The first `len` elements.
    pub fn prefix(&self, len: usize) -> Path {
        Path(self.0[..len.min(self.0.len())].to_vec())
    }

    /// This path extended by a mapping key.
    pub fn key(&self, key: impl Into<String>) -> FormatResult<Path> {
        let key = key.into();
        if key.is_empty() {
            return Err(FormatError::EmptyKey);
        }
        let mut elems = self.0.clone();
        elems.push(PathElem::Key(key));
        Ok(Path(elems))
    }

    /// This path extended by a list index.
    pub fn index(&self, index: usize) -> Path {
        let mut elems = self.0.clone();
        elems.push(PathElem::Index(index));
        Path(elems)
    }

    /// This path extended by a wildcard list position.
    pub fn any(&self) -> Path {
        let mut elems = self.0.clone();
        elems.push(PathElem::Any);
        Path(elems)
    }

    /// This path followed by all elements of `tail`.
    pub fn concat(&self, tail: &Path) -> Path {
        let mut elems = self.0.clone();
        elems.extend(tail.0.iter().cloned());
        Path(elems)
    }

    /// Copy of this path with the list position at `pos` replaced.
    ///
    /// Used to substitute an insertion placeholder with a concrete index.
    /// Positions holding a mapping key are left untouched.
    pub fn with_index(&self, pos: usize, index: usize) -> Path {
        let mut elems = self.0.clone();
        if let Some(elem) = elems.get_mut(pos) {
            if elem.is_list_position() {
                *elem = PathElem::Index(index);
            }
        }
        Path(elems)
    }

    /// Replace the first `prefix.len()` elements with those of `prefix`.
    ///
    /// Catalog lookups return paths with every list position blank; splicing
    /// the caller's prefix back restores its concrete indices.
    pub fn splice_prefix(&self, prefix: &Path) -> Path {
        let mut elems = prefix.0.clone();
        if self.0.len() > prefix.0.len() {
            elems.extend(self.0[prefix.0.len()..].iter().cloned());
        }
        Path(elems)
    }

    /// Returns `true` if no element is `ANY`.
    pub fn is_concrete(&self) -> bool {
        !self.0.iter().any(|e| matches!(e, PathElem::Any))
    }

    /// Fail with a format error unless the path is concrete.
    pub fn require_concrete(&self) -> FormatResult<()> {
        if self.is_concrete() {
            Ok(())
        } else {
            Err(FormatError::MaskNotAllowed(self.to_string()))
        }
    }

    /// Returns `true` if the last element is a list position.
    pub fn points_to_list_element(&self) -> bool {
        self.0.last().is_some_and(PathElem::is_list_position)
    }

    /// Element-wise prefix test. `ANY` only equals `ANY` here; use
    /// [`Path::matches`] for wildcard semantics.
    pub fn starts_with(&self, prefix: &Path) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Returns `true` if this path is one of the paths addressed by `mask`.
    ///
    /// `ANY` in the mask matches any index (or `ANY`) at that position;
    /// every other element must be equal.
    pub fn matches(&self, mask: &Path) -> bool {
        self.0.len() == mask.0.len()
            && self.0.iter().zip(&mask.0).all(|(elem, m)| match m {
                PathElem::Any => elem.is_list_position(),
                other => elem == other,
            })
    }

    /// Walk every proper prefix from the root outward, together with the
    /// element that follows it.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors {
            path: self,
            next: 0,
        }
    }

    // ---------------------------------------------------------------
    // Signatures and names
    // ---------------------------------------------------------------

    /// The signature shared by all instances of this path.
    pub fn signature(&self) -> String {
        self.0
            .iter()
            .map(|elem| match elem {
                PathElem::Key(k) => format!(".{}", escape_key(k)),
                PathElem::Index(_) | PathElem::Any => ".".to_string(),
            })
            .collect()
    }

    /// Parse a signature back into a path. List positions become `ANY`.
    pub fn from_signature(signature: &str) -> FormatResult<Path> {
        if signature.is_empty() {
            return Ok(Path::root());
        }
        let body = signature
            .strip_prefix('.')
            .ok_or_else(|| FormatError::InvalidSignature(signature.to_string()))?;
        let elems = body
            .split('.')
            .map(|piece| {
                if piece.is_empty() {
                    Ok(PathElem::Any)
                } else {
                    unescape_key(piece).map(PathElem::Key)
                }
            })
            .collect::<FormatResult<Vec<_>>>()?;
        Ok(Path(elems))
    }

    /// Name of the field table backing this path for values of type `tag`.
    pub fn table_name(&self, tag: TypeTag) -> String {
        format!("{FIELD_TABLE_PREFIX}{}:{}", tag.as_str(), self.signature())
    }

    /// Recognize a field table name. Returns `None` for any other table.
    pub fn parse_table_name(name: &str) -> Option<(Path, TypeTag)> {
        let rest = name.strip_prefix(FIELD_TABLE_PREFIX)?;
        let (tag, signature) = rest.split_once(':')?;
        let tag = tag.parse().ok()?;
        let path = Path::from_signature(signature).ok()?;
        Some((path, tag))
    }

    /// Key of this (concrete) path in the list-size cache.
    pub fn instance_key(&self) -> FormatResult<String> {
        self.0
            .iter()
            .map(|elem| match elem {
                PathElem::Key(k) => Ok(format!(".{}", escape_key(k))),
                PathElem::Index(i) => Ok(format!(".#{i}")),
                PathElem::Any => Err(FormatError::MaskNotAllowed(self.to_string())),
            })
            .collect()
    }

    /// Parse an instance key back into a concrete path.
    pub fn from_instance_key(key: &str) -> FormatResult<Path> {
        if key.is_empty() {
            return Ok(Path::root());
        }
        let invalid = || FormatError::InvalidSignature(key.to_string());
        let body = key.strip_prefix('.').ok_or_else(invalid)?;
        let elems = body
            .split('.')
            .map(|piece| {
                if let Some(digits) = piece.strip_prefix('#') {
                    digits.parse().map(PathElem::Index).map_err(|_| invalid())
                } else if piece.is_empty() {
                    Err(invalid())
                } else {
                    unescape_key(piece).map(PathElem::Key)
                }
            })
            .collect::<FormatResult<Vec<_>>>()?;
        Ok(Path(elems))
    }

    /// Regex over catalog signatures selecting this path's descendants.
    pub fn descendants_pattern(&self, include_self: bool) -> String {
        let tail = if include_self { r"(\.|$)" } else { r"\." };
        format!("^{}{tail}", regex::escape(&self.signature()))
    }

    /// Regex over list-size instance keys selecting every list instance at
    /// or below the paths this (possibly masked) path addresses.
    pub fn instances_pattern(&self, include_self: bool) -> String {
        let mut pattern = String::from("^");
        for elem in &self.0 {
            match elem {
                PathElem::Key(k) => pattern.push_str(&regex::escape(&format!(".{}", escape_key(k)))),
                PathElem::Index(i) => pattern.push_str(&regex::escape(&format!(".#{i}"))),
                PathElem::Any => pattern.push_str(r"\.#\d+"),
            }
        }
        pattern.push_str(if include_self { r"(\.|$)" } else { r"\." });
        pattern
    }

    // ---------------------------------------------------------------
    // List-index columns
    // ---------------------------------------------------------------

    /// Number of list positions, i.e. of `c*` columns in the field table.
    pub fn list_position_count(&self) -> usize {
        self.0.iter().filter(|e| e.is_list_position()).count()
    }

    /// Names of the list-index columns, in path order.
    pub fn list_columns(&self) -> Vec<String> {
        (0..self.list_position_count()).map(column_name).collect()
    }

    /// Concrete index values in column order, for inserting a row.
    pub fn column_values(&self) -> FormatResult<Vec<i64>> {
        self.0
            .iter()
            .filter(|e| e.is_list_position())
            .map(|e| match e {
                PathElem::Index(i) => Ok(*i as i64),
                _ => Err(FormatError::MaskNotAllowed(self.to_string())),
            })
            .collect()
    }

    /// Equality conjunction over the concrete list positions, e.g.
    /// `c0 = 1 AND c2 = 0`. `ANY` positions are left unrestricted. Returns
    /// an empty string when nothing is restricted.
    pub fn column_condition(&self) -> String {
        self.0
            .iter()
            .filter(|e| e.is_list_position())
            .enumerate()
            .filter_map(|(column, elem)| match elem {
                PathElem::Index(i) => Some(format!("{} = {i}", column_name(column))),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    /// `(column, element position)` of every `ANY` in the path.
    ///
    /// Reading by mask selects these columns and substitutes the row values
    /// back into the path.
    pub fn wildcard_columns(&self) -> Vec<(String, usize)> {
        let mut column = 0;
        let mut result = Vec::new();
        for (pos, elem) in self.0.iter().enumerate() {
            if elem.is_list_position() {
                if matches!(elem, PathElem::Any) {
                    result.push((column_name(column), pos));
                }
                column += 1;
            }
        }
        result
    }

    /// Column holding the list position at element `pos`, if it is one.
    pub fn column_at(&self, pos: usize) -> Option<String> {
        if !self.0.get(pos)?.is_list_position() {
            return None;
        }
        let column = self.0[..pos].iter().filter(|e| e.is_list_position()).count();
        Some(column_name(column))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, elem) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{elem}")?;
        }
        f.write_str("]")
    }
}

/// Name of the `k`-th list-index column.
pub fn column_name(k: usize) -> String {
    format!("c{k}")
}

/// Iterator over `(prefix, next element)` pairs of a path, root first.
#[derive(Clone, Debug)]
pub struct Ancestors<'a> {
    path: &'a Path,
    next: usize,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (Path, &'a PathElem);

    fn next(&mut self) -> Option<Self::Item> {
        let elem = self.path.0.get(self.next)?;
        let prefix = self.path.prefix(self.next);
        self.next += 1;
        Some((prefix, elem))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.path.0.len() - self.next;
        (left, Some(left))
    }
}

impl ExactSizeIterator for Ancestors<'_> {}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for ch in key.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '.' => out.push_str("%2E"),
            '#' => out.push_str("%23"),
            other => out.push(other),
        }
    }
    out
}

fn unescape_key(encoded: &str) -> FormatResult<String> {
    let mut out = String::with_capacity(encoded.len());
    let mut rest = encoded;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest
            .get(pos + 1..pos + 3)
            .ok_or_else(|| FormatError::InvalidSignature(encoded.to_string()))?;
        out.push(match code {
            "25" => '%',
            "2E" => '.',
            "23" => '#',
            _ => return Err(FormatError::InvalidSignature(encoded.to_string())),
        });
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Ok(out)
}
