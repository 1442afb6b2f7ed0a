use serde::{Deserialize, Serialize};

use crate::error::FormatResult;
use crate::path::Path;
use crate::value::{Scalar, TypeTag};

/// A single leaf of a document: where it lives and what it holds.
///
/// Paths of fields produced by [`flatten`](crate::flatten) or read back from
/// storage are concrete. Insert requests temporarily carry an `ANY`
/// placeholder at the insertion position until the start index is known.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub path: Path,
    pub value: Scalar,
}

impl Field {
    pub fn new(path: Path, value: impl Into<Scalar>) -> Self {
        Self {
            path,
            value: value.into(),
        }
    }

    /// Storage type of the value.
    pub fn type_tag(&self) -> TypeTag {
        self.value.type_tag()
    }

    /// Name of the table this field is stored in.
    pub fn table_name(&self) -> String {
        self.path.table_name(self.type_tag())
    }

    /// List-index column values for inserting this field's row.
    pub fn column_values(&self) -> FormatResult<Vec<i64>> {
        self.path.column_values()
    }

    /// Returns `true` if the field's path ends in a list position.
    pub fn points_to_list_element(&self) -> bool {
        self.path.points_to_list_element()
    }
}

impl From<(Path, Scalar)> for Field {
    fn from((path, value): (Path, Scalar)) -> Self {
        Self { path, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn table_name_includes_type() {
        let f = Field::new(path!["a", 0].unwrap(), "x");
        assert_eq!(f.type_tag(), TypeTag::Text);
        assert_eq!(f.table_name(), "field:text:.a.");
        assert_eq!(f.column_values().unwrap(), vec![0]);
        assert!(f.points_to_list_element());
    }

    #[test]
    fn null_field() {
        let f = Field::new(path!["a"].unwrap(), Scalar::Null);
        assert_eq!(f.table_name(), "field:null:.a");
        assert!(!f.type_tag().has_value_column());
    }
}
