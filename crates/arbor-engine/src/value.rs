use arbor_types::{Scalar, TypeTag};

use crate::error::{EngineError, EngineResult};

/// A value bound to, or read from, a SQL statement.
#[derive(Clone, Debug, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    pub fn kind_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "null",
            SqlValue::Integer(_) => "integer",
            SqlValue::Real(_) => "real",
            SqlValue::Text(_) => "text",
            SqlValue::Blob(_) => "blob",
        }
    }

    pub fn as_i64(&self) -> EngineResult<i64> {
        match self {
            SqlValue::Integer(v) => Ok(*v),
            other => Err(EngineError::Decode {
                expected: "integer",
                found: other.kind_name(),
            }),
        }
    }

    pub fn as_str(&self) -> EngineResult<&str> {
        match self {
            SqlValue::Text(v) => Ok(v),
            other => Err(EngineError::Decode {
                expected: "text",
                found: other.kind_name(),
            }),
        }
    }

    /// Decode the `value` column of a field table holding `tag` values.
    ///
    /// Null fields have no value column, so `self` is ignored for them.
    /// Pointer sentinels are stored as `0` and only the tag matters.
    pub fn to_scalar(&self, tag: TypeTag) -> EngineResult<Scalar> {
        let mismatch = |expected| EngineError::Decode {
            expected,
            found: self.kind_name(),
        };
        Ok(match tag {
            TypeTag::Null => Scalar::Null,
            TypeTag::Map => Scalar::MapPointer,
            TypeTag::List => Scalar::ListPointer,
            TypeTag::Int => Scalar::Int(self.as_i64()?),
            TypeTag::Float => match self {
                SqlValue::Real(v) => Scalar::Float(*v),
                // SQLite may hand back integral REALs as integers.
                SqlValue::Integer(v) => Scalar::Float(*v as f64),
                _ => return Err(mismatch("real")),
            },
            TypeTag::Text => Scalar::Str(self.as_str()?.to_string()),
            TypeTag::Bytes => match self {
                SqlValue::Blob(v) => Scalar::Bytes(v.clone()),
                _ => return Err(mismatch("blob")),
            },
        })
    }
}

impl From<&Scalar> for SqlValue {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::Null => SqlValue::Null,
            Scalar::Int(v) => SqlValue::Integer(*v),
            Scalar::Float(v) => SqlValue::Real(*v),
            Scalar::Str(v) => SqlValue::Text(v.clone()),
            Scalar::Bytes(v) => SqlValue::Blob(v.clone()),
            Scalar::MapPointer | Scalar::ListPointer => SqlValue::Integer(0),
        }
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointers_travel_as_zero() {
        assert_eq!(SqlValue::from(&Scalar::MapPointer), SqlValue::Integer(0));
        assert_eq!(SqlValue::from(&Scalar::ListPointer), SqlValue::Integer(0));
        assert_eq!(
            SqlValue::Integer(0).to_scalar(TypeTag::List).unwrap(),
            Scalar::ListPointer
        );
    }

    #[test]
    fn decode_checks_storage_class() {
        assert_eq!(
            SqlValue::Text("x".into()).to_scalar(TypeTag::Text).unwrap(),
            Scalar::from("x")
        );
        assert!(SqlValue::Text("x".into()).to_scalar(TypeTag::Int).is_err());
        assert_eq!(
            SqlValue::Integer(3).to_scalar(TypeTag::Float).unwrap(),
            Scalar::Float(3.0)
        );
        assert_eq!(SqlValue::Null.to_scalar(TypeTag::Null).unwrap(), Scalar::Null);
    }
}
