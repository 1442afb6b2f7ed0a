//! Search predicate trees.
//!
//! A [`Condition`] is a binary tree: leaves compare the values found at a
//! path mask against a scalar, internal nodes combine two subtrees with
//! `AND` / `OR`. Every node carries an invert bit. [`Condition::normalize`]
//! pushes inversion down to the leaves so that lowering to SQL only ever
//! has to invert a single comparison.

use std::fmt;
use std::ops::Not;
use std::str::FromStr;

use crate::error::{FormatError, FormatResult};
use crate::path::Path;
use crate::value::{Scalar, TypeTag};

/// Leaf comparison operator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparator {
    Eq,
    Regex,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparator {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Eq => "==",
            Comparator::Regex => "=~",
            Comparator::Lt => "<",
            Comparator::Le => "<=",
            Comparator::Gt => ">",
            Comparator::Ge => ">=",
        }
    }

    /// Check that this comparator is defined for values of type `tag`.
    pub fn check_operand(self, tag: TypeTag) -> FormatResult<()> {
        let ok = match self {
            Comparator::Eq => true,
            Comparator::Regex => tag.is_matchable(),
            Comparator::Lt | Comparator::Le | Comparator::Gt | Comparator::Ge => {
                tag.is_orderable()
            }
        };
        if ok {
            Ok(())
        } else {
            Err(FormatError::InvalidCondition(format!(
                "operator {} is not defined for {tag} values",
                self.symbol()
            )))
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Comparator {
    type Err = FormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "==" | "eq" => Comparator::Eq,
            "=~" | "regexp" => Comparator::Regex,
            "<" | "lt" => Comparator::Lt,
            "<=" | "le" => Comparator::Le,
            ">" | "gt" => Comparator::Gt,
            ">=" | "ge" => Comparator::Ge,
            other => {
                return Err(FormatError::InvalidCondition(format!(
                    "unknown comparator {other:?}"
                )))
            }
        })
    }
}

/// Operator of an internal node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    /// De Morgan dual.
    pub fn dual(self) -> Self {
        match self {
            Connective::And => Connective::Or,
            Connective::Or => Connective::And,
        }
    }
}

/// A search predicate tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Leaf {
        invert: bool,
        path: Path,
        op: Comparator,
        value: Scalar,
    },
    Node {
        invert: bool,
        op: Connective,
        left: Box<Condition>,
        right: Box<Condition>,
    },
}

impl Condition {
    /// Build a validated comparison leaf.
    ///
    /// Regex requires a string or byte-string operand, ordering requires an
    /// orderable operand, and null or pointer operands only allow equality.
    pub fn leaf(path: Path, op: Comparator, value: impl Into<Scalar>) -> FormatResult<Self> {
        let value = value.into();
        op.check_operand(value.type_tag())?;
        if let (Comparator::Regex, Scalar::Str(pattern)) = (op, &value) {
            regex::Regex::new(pattern)
                .map_err(|e| FormatError::InvalidCondition(format!("bad regex: {e}")))?;
        }
        Ok(Condition::Leaf {
            invert: false,
            path,
            op,
            value,
        })
    }

    /// Shorthand for an equality leaf.
    pub fn eq(path: Path, value: impl Into<Scalar>) -> FormatResult<Self> {
        Self::leaf(path, Comparator::Eq, value)
    }

    pub fn and(self, other: Condition) -> Self {
        Self::combine(Connective::And, self, other)
    }

    pub fn or(self, other: Condition) -> Self {
        Self::combine(Connective::Or, self, other)
    }

    fn combine(op: Connective, left: Condition, right: Condition) -> Self {
        Condition::Node {
            invert: false,
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn is_inverted(&self) -> bool {
        match self {
            Condition::Leaf { invert, .. } | Condition::Node { invert, .. } => *invert,
        }
    }

    /// Push every inversion down to the leaves.
    ///
    /// An inverted internal node swaps `AND`/`OR` and inverts both children.
    /// The result has no inverted internal nodes.
    pub fn normalize(self) -> Self {
        self.push_inversion(false)
    }

    fn push_inversion(self, inherited: bool) -> Self {
        match self {
            Condition::Leaf {
                invert,
                path,
                op,
                value,
            } => Condition::Leaf {
                invert: invert ^ inherited,
                path,
                op,
                value,
            },
            Condition::Node {
                invert,
                op,
                left,
                right,
            } => {
                let inverted = invert ^ inherited;
                Condition::Node {
                    invert: false,
                    op: if inverted { op.dual() } else { op },
                    left: Box::new(left.push_inversion(inverted)),
                    right: Box::new(right.push_inversion(inverted)),
                }
            }
        }
    }

    /// Parse the flat sugar form
    /// `[NOT? operand op operand (op operand)*]`, composed leftmost-first.
    pub fn from_terms(terms: Vec<Term>) -> FormatResult<Self> {
        let mut iter = terms.into_iter().peekable();
        let negate = matches!(iter.peek(), Some(Term::Not));
        if negate {
            iter.next();
        }

        let mut acc = match iter.next() {
            Some(term) => Self::operand(term)?,
            None => return Err(FormatError::InvalidCondition("empty condition".into())),
        };
        while let Some(term) = iter.next() {
            let op = match term {
                Term::And => Connective::And,
                Term::Or => Connective::Or,
                other => {
                    return Err(FormatError::InvalidCondition(format!(
                        "expected AND/OR, found {other:?}"
                    )))
                }
            };
            let rhs = match iter.next() {
                Some(term) => Self::operand(term)?,
                None => {
                    return Err(FormatError::InvalidCondition(
                        "dangling logical operator".into(),
                    ))
                }
            };
            acc = Self::combine(op, acc, rhs);
        }
        Ok(if negate { !acc } else { acc })
    }

    fn operand(term: Term) -> FormatResult<Self> {
        match term {
            Term::Leaf(path, op, value) => Self::leaf(path, op, value),
            Term::Group(inner) => Self::from_terms(inner),
            other => Err(FormatError::InvalidCondition(format!(
                "expected an operand, found {other:?}"
            ))),
        }
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Self::Output {
        match self {
            Condition::Leaf {
                invert,
                path,
                op,
                value,
            } => Condition::Leaf {
                invert: !invert,
                path,
                op,
                value,
            },
            Condition::Node {
                invert,
                op,
                left,
                right,
            } => Condition::Node {
                invert: !invert,
                op,
                left,
                right,
            },
        }
    }
}

/// One token of the flat predicate sugar.
#[derive(Clone, Debug, PartialEq)]
pub enum Term {
    Not,
    And,
    Or,
    Leaf(Path, Comparator, Scalar),
    Group(Vec<Term>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    fn name_is(v: &str) -> Condition {
        Condition::eq(path!["name"].unwrap(), v).unwrap()
    }

    #[test]
    fn operand_types_are_checked() {
        let p = path!["x"].unwrap();
        assert!(Condition::leaf(p.clone(), Comparator::Regex, 5).is_err());
        assert!(Condition::leaf(p.clone(), Comparator::Lt, Scalar::Null).is_err());
        assert!(Condition::leaf(p.clone(), Comparator::Gt, Scalar::ListPointer).is_err());
        assert!(Condition::leaf(p.clone(), Comparator::Eq, Scalar::Null).is_ok());
        assert!(Condition::leaf(p.clone(), Comparator::Regex, "^a.*").is_ok());
        assert!(Condition::leaf(p, Comparator::Regex, "(").is_err());
    }

    #[test]
    fn normalize_applies_de_morgan() {
        let cond = !(name_is("a").and(name_is("b")));
        let expected = (!name_is("a")).or(!name_is("b"));
        assert_eq!(cond.normalize(), expected);
    }

    #[test]
    fn double_inversion_cancels() {
        let cond = !(!(name_is("a").or(name_is("b"))));
        assert_eq!(cond.normalize(), name_is("a").or(name_is("b")));
    }

    #[test]
    fn nested_inversion_reaches_leaves() {
        let cond = !(name_is("a").and(!(name_is("b").or(name_is("c")))));
        let expected = (!name_is("a")).or(name_is("b").or(name_is("c")));
        assert_eq!(cond.normalize(), expected);
    }

    #[test]
    fn sugar_is_leftmost_first() {
        let leaf = |v: &str| Term::Leaf(path!["name"].unwrap(), Comparator::Eq, Scalar::from(v));
        let parsed = Condition::from_terms(vec![
            leaf("a"),
            Term::Or,
            leaf("b"),
            Term::And,
            leaf("c"),
        ])
        .unwrap();
        assert_eq!(parsed, name_is("a").or(name_is("b")).and(name_is("c")));
    }

    #[test]
    fn sugar_supports_not_and_groups() {
        let leaf = |v: &str| Term::Leaf(path!["name"].unwrap(), Comparator::Eq, Scalar::from(v));
        let parsed = Condition::from_terms(vec![
            Term::Not,
            leaf("a"),
            Term::And,
            Term::Group(vec![leaf("b"), Term::Or, leaf("c")]),
        ])
        .unwrap();
        assert_eq!(parsed, !(name_is("a").and(name_is("b").or(name_is("c")))));
    }

    #[test]
    fn malformed_sugar_is_rejected() {
        let leaf = Term::Leaf(path!["x"].unwrap(), Comparator::Eq, Scalar::from(1));
        assert!(Condition::from_terms(vec![]).is_err());
        assert!(Condition::from_terms(vec![leaf.clone(), Term::And]).is_err());
        assert!(Condition::from_terms(vec![leaf.clone(), leaf]).is_err());
    }

    #[test]
    fn comparator_parsing() {
        assert_eq!("<=".parse::<Comparator>().unwrap(), Comparator::Le);
        assert_eq!("=~".parse::<Comparator>().unwrap(), Comparator::Regex);
        assert!("~~".parse::<Comparator>().is_err());
    }
}
