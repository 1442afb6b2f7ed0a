//! Lowering of search conditions into relational set operations.

use arbor_engine::{Engine, SqlValue};
use arbor_types::{Comparator, Condition, Connective, Path, Scalar};

use crate::error::StructureResult;
use crate::{Structure, SPEC_TABLE};

impl<'e, E: Engine + ?Sized> Structure<'e, E> {
    /// Build a query returning the sorted IDs of the objects satisfying
    /// `condition`, or of every object when there is none.
    ///
    /// The condition is normalized first, so inversion only ever applies to
    /// single leaves. `AND` lowers to `INTERSECT`, `OR` to `UNION`, and an
    /// inverted leaf to the set of all objects `EXCEPT` the positive leaf.
    pub fn build_query(
        &self,
        condition: Option<&Condition>,
    ) -> StructureResult<(String, Vec<SqlValue>)> {
        let Some(condition) = condition else {
            return Ok((
                format!("SELECT DISTINCT id FROM {SPEC_TABLE} ORDER BY id"),
                Vec::new(),
            ));
        };
        let normalized = condition.clone().normalize();
        let mut params = Vec::new();
        let body = self.lower(&normalized, &mut params)?;
        Ok((format!("SELECT id FROM ({body}) ORDER BY id"), params))
    }

    fn lower(&self, condition: &Condition, params: &mut Vec<SqlValue>) -> StructureResult<String> {
        match condition {
            Condition::Leaf {
                invert,
                path,
                op,
                value,
            } => {
                let positive = self.lower_leaf(path, *op, value, params)?;
                // Complement over all objects, so objects without any field
                // at `path` also match. Equivalent to the negated comparison
                // unioned with the objects missing the field.
                Ok(if *invert {
                    format!(
                        "SELECT id FROM (SELECT DISTINCT id FROM {SPEC_TABLE}) \
                         EXCEPT SELECT id FROM ({positive})"
                    )
                } else {
                    positive
                })
            }
            Condition::Node {
                invert,
                op,
                left,
                right,
            } => {
                if *invert {
                    return self.lower(&condition.clone().normalize(), params);
                }
                let left = self.lower(left, params)?;
                let right = self.lower(right, params)?;
                let set_op = match op {
                    Connective::And => "INTERSECT",
                    Connective::Or => "UNION",
                };
                Ok(format!("SELECT id FROM ({left}) {set_op} SELECT id FROM ({right})"))
            }
        }
    }

    fn lower_leaf(
        &self,
        path: &Path,
        op: Comparator,
        value: &Scalar,
        params: &mut Vec<SqlValue>,
    ) -> StructureResult<String> {
        let tag = value.type_tag();
        let name = path.table_name(tag);
        if !self.engine.table_exists(&name)? {
            return Ok(self.engine.empty_set_query().to_string());
        }

        let mut clauses = Vec::new();
        // Null and pointer leaves test presence only.
        if tag.has_value_column() && !tag.is_pointer() {
            let sql_op = match op {
                Comparator::Eq => "=",
                Comparator::Regex => self.engine.regexp_operator(),
                Comparator::Lt => "<",
                Comparator::Le => "<=",
                Comparator::Gt => ">",
                Comparator::Ge => ">=",
            };
            params.push(SqlValue::from(value));
            clauses.push(format!("value {sql_op} ?{}", params.len()));
        }
        let columns = path.column_condition();
        if !columns.is_empty() {
            clauses.push(columns);
        }

        let mut sql = format!(
            "SELECT DISTINCT id FROM {}",
            self.engine.quote_identifier(&name)
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_engine::SqliteEngine;
    use arbor_types::{path, Field, ObjectId, TypeTag, ANY};

    fn seeded() -> SqliteEngine {
        let engine = SqliteEngine::open_in_memory().unwrap();
        let s = Structure::new(&engine);
        s.initialize().unwrap();
        let rows = [
            (1, Field::new(path!["name"].unwrap(), "Alex")),
            (1, Field::new(path!["age"].unwrap(), 30)),
            (2, Field::new(path!["name"].unwrap(), "Bob")),
            (3, Field::new(path!["name"].unwrap(), "Alex")),
            (3, Field::new(path!["tags", 0].unwrap(), "x")),
            (3, Field::new(path!["tags", 1].unwrap(), "y")),
        ];
        for (raw, field) in rows {
            let id = ObjectId::new(raw);
            let tag = field.type_tag();
            s.assure_field_table(&field.path, tag).unwrap();
            let new_type = !s.value_types(id, &field.path).unwrap().contains(&tag);
            s.increase_refcount(id, &field.path, tag, new_type).unwrap();
            s.add_value_record(id, &field).unwrap();
        }
        engine
    }

    fn run(engine: &SqliteEngine, condition: Option<&Condition>) -> Vec<i64> {
        let (sql, params) = Structure::new(engine).build_query(condition).unwrap();
        engine
            .query(&sql, &params)
            .unwrap()
            .iter()
            .map(|row| row[0].as_i64().unwrap())
            .collect()
    }

    fn name_is(v: &str) -> Condition {
        Condition::eq(path!["name"].unwrap(), v).unwrap()
    }

    #[test]
    fn equality_and_connectives() {
        let engine = seeded();
        assert_eq!(run(&engine, Some(&name_is("Alex"))), vec![1, 3]);
        assert_eq!(run(&engine, Some(&name_is("Alex").or(name_is("Bob")))), vec![1, 2, 3]);
        let adult = Condition::leaf(path!["age"].unwrap(), Comparator::Ge, 18).unwrap();
        assert_eq!(run(&engine, Some(&name_is("Alex").and(adult))), vec![1]);
    }

    #[test]
    fn inversion_is_exact_complement() {
        let engine = seeded();
        let adult = Condition::leaf(path!["age"].unwrap(), Comparator::Ge, 18).unwrap();
        assert_eq!(run(&engine, Some(&!adult)), vec![2, 3]);
        assert_eq!(run(&engine, Some(&!name_is("Alex"))), vec![2]);
    }

    #[test]
    fn masks_and_regex() {
        let engine = seeded();
        let tag_y = Condition::eq(path!["tags", ANY].unwrap(), "y").unwrap();
        assert_eq!(run(&engine, Some(&tag_y)), vec![3]);
        let first_y = Condition::eq(path!["tags", 0].unwrap(), "y").unwrap();
        assert!(run(&engine, Some(&first_y)).is_empty());
        let starts_a = Condition::leaf(path!["name"].unwrap(), Comparator::Regex, "^A").unwrap();
        assert_eq!(run(&engine, Some(&starts_a)), vec![1, 3]);
    }

    #[test]
    fn missing_table_is_empty_set() {
        let engine = seeded();
        let nothing = Condition::eq(path!["missing"].unwrap(), 1).unwrap();
        assert!(run(&engine, Some(&nothing)).is_empty());
        assert_eq!(run(&engine, Some(&!nothing)), vec![1, 2, 3]);
    }

    #[test]
    fn presence_leaves_and_no_condition() {
        let engine = seeded();
        assert_eq!(run(&engine, None), vec![1, 2, 3]);
        let s = Structure::new(&engine);
        let p = path!["flag"].unwrap();
        s.assure_field_table(&p, TypeTag::Null).unwrap();
        s.increase_refcount(ObjectId::new(2), &p, TypeTag::Null, true)
            .unwrap();
        s.add_value_record(ObjectId::new(2), &Field::new(p.clone(), Scalar::Null))
            .unwrap();
        let has_flag = Condition::eq(p, Scalar::Null).unwrap();
        assert_eq!(run(&engine, Some(&has_flag)), vec![2]);
    }
}
