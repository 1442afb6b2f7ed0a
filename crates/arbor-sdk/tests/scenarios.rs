use arbor_sdk::{path, Comparator, Condition, Connection, ObjectId, Value, ANY};
use serde_json::json;

fn doc(json: serde_json::Value) -> Value {
    Value::from(json)
}

fn create(conn: &mut Connection, json: serde_json::Value) -> ObjectId {
    conn.create(&doc(json), None).unwrap().into_id().unwrap()
}

#[test]
fn search_by_name() {
    let mut conn = Connection::in_memory().unwrap();
    let alex = create(&mut conn, json!({"name": "Alex", "phone": "1111"}));
    let _bob = create(&mut conn, json!({"name": "Bob", "phone": "2222"}));
    let alex2 = create(&mut conn, json!({"name": "Alex", "phone": "1111", "age": "22"}));

    let by_name = Condition::eq(path!["name"].unwrap(), "Alex").unwrap();
    let ids = conn.search(Some(&by_name)).unwrap().into_ids().unwrap();
    assert_eq!(ids, vec![alex, alex2]);
}

#[test]
fn insert_into_middle_of_list() {
    let mut conn = Connection::in_memory().unwrap();
    let id = create(&mut conn, json!({"tracks": ["t1", "t2", "t3"]}));
    conn.insert_many(
        id,
        &path!["tracks", 1].unwrap(),
        &[doc(json!("t4")), doc(json!("t5"))],
        false,
    )
    .unwrap();
    let tracks = conn
        .read_by_mask(id, &path!["tracks", ANY].unwrap())
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(tracks, doc(json!({"tracks": ["t1", "t4", "t5", "t2", "t3"]})));
}

#[test]
fn delete_list_element_with_nested_lists() {
    let mut conn = Connection::in_memory().unwrap();
    let id = create(
        &mut conn,
        json!({"tracks": [
            {"title": "one", "authors": ["a", "b"]},
            {"title": "two", "authors": ["c"]}
        ]}),
    );
    conn.delete(id, Some(&path!["tracks", 0].unwrap())).unwrap();
    let authors = conn
        .read_by_mask(id, &path!["tracks", ANY, "authors", ANY].unwrap())
        .unwrap()
        .into_value()
        .unwrap();
    assert_eq!(authors, doc(json!({"tracks": [{"authors": ["c"]}]})));
}

#[test]
fn insert_replaces_conflicting_list() {
    let mut conn = Connection::in_memory().unwrap();
    let id = create(&mut conn, json!({"key": [1, 2, 3]}));
    conn.insert(id, &path!["key", "key2", ANY].unwrap(), &doc(json!("val")), true)
        .unwrap();
    assert_eq!(
        conn.read(id, None).unwrap().into_value().unwrap(),
        doc(json!({"key": {"key2": ["val"]}}))
    );
}

#[test]
fn modify_nested_list_element() {
    let mut conn = Connection::in_memory().unwrap();
    let id = create(&mut conn, json!({"key": [[null], [77, null]]}));
    conn.modify(id, &path!["key", 1, 1].unwrap(), &doc(json!("aaa")), false)
        .unwrap();
    assert_eq!(
        conn.read(id, None).unwrap().into_value().unwrap(),
        doc(json!({"key": [[null], [77, "aaa"]]}))
    );
}

#[test]
fn modify_pads_new_lists_with_nulls() {
    let mut conn = Connection::in_memory().unwrap();
    let id = create(&mut conn, json!({"a": 1}));
    conn.modify(id, &path![0, 2, "k1", "k2"].unwrap(), &doc(json!(3)), true)
        .unwrap();
    assert_eq!(
        conn.read(id, Some(&path![0, 0].unwrap())).unwrap().into_value().unwrap(),
        Value::Null
    );
}

#[test]
fn regex_and_ordering_conditions() {
    let mut conn = Connection::in_memory().unwrap();
    let a = create(&mut conn, json!({"name": "Alice", "age": 31}));
    let b = create(&mut conn, json!({"name": "Bruno", "age": 17}));
    let c = create(&mut conn, json!({"name": "Alma"}));

    let starts_al = Condition::leaf(path!["name"].unwrap(), Comparator::Regex, "^Al").unwrap();
    let adult = Condition::leaf(path!["age"].unwrap(), Comparator::Ge, 18).unwrap();

    let ids = |conn: &mut Connection, cond: &Condition| {
        conn.search(Some(cond)).unwrap().into_ids().unwrap()
    };
    assert_eq!(ids(&mut conn, &starts_al), vec![a, c]);
    assert_eq!(ids(&mut conn, &starts_al.clone().and(adult.clone())), vec![a]);
    assert_eq!(ids(&mut conn, &!adult), vec![b, c]);
}
