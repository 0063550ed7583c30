//! Identity handling for node bodies.
//!
//! A stored body carries its own `id` field equal to the row key. Bodies
//! that already declare the right id are stored untouched; everything else
//! gets the id merged in structurally.

use std::borrow::Cow;

use serde::Deserialize;
use serde_json::Value;

/// Reads only the `id` field; other fields are skipped without being
/// materialized.
#[derive(Deserialize)]
struct IdField {
    #[serde(default)]
    id: Option<Value>,
}

/// Read the `id` field of a JSON object body. Derived deserializers also
/// accept arrays, so anything not starting with `{` is turned away first.
fn peek_id(body: &str) -> Option<IdField> {
    if !body.trim_start().starts_with('{') {
        return None;
    }
    serde_json::from_str(body).ok()
}

/// Return `body` with `"id": identifier` set.
///
/// A body already carrying exactly this id (as a string) is returned as-is.
/// A missing, null or different id is inserted or overwritten; other fields
/// keep their order. Bodies that are not JSON objects are returned unchanged
/// and left for the store's validity check to judge.
pub fn with_identifier<'a>(body: &'a str, identifier: &str) -> Cow<'a, str> {
    if let Some(IdField {
        id: Some(Value::String(existing)),
    }) = peek_id(body)
    {
        if existing == identifier {
            return Cow::Borrowed(body);
        }
    }

    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(mut map)) => {
            map.insert("id".to_string(), Value::String(identifier.to_string()));
            Cow::Owned(Value::Object(map).to_string())
        }
        Ok(_) => {
            tracing::debug!("body for {identifier} is not a JSON object, stored as given");
            Cow::Borrowed(body)
        }
        Err(e) => {
            tracing::debug!("body for {identifier} is not valid JSON ({e}), stored as given");
            Cow::Borrowed(body)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("{}", None ; "empty object")]
    #[test_case(r#"{"id":"a"}"#, Some(json!("a")) ; "string id")]
    #[test_case(r#"{"id":7}"#, Some(json!(7)) ; "numeric id")]
    #[test_case(r#"{"id":null}"#, None ; "null id")]
    #[test_case(r#"{"inner":{"id":"deep"}}"#, None ; "nested id ignored")]
    #[test_case("[1,2]", None ; "array body")]
    #[test_case("not json", None ; "malformed body")]
    fn declared(body: &str, expected: Option<Value>) {
        assert_eq!(peek_id(body).and_then(|p| p.id), expected);
    }

    #[test]
    fn numeric_id_is_replaced_by_string() {
        assert_eq!(with_identifier(r#"{"id":7}"#, "7"), r#"{"id":"7"}"#);
    }

    #[test]
    fn injects_into_empty_object() {
        assert_eq!(with_identifier("{}", "x"), r#"{"id":"x"}"#);
    }

    #[test]
    fn matching_id_is_borrowed_byte_for_byte() {
        let body = "{ \"id\" : \"x\",\n  \"name\": \"main\" }";
        match with_identifier(body, "x") {
            Cow::Borrowed(b) => assert_eq!(b, body),
            Cow::Owned(o) => panic!("expected untouched body, got {o}"),
        }
    }

    #[test]
    fn appends_after_existing_fields() {
        let out = with_identifier(r#"{"name":"main","type":"func"}"#, "pkg.main");
        assert_eq!(out, r#"{"name":"main","type":"func","id":"pkg.main"}"#);
    }

    #[test]
    fn conflicting_id_is_overwritten_in_place() {
        let out = with_identifier(r#"{"id":"other","name":"f"}"#, "f");
        assert_eq!(out, r#"{"id":"f","name":"f"}"#);
    }

    #[test]
    fn null_id_is_replaced() {
        assert_eq!(with_identifier(r#"{"id":null}"#, "n"), r#"{"id":"n"}"#);
    }

    #[test]
    fn nested_braces_and_trailing_whitespace() {
        let out = with_identifier("{\"a\":{\"b\":\"}\"}}  \n", "k");
        let value: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["id"], "k");
        assert_eq!(value["a"]["b"], "}");
    }

    #[test_case("not json" ; "malformed")]
    #[test_case("[1,2,3]" ; "array")]
    #[test_case("\"text\"" ; "string")]
    fn non_objects_pass_through(body: &str) {
        assert_eq!(with_identifier(body, "z"), body);
    }
}
