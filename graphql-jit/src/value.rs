//! The tagged value assembled while executing a plan.

use indexmap::IndexMap;
use serde::Serialize;
use serde::Serializer;
use serde::ser::SerializeMap;
use serde::ser::SerializeSeq;

use crate::json_ext::ByteString;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A node of the result tree.
///
/// Result values are built bottom-up by the execution engine and are never
/// mutated once a parent holds them.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResultValue {
    #[default]
    Null,
    /// A leaf value, already coerced for its GraphQL type.
    Scalar(Value),
    List(Vec<ResultValue>),
    /// Keys are response keys, in selection order.
    Object(IndexMap<ByteString, ResultValue>),
}

impl ResultValue {
    pub fn is_null(&self) -> bool {
        matches!(self, ResultValue::Null)
    }

    pub fn as_object(&self) -> Option<&IndexMap<ByteString, ResultValue>> {
        match self {
            ResultValue::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Looks up a response key on an object value.
    pub fn get(&self, key: &str) -> Option<&ResultValue> {
        self.as_object().and_then(|object| object.get(key))
    }

    /// Converts the tree into a wire JSON value.
    pub fn into_json(self) -> Value {
        match self {
            ResultValue::Null => Value::Null,
            ResultValue::Scalar(value) => value,
            ResultValue::List(items) => {
                Value::Array(items.into_iter().map(ResultValue::into_json).collect())
            }
            ResultValue::Object(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, value.into_json()))
                    .collect::<Object>(),
            ),
        }
    }
}

impl From<ResultValue> for Value {
    fn from(value: ResultValue) -> Self {
        value.into_json()
    }
}

impl Serialize for ResultValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ResultValue::Null => serializer.serialize_unit(),
            ResultValue::Scalar(value) => value.serialize(serializer),
            ResultValue::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            ResultValue::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key.as_str(), value)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn sample() -> ResultValue {
        let mut post = IndexMap::new();
        post.insert(ByteString::from("id"), ResultValue::Scalar(json!("p1")));
        post.insert(ByteString::from("title"), ResultValue::Null);
        let mut root = IndexMap::new();
        root.insert(
            ByteString::from("posts"),
            ResultValue::List(vec![ResultValue::Object(post), ResultValue::Null]),
        );
        ResultValue::Object(root)
    }

    #[test]
    fn converts_to_json() {
        assert_eq!(
            sample().into_json(),
            json!({ "posts": [{ "id": "p1", "title": null }, null] })
        );
    }

    #[test]
    fn serializes_in_key_order() {
        assert_eq!(
            serde_json::to_string(&sample()).unwrap(),
            r#"{"posts":[{"id":"p1","title":null},null]}"#
        );
    }
}
