//! Types related to GraphQL responses and errors.

use std::fmt;

use apollo_compiler::response::GraphQLError as CompilerError;
use heck::ToShoutySnakeCase;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map as JsonMap;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::value::ResultValue;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
/// The error location
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// Converted to (or from) JSON with serde.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from its components.
    ///
    /// Builder methods:
    ///
    /// * `.message(impl Into<`[`String`]`>)`
    ///   Required.
    ///   Sets [`Error::message`].
    ///
    /// * `.location(impl Into<`[`Location`]`>)`
    ///   Optional, may be called multiple times.
    ///   Adds one item at the end of [`Error::locations`].
    ///
    /// * `.path(impl Into<`[`Path`]`>)`
    ///   Optional.
    ///   Sets [`Error::path`].
    ///
    /// * `.extension(impl Into<`[`ByteString`]`>, impl Into<`[`Value`]`>)`
    ///   Optional, may be called multiple times.
    ///   Adds one item to the [`Error::extensions`] map.
    ///
    /// * `.build()`
    ///   Finishes the builder and returns a GraphQL [`Error`].
    #[builder(visibility = "pub")]
    fn new(
        message: String,
        locations: Vec<Location>,
        path: Option<Path>,
        // Skip the `Object` type alias in order to use buildstructor’s map special-casing
        extensions: JsonMap<ByteString, Value>,
    ) -> Self {
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl From<CompilerError> for Error {
    fn from(error: CompilerError) -> Self {
        let CompilerError {
            message,
            locations,
            extensions,
            ..
        } = error;
        let locations = locations
            .into_iter()
            .map(|location| Location {
                line: location.line as u32,
                column: location.column as u32,
            })
            .collect();
        Self {
            message,
            locations,
            path: None,
            extensions,
        }
    }
}

/// Trait used to convert expected errors into a list of GraphQL errors
pub(crate) trait IntoGraphQLErrors
where
    Self: Sized,
{
    fn into_graphql_errors(self) -> Vec<Error>;
}

/// Trait used to get extension type from an error
pub(crate) trait ErrorExtension
where
    Self: Sized,
{
    fn extension_code(&self) -> String {
        std::any::type_name::<Self>()
            .rsplit("::")
            .next()
            .unwrap_or_default()
            .to_shouty_snake_case()
    }

    fn custom_extension_details(&self) -> Option<Object> {
        None
    }

    fn to_graphql_error(&self, path: Option<Path>) -> Error
    where
        Self: fmt::Display,
    {
        let mut extensions = self.custom_extension_details().unwrap_or_default();
        extensions.insert("code", self.extension_code().into());
        Error::builder()
            .message(self.to_string())
            .and_path(path)
            .extensions(extensions)
            .build()
    }
}

/// A GraphQL response, as returned by [`Plan::execute`](crate::Plan::execute).
///
/// Serializes to the `{"data": ..., "errors": [...]}` wire shape; `errors` is omitted when
/// nothing went wrong.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Response {
    /// `None` when a failure propagated up to the root of the response.
    pub data: Option<ResultValue>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Error>,
}

#[buildstructor::buildstructor]
impl Response {
    #[builder(visibility = "pub")]
    fn new(data: Option<ResultValue>, errors: Vec<Error>) -> Self {
        Self { data, errors }
    }

    /// Converts the response into its JSON representation.
    pub fn into_json(self) -> Value {
        let mut object = Object::new();
        object.insert(
            "data",
            self.data.map(ResultValue::into_json).unwrap_or(Value::Null),
        );
        if !self.errors.is_empty() {
            object.insert(
                "errors",
                serde_json_bytes::to_value(&self.errors).unwrap_or_default(),
            );
        }
        Value::Object(object)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn error_without_path_skips_empty_fields() {
        let error = Error::builder().message("boom").build();
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({ "message": "boom" })
        );
    }

    #[test]
    fn response_omits_empty_errors() {
        let response = Response::builder().data(ResultValue::Null).build();
        assert_eq!(response.into_json(), json!({ "data": null }));
    }

    #[test]
    fn response_serializes_errors_with_path() {
        let response = Response::builder()
            .error(
                Error::builder()
                    .message("no id")
                    .path(Path::from("posts/1/id"))
                    .build(),
            )
            .build();
        insta::assert_json_snapshot!(response, @r###"
        {
          "data": null,
          "errors": [
            {
              "message": "no id",
              "path": [
                "posts",
                1,
                "id"
              ]
            }
          ]
        }
        "###);
    }
}
