//! Defensive decoding of upstream response bodies.

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Decoded upstream body. Decoding never fails: anything that is not valid JSON
/// is kept as text so callers can still surface it.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamBody {
    Json(Value),
    Text(String),
    Empty,
}

impl UpstreamBody {
    /// Decode a body using the response `Content-Type`.
    #[must_use]
    pub fn decode(headers: &HeaderMap, raw: &[u8]) -> Self {
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok());
        Self::from_parts(content_type, raw)
    }

    /// JSON is parsed when the content type says so, or when there is no content
    /// type at all. Parse failures fall back to text.
    #[must_use]
    pub fn from_parts(content_type: Option<&str>, raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Self::Empty;
        }

        let sniff_json = content_type.map_or(true, |ct| ct.to_ascii_lowercase().contains("json"));
        if sniff_json {
            if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
                return Self::Json(value);
            }
        }

        Self::Text(trimmed.to_string())
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    /// String `detail` field, the FastAPI convention for error reasons.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.string_field("detail")
    }

    /// Human-readable message: `detail` takes precedence over `message`.
    /// Plain text bodies are their own message.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Json(_) => self.detail().or_else(|| self.string_field("message")),
            Self::Text(text) => Some(text.as_str()),
            Self::Empty => None,
        }
    }

    /// Parse the JSON body into a typed schema; `None` when the shape does not match.
    #[must_use]
    pub fn parse<T: DeserializeOwned>(&self) -> Option<T> {
        self.as_json()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }

    /// Convert to a JSON value for relaying. Text is wrapped as `{"message": ..}`.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(value) => value,
            Self::Text(text) => json!({ "message": text }),
            Self::Empty => json!({}),
        }
    }

    fn string_field(&self, key: &str) -> Option<&str> {
        self.as_json()
            .and_then(|value| value.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use serde::Deserialize;

    #[test]
    fn decodes_json_by_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let body = UpstreamBody::decode(&headers, br#"{"detail":"nope"}"#);
        assert_eq!(body, UpstreamBody::Json(json!({ "detail": "nope" })));
    }

    #[test]
    fn malformed_json_falls_back_to_text() {
        let body = UpstreamBody::from_parts(Some("application/json"), b"{not json");
        assert_eq!(body, UpstreamBody::Text("{not json".to_string()));
    }

    #[test]
    fn non_json_content_type_is_text() {
        let body = UpstreamBody::from_parts(Some("text/html"), br#"{"a":1}"#);
        assert!(matches!(body, UpstreamBody::Text(_)));
    }

    #[test]
    fn missing_content_type_sniffs_json() {
        let body = UpstreamBody::from_parts(None, br#"{"a":1}"#);
        assert_eq!(body, UpstreamBody::Json(json!({ "a": 1 })));
    }

    #[test]
    fn whitespace_body_is_empty() {
        assert_eq!(
            UpstreamBody::from_parts(Some("application/json"), b"  \n"),
            UpstreamBody::Empty
        );
    }

    #[test]
    fn detail_wins_over_message() {
        let body = UpstreamBody::Json(json!({ "detail": "first", "message": "second" }));
        assert_eq!(body.message(), Some("first"));

        let body = UpstreamBody::Json(json!({ "message": "second" }));
        assert_eq!(body.message(), Some("second"));
    }

    #[test]
    fn non_string_detail_is_ignored() {
        // FastAPI validation errors carry a list in `detail`.
        let body = UpstreamBody::Json(json!({ "detail": [{"loc": ["body"]}], "message": "bad" }));
        assert_eq!(body.detail(), None);
        assert_eq!(body.message(), Some("bad"));
    }

    #[test]
    fn into_json_wraps_text() {
        assert_eq!(
            UpstreamBody::Text("oops".to_string()).into_json(),
            json!({ "message": "oops" })
        );
        assert_eq!(UpstreamBody::Empty.into_json(), json!({}));
    }

    #[test]
    fn parse_typed_schema() {
        #[derive(Deserialize)]
        struct Token {
            access_token: String,
        }
        let body = UpstreamBody::Json(json!({ "access_token": "abc", "token_type": "bearer" }));
        assert_eq!(
            body.parse::<Token>().map(|token| token.access_token),
            Some("abc".to_string())
        );
        assert!(UpstreamBody::Json(json!({ "token": 1 })).parse::<Token>().is_none());
    }
}
