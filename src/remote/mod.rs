// This module defines the wire-facing side of xtarget: the Transport trait through which
// every request to the remote array server passes, the RequestParams map that carries a
// request's named string or boolean parameters (serialized to JSON with serde_json the way
// the server expects its arguments), the reply decoding for execution requests, and the
// client-side PdArray handle. The server exposes a single command,
// `jit1D`, whose `request` parameter selects either a target property query or a `run1D`
// execution. Every call is synchronous: one request, one reply, no pipelining.

//! Remote array server protocol.

pub mod array;
pub mod client;
pub mod offline;

pub use array::PdArray;
pub use client::Client;
pub use offline::OfflineTransport;

use crate::core::error::TransportError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Server command handling both target queries and kernel execution.
pub const JIT_COMMAND: &str = "jit1D";

/// `request` value of an elementwise execution.
pub const RUN_1D: &str = "run1D";

/// Request/response primitive of the remote array server.
///
/// Implementations block until the reply arrives. Timeouts and reconnection
/// are the implementation's concern.
pub trait Transport: Send + Sync {
    fn call(&self, command: &str, params: &RequestParams) -> Result<String, TransportError>;
}

/// A single request parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Bool(bool),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Named parameters of one request, ordered by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RequestParams(BTreeMap<String, ParamValue>);

impl RequestParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// String value of `name`, if present and a string.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_str)
    }

    /// JSON object form sent over the wire.
    pub fn to_json(&self) -> String {
        // A map of strings and booleans always serializes.
        serde_json::to_string(&self.0).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Decoded reply to a `run1D` request that created a new array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedArray {
    pub name: String,
    /// Element type reported by the server, when the reply carries one.
    pub dtype: Option<String>,
}

#[derive(serde::Deserialize)]
struct CreatedReply {
    created: String,
    #[serde(default)]
    dtype: Option<String>,
}

/// Decode a creation reply.
///
/// Accepts the JSON form `{"created": "<name>"}` and the server's text form
/// `created <name> <dtype> <size> ...`. Returns `None` for anything else.
pub fn parse_created_reply(reply: &str) -> Option<CreatedArray> {
    let reply = reply.trim();

    if reply.starts_with('{') {
        let parsed: CreatedReply = serde_json::from_str(reply).ok()?;
        if parsed.created.trim().is_empty() {
            return None;
        }
        return Some(CreatedArray {
            name: parsed.created,
            dtype: parsed.dtype,
        });
    }

    let mut fields = reply.split_whitespace();
    if fields.next()? != "created" {
        return None;
    }
    let name = fields.next()?.to_string();
    let dtype = fields.next().map(str::to_string);
    Some(CreatedArray { name, dtype })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_params_to_json() {
        let params = RequestParams::new()
            .with("request", RUN_1D)
            .with("inplace", false);

        let json: serde_json::Value = serde_json::from_str(&params.to_json()).unwrap();
        assert_eq!(json["request"], "run1D");
        assert_eq!(json["inplace"], false);
    }

    #[test]
    fn test_parse_json_reply() {
        let created = parse_created_reply(r#"{"created": "arr42"}"#).unwrap();
        assert_eq!(created.name, "arr42");
        assert_eq!(created.dtype, None);
    }

    #[test]
    fn test_parse_text_reply() {
        let created = parse_created_reply("created id_7 float64 100 1 (100,) 8").unwrap();
        assert_eq!(created.name, "id_7");
        assert_eq!(created.dtype.as_deref(), Some("float64"));
    }

    #[test]
    fn test_malformed_replies() {
        assert_eq!(parse_created_reply(""), None);
        assert_eq!(parse_created_reply("ok"), None);
        assert_eq!(parse_created_reply("created"), None);
        assert_eq!(parse_created_reply(r#"{"created": ""}"#), None);
        assert_eq!(parse_created_reply(r#"{"name": "arr1"}"#), None);
    }
}
