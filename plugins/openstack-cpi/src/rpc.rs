//! CPI request and response envelopes

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request read from stdin
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default)]
    pub arguments: Vec<Value>,
    #[serde(default)]
    pub context: Value,
    /// CPI API version requested by the director; 1 when absent
    #[serde(default)]
    pub api_version: Option<u32>,
}

impl Request {
    pub fn api_version(&self) -> u32 {
        self.api_version.unwrap_or(1)
    }

    /// Request ID from the context, for log correlation
    pub fn request_id(&self) -> Option<&str> {
        self.context.get("request_id").and_then(Value::as_str)
    }
}

/// Error part of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub ok_to_retry: bool,
}

/// Response written to stdout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub result: Value,
    pub error: Option<ResponseError>,
    pub log: String,
}

impl Response {
    pub fn ok(result: Value) -> Self {
        Self {
            result,
            error: None,
            log: String::new(),
        }
    }

    pub fn error(error_type: &str, message: impl Into<String>, ok_to_retry: bool) -> Self {
        Self {
            result: Value::Null,
            error: Some(ResponseError {
                error_type: error_type.to_string(),
                message: message.into(),
                ok_to_retry,
            }),
            log: String::new(),
        }
    }
}
