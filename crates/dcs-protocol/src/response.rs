use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorType;

/// A command response. Serializes to one of the three shapes on the wire;
/// which shape appears is determined entirely by the `success` field and
/// the presence of `result`/`errorType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Success {
        success: SuccessMarker,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Error {
        success: FailureMarker,
        #[serde(rename = "errorType")]
        error_type: ErrorType,
        #[serde(rename = "errorMessage")]
        error_message: String,
    },
}

/// Zero-sized marker so `{"success": true, ...}` and `{"success": false, ...}`
/// can each be matched unambiguously by `#[serde(untagged)]` without a
/// separate discriminant field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuccessMarker;
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureMarker;

impl Serialize for SuccessMarker {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bool(true)
    }
}
impl<'de> Deserialize<'de> for SuccessMarker {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if bool::deserialize(d)? {
            Ok(SuccessMarker)
        } else {
            Err(serde::de::Error::custom("expected success:true"))
        }
    }
}
impl Serialize for FailureMarker {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bool(false)
    }
}
impl<'de> Deserialize<'de> for FailureMarker {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        if bool::deserialize(d)? {
            Err(serde::de::Error::custom("expected success:false"))
        } else {
            Ok(FailureMarker)
        }
    }
}

impl Response {
    pub fn void() -> Self {
        Response::Success { success: SuccessMarker, result: None }
    }

    pub fn value(value: Value) -> Self {
        Response::Success { success: SuccessMarker, result: Some(value) }
    }

    pub fn error(error_type: ErrorType, message: impl Into<String>) -> Self {
        Response::Error { success: FailureMarker, error_type, error_message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Response::Success { .. })
    }
}
