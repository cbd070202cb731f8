//! Package - ワイヤ上の envelope
//!
//! ```text
//! { "seq": <u64>, "code": <-1|0|1|2>, "payload"?: { "<Signature>": <body> }, "error"?: <string> }
//! ```
//!
//! # 不変条件
//! - payload と error は同時に持てない
//! - `Aborted` はどちらも持たない
//! - `Error` は空でない error 文字列を持つ
//! - payload はシグネチャ 1 つだけをキーに持つオブジェクト
//!
//! `from_packed` は違反を `PackageError` として返します。panic はしません。

use serde_json::{Map, Value};

use super::code::Code;
use crate::domain::{NativeError, PackageError, TaskError};
use crate::typed::Message;

pub const SEQUENCE_FIELD: &str = "seq";
pub const CODE_FIELD: &str = "code";
pub const PAYLOAD_FIELD: &str = "payload";
pub const ERROR_FIELD: &str = "error";

/// Signature-keyed message body.
#[derive(Debug, Clone, PartialEq)]
pub struct Payload {
    signature: String,
    body: Value,
}

impl Payload {
    pub fn new(signature: impl Into<String>, body: Value) -> Result<Self, PackageError> {
        let signature = signature.into();
        if signature.trim().is_empty() {
            return Err(PackageError::InvalidSignature);
        }
        Ok(Self { signature, body })
    }

    pub fn of<M: Message>(message: &M) -> Result<Self, PackageError> {
        Self::new(M::SIGNATURE, serde_json::to_value(message)?)
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    /// Decode into `M`, checking that the signature matches.
    pub fn decode<M: Message>(&self) -> Result<M, PackageError> {
        if self.signature != M::SIGNATURE {
            return Err(PackageError::SignatureMismatch {
                expected: M::SIGNATURE.to_string(),
                actual: self.signature.clone(),
            });
        }
        Ok(serde_json::from_value(self.body.clone())?)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    sequence: u64,
    code: Code,
    payload: Option<Payload>,
    error: Option<String>,
}

impl Package {
    pub fn new(sequence: u64) -> Self {
        Self {
            sequence,
            code: Code::Unknown,
            payload: None,
            error: None,
        }
    }

    /// `Aborted` package for `sequence`.
    pub fn aborting(sequence: u64) -> Self {
        Self {
            code: Code::Aborted,
            ..Self::new(sequence)
        }
    }

    /// Mark as done with `payload`, replacing any error.
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self.error = None;
        self.code = Code::Done;
        self
    }

    /// Mark as failed with `error`. Fails on an empty message or once a payload is set.
    pub fn with_error(mut self, error: impl Into<String>) -> Result<Self, PackageError> {
        let error = error.into();
        if error.is_empty() {
            return Err(PackageError::MissingErrorMessage);
        }
        if self.payload.is_some() {
            return Err(PackageError::PayloadWithError);
        }
        self.error = Some(error);
        self.code = Code::Error;
        Ok(self)
    }

    /// Mark as aborted. Fails once a payload or error is set.
    pub fn aborted(mut self) -> Result<Self, PackageError> {
        if self.payload.is_some() || self.error.is_some() {
            return Err(PackageError::AlreadySettled);
        }
        self.code = Code::Aborted;
        Ok(self)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn into_payload(self) -> Option<Payload> {
        self.payload
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_aborted(&self) -> bool {
        self.code == Code::Aborted
    }

    pub fn signature(&self) -> Result<&str, PackageError> {
        self.payload
            .as_ref()
            .map(Payload::signature)
            .ok_or(PackageError::NoPayload)
    }

    pub fn decode<M: Message>(&self) -> Result<M, PackageError> {
        self.payload
            .as_ref()
            .ok_or(PackageError::NoPayload)?
            .decode::<M>()
    }

    /// The error string as a task error, structured when it carries a native error.
    pub fn remote_error(&self) -> Option<TaskError> {
        let error = self.error.as_deref()?;
        Some(match NativeError::from_error_string(error) {
            Some(native) => TaskError::Native(native),
            None => TaskError::Remote(error.to_string()),
        })
    }

    pub fn pack(&self) -> Value {
        let mut packed = Map::new();
        packed.insert(SEQUENCE_FIELD.to_string(), Value::from(self.sequence));
        packed.insert(CODE_FIELD.to_string(), Value::from(self.code.as_i64()));
        if let Some(payload) = &self.payload {
            let mut keyed = Map::new();
            keyed.insert(payload.signature.clone(), payload.body.clone());
            packed.insert(PAYLOAD_FIELD.to_string(), Value::Object(keyed));
        }
        if let Some(error) = &self.error {
            packed.insert(ERROR_FIELD.to_string(), Value::String(error.clone()));
        }
        Value::Object(packed)
    }

    pub fn from_packed(packed: &Value) -> Result<Self, PackageError> {
        let obj = packed.as_object().ok_or(PackageError::MissingSequence)?;
        let sequence = obj
            .get(SEQUENCE_FIELD)
            .and_then(Value::as_u64)
            .ok_or(PackageError::MissingSequence)?;
        let code = match obj.get(CODE_FIELD) {
            None => Code::Unknown,
            Some(raw) => {
                let raw = raw
                    .as_i64()
                    .ok_or_else(|| PackageError::InvalidCode(raw.to_string()))?;
                Code::try_from(raw)?
            }
        };

        let payload = match obj.get(PAYLOAD_FIELD) {
            None => None,
            Some(Value::Object(keyed)) => {
                if keyed.len() != 1 {
                    return Err(PackageError::PayloadShape(keyed.len()));
                }
                keyed.iter().next()
            }
            Some(_) => return Err(PackageError::PayloadNotObject),
        };
        let error = match obj.get(ERROR_FIELD) {
            None => None,
            Some(Value::String(error)) => Some(error.clone()),
            Some(_) => return Err(PackageError::ErrorNotString),
        };
        if payload.is_some() && error.is_some() {
            return Err(PackageError::PayloadWithError);
        }
        if error.is_some() && code != Code::Error {
            return Err(PackageError::ErrorCodeMismatch(code.as_i64()));
        }
        if payload.is_some() && code == Code::Aborted {
            return Err(PackageError::PayloadOnAbort);
        }
        if code == Code::Error && error.as_deref().is_none_or(str::is_empty) {
            return Err(PackageError::MissingErrorMessage);
        }

        let payload = payload
            .map(|(signature, body)| Payload::new(signature.clone(), body.clone()))
            .transpose()?;
        Ok(Self {
            sequence,
            code,
            payload,
            error,
        })
    }

    /// Best-effort sequence of a packed value that failed validation.
    pub fn peek_sequence(packed: &Value) -> Option<u64> {
        packed.get(SEQUENCE_FIELD).and_then(Value::as_u64)
    }
}
