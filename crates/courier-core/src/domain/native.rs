//! NativeError - 相手側から構造化されて届くエラー
//!
//! error 文字列が `{"NativeError": {"kind", "message", "severity"}}` の JSON として
//! 解釈できる場合だけ構造化エラーとして扱い、それ以外は不透明な文字列のままにします。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker key wrapping a structured error inside an error string.
pub const NATIVE_ERROR_MARKER: &str = "NativeError";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeError {
    pub kind: String,
    pub message: String,
    pub severity: String,
}

#[derive(Serialize, Deserialize)]
struct NativeEnvelope {
    #[serde(rename = "NativeError")]
    native: NativeError,
}

impl NativeError {
    pub fn new(
        kind: impl Into<String>,
        message: impl Into<String>,
        severity: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            severity: severity.into(),
        }
    }

    /// error 文字列を構造化エラーとして解釈する。形が合わなければ `None`。
    pub fn from_error_string(error: &str) -> Option<Self> {
        serde_json::from_str::<NativeEnvelope>(error)
            .ok()
            .map(|envelope| envelope.native)
    }

    /// ワイヤ上の error 文字列にエンコードする
    pub fn to_error_string(&self) -> String {
        let envelope = NativeEnvelope {
            native: self.clone(),
        };
        serde_json::to_string(&envelope).unwrap_or_else(|_| self.message.clone())
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}/{}] {}", self.severity, self.kind, self.message)
    }
}
