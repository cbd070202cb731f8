//! Errors - エラー型と分類
//!
//! - **TaskError**: TaskHandle が Rejected になるときの理由
//! - **PackageError**: envelope の構造違反（プロトコルエラー）
//! - **TransportError**: チャネル側の失敗（切断、破棄済み、重複登録など）
//! - **QueueError**: SerialQueue の操作エラー
//!
//! キャンセルはエラーではなく終端状態なので、ここには含めません。
//! （`Settlement::into_result` で `?` を使いたい場合だけ `TaskError::Cancelled` に写像します）
//!
//! TaskHandle は bind された相手に同じ結果を伝播するため、すべて `Clone` です。

use thiserror::Error;

use super::native::NativeError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// Counterpart answered with an `Error` code.
    #[error("{0}")]
    Remote(String),

    #[error("native error: {0}")]
    Native(NativeError),

    #[error(transparent)]
    Protocol(#[from] PackageError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("current task is aborting")]
    Aborting,

    #[error("task was cancelled")]
    Cancelled,

    #[error("cancellation is already delegated within this group of bound tasks")]
    DoubleDelegation,

    #[error("{0}")]
    Other(String),
}

impl TaskError {
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// ワイヤに載せる error 文字列。Native は構造を保ったままエンコードする。
    pub fn to_wire_string(&self) -> String {
        match self {
            TaskError::Native(native) => native.to_error_string(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackageError {
    #[error("unexpected package structure: sequence number is missing or invalid")]
    MissingSequence,

    #[error("payload isn't an object")]
    PayloadNotObject,

    #[error("payload has incorrect structure: expected exactly one field named by signature, found {0}")]
    PayloadShape(usize),

    #[error("error can be only a string")]
    ErrorNotString,

    #[error("payload and error cannot be defined in the scope of one package")]
    PayloadWithError,

    #[error("incorrect code for error: {0}")]
    ErrorCodeMismatch(i64),

    #[error("package with error code has no error message")]
    MissingErrorMessage,

    #[error("payload cannot be defined on aborting")]
    PayloadOnAbort,

    #[error("unknown status code: {0}")]
    InvalidCode(String),

    #[error("invalid signature format")]
    InvalidSignature,

    #[error("no payload")]
    NoPayload,

    #[error("signature mismatch: expected {expected}, got {actual}")]
    SignatureMismatch { expected: String, actual: String },

    #[error("state of package already set up; cannot apply abort")]
    AlreadySettled,

    #[error("json: {0}")]
    Json(String),
}

impl From<serde_json::Error> for PackageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is destroyed")]
    Destroyed,

    #[error("transport is disconnected")]
    Disconnected,

    #[error("respondent has been set up already for \"{signature}\"; owner: {owner}")]
    DuplicateRespondent { signature: String, owner: String },

    #[error("event name should be a non-empty string")]
    InvalidEventName,

    #[error("no respondent for \"{0}\" has been set up")]
    NoRespondent(String),

    #[error("link: {0}")]
    Link(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is destroyed; operation \"{0}\" rejected")]
    Destroyed(String),
}
