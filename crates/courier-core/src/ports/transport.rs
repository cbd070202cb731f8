//! Transport port - 双方向チャネルの抽象化
//!
//! シグネチャ付き payload の単位でやり取りします。型付きの API は
//! `typed::TransportExt` がこの trait の上に被せます。
//!
//! # Object Safety
//! - メソッドはジェネリックではないので `Arc<dyn Transport>` として渡せる
//! - 実装は 1 本の物理チャネルでシーケンス番号により多数の要求を多重化する

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;

use crate::domain::TransportError;
use crate::protocol::{Package, Payload};
use crate::task::TaskHandle;
use crate::typed::{DynRespondent, Subscription};

pub trait Transport: Send + Sync {
    /// Send a request; the handle resolves with the `Done` reply package.
    ///
    /// An `Error` reply rejects the handle and an `Aborted` reply cancels it.
    /// Aborting the handle asks the counterpart to abort as well.
    fn request_payload(&self, payload: Payload) -> TaskHandle<Package>;

    /// Register the handler of one request signature.
    fn register_respondent(
        &self,
        owner: &str,
        respondent: Arc<dyn DynRespondent>,
    ) -> Result<Subscription, TransportError>;

    /// One-way event; no reply is expected.
    fn notify_payload(&self, payload: Payload) -> Result<(), TransportError>;

    /// Raw event bodies of one signature.
    fn subscribe_signature(
        &self,
        signature: &str,
    ) -> Result<broadcast::Receiver<Value>, TransportError>;

    /// Reject pending requests and release every registration.
    fn destroy(&self);
}
