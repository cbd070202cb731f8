//! Respondent - 要求に答えるハンドラ
//!
//! # 学習ポイント
//! - Object-safe trait (DynRespondent)
//! - Type erasure パターン (TypedRespondent<Req, Resp, F> → DynRespondent)

use std::marker::PhantomData;

use super::message::Message;
use crate::domain::TaskError;
use crate::protocol::Payload;
use crate::task::TaskHandle;

/// DynRespondent は object-safe な respondent の抽象化
///
/// トランスポートは `Arc<dyn DynRespondent>` をシグネチャごとに保持します。
/// 返された TaskHandle の結果がそのまま応答パッケージになります。
pub trait DynRespondent: Send + Sync {
    fn signature(&self) -> &str;

    fn respond_dyn(&self, request: &Payload) -> TaskHandle<Payload>;
}

/// `Fn(Req) -> TaskHandle<Resp>` を DynRespondent に変換するラッパー
pub struct TypedRespondent<Req, Resp, F> {
    handler: F,
    _marker: PhantomData<fn(Req) -> Resp>,
}

impl<Req, Resp, F> TypedRespondent<Req, Resp, F>
where
    Req: Message,
    Resp: Message,
    F: Fn(Req) -> TaskHandle<Resp> + Send + Sync + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

impl<Req, Resp, F> DynRespondent for TypedRespondent<Req, Resp, F>
where
    Req: Message,
    Resp: Message,
    F: Fn(Req) -> TaskHandle<Resp> + Send + Sync + 'static,
{
    fn signature(&self) -> &str {
        Req::SIGNATURE
    }

    fn respond_dyn(&self, request: &Payload) -> TaskHandle<Payload> {
        let request = match request.decode::<Req>() {
            Ok(request) => request,
            Err(err) => return TaskHandle::rejected(err.into()),
        };
        (self.handler)(request).map(|response| Payload::of(response).map_err(TaskError::from))
    }
}
