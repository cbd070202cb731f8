//! TransportExt - Transport の型付き表層
//!
//! # 二層構造
//! - **表層（Typed）**: `request::<Req, Resp>`, `respondent`, `notify`, `subscribe` - 型安全
//! - **内部（Dyn）**: `Transport` trait - object-safe, シグネチャ付き payload
//!
//! blanket impl なので `Arc<dyn Transport>` からもそのまま呼べます。

use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use super::message::Message;
use super::respondent::TypedRespondent;
use super::subscription::Subscription;
use crate::domain::{TaskError, TransportError};
use crate::ports::Transport;
use crate::protocol::Payload;
use crate::task::TaskHandle;

pub trait TransportExt: Transport {
    /// Send `request` and decode the reply as `Resp`.
    ///
    /// Aborting the returned handle aborts the request.
    fn request<Req, Resp>(&self, request: &Req) -> TaskHandle<Resp>
    where
        Req: Message,
        Resp: Message,
    {
        let payload = match Payload::of(request) {
            Ok(payload) => payload,
            Err(err) => return TaskHandle::rejected(err.into()),
        };
        self.request_payload(payload)
            .map(|reply| reply.decode::<Resp>().map_err(TaskError::from))
    }

    /// Answer every `Req` with the handle returned by `handler`.
    fn respondent<Req, Resp, F>(&self, owner: &str, handler: F) -> Result<Subscription, TransportError>
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req) -> TaskHandle<Resp> + Send + Sync + 'static,
    {
        self.register_respondent(owner, Arc::new(TypedRespondent::<Req, Resp, F>::new(handler)))
    }

    fn notify<E: Message>(&self, event: &E) -> Result<(), TaskError> {
        self.notify_payload(Payload::of(event)?)?;
        Ok(())
    }

    fn subscribe<E: Message>(&self) -> Result<EventStream<E>, TransportError> {
        Ok(EventStream::new(self.subscribe_signature(E::SIGNATURE)?))
    }
}

impl<T: Transport + ?Sized> TransportExt for T {}

/// Decoded events of one signature.
pub struct EventStream<E> {
    receiver: broadcast::Receiver<Value>,
    _marker: PhantomData<fn() -> E>,
}

impl<E: Message> EventStream<E> {
    pub fn new(receiver: broadcast::Receiver<Value>) -> Self {
        Self {
            receiver,
            _marker: PhantomData,
        }
    }

    /// Next event, `None` once the transport dropped the subscription.
    ///
    /// Undecodable events and events lost to lagging are logged and skipped.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.receiver.recv().await {
                Ok(body) => match serde_json::from_value::<E>(body) {
                    Ok(event) => return Some(event),
                    Err(err) => {
                        tracing::warn!(signature = E::SIGNATURE, error = %err, "dropping undecodable event");
                    }
                },
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(signature = E::SIGNATURE, skipped, "event subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Tick {
        n: u32,
    }

    impl Message for Tick {
        const SIGNATURE: &'static str = "Tick";
    }

    #[tokio::test]
    async fn event_stream_skips_undecodable_bodies() {
        let (tx, rx) = broadcast::channel(8);
        let mut stream: EventStream<Tick> = EventStream::new(rx);
        tx.send(json!({ "n": "bad" })).unwrap();
        tx.send(json!({ "n": 2 })).unwrap();
        drop(tx);

        assert_eq!(stream.recv().await, Some(Tick { n: 2 }));
        assert_eq!(stream.recv().await, None);
    }

    #[tokio::test]
    async fn event_stream_survives_lagging() {
        let (tx, rx) = broadcast::channel(2);
        let mut stream: EventStream<Tick> = EventStream::new(rx);
        for n in 0..5 {
            tx.send(json!({ "n": n })).unwrap();
        }
        assert_eq!(stream.recv().await, Some(Tick { n: 3 }));
        assert_eq!(stream.recv().await, Some(Tick { n: 4 }));
    }
}
