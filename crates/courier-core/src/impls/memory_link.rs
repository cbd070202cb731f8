//! MemoryLink - プロセス内の Link 実装
//!
//! tokio の unbounded mpsc を 2 本交差させたものです。
//! 開発・テスト・デモ用で、フレームはシリアライズせずに渡します。

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::TransportError;
use crate::ports::Link;
use crate::protocol::Frame;

pub struct MemoryLink {
    tx: Mutex<Option<mpsc::UnboundedSender<Frame>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Frame>>,
}

impl MemoryLink {
    /// Two connected ends.
    pub fn pair() -> (Self, Self) {
        let (left_tx, right_rx) = mpsc::unbounded_channel();
        let (right_tx, left_rx) = mpsc::unbounded_channel();
        (Self::new(left_tx, left_rx), Self::new(right_tx, right_rx))
    }

    fn new(tx: mpsc::UnboundedSender<Frame>, rx: mpsc::UnboundedReceiver<Frame>) -> Self {
        Self {
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
        }
    }
}

#[async_trait]
impl Link for MemoryLink {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        match tx.as_ref() {
            Some(tx) => tx.send(frame).map_err(|_| TransportError::Disconnected),
            None => Err(TransportError::Link("link is closed".to_string())),
        }
    }

    async fn recv(&self) -> Option<Frame> {
        self.rx.lock().await.recv().await
    }

    fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}
