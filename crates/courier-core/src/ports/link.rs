//! Link port - 物理的な双方向リンク
//!
//! フレームを送って、相手からのフレームを受け取るだけの最小限の抽象です。
//! ソケットやプロセス間パイプなどの実装はこの trait を満たせばよい。

use async_trait::async_trait;

use crate::domain::TransportError;
use crate::protocol::Frame;

#[async_trait]
pub trait Link: Send + Sync {
    /// Queue a frame for the peer without waiting.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Next frame from the peer, `None` once the peer is gone.
    async fn recv(&self) -> Option<Frame>;

    /// Stop sending. The peer observes the link as closed.
    fn close(&self);
}
