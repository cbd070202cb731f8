//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **MemoryLink**: プロセス内の Link（開発・テスト用）
//! - **ChannelTransport**: 任意の Link の上で動く Transport
//!
//! ソケットやプロセス間パイプの Link は `ports::Link` を実装すれば
//! ChannelTransport にそのまま載せられます。

pub mod channel_transport;
pub mod memory_link;

// 主要な型を再エクスポート
pub use self::channel_transport::{ChannelTransport, Emulation};
pub use self::memory_link::MemoryLink;
