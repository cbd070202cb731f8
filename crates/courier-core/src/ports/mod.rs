//! Ports - 抽象化レイヤー
//!
//! 外部とつながる部分（物理リンク、時刻、ID 生成）と、トランスポートの契約を
//! trait として定義します。実装は `impls` にあります。

pub mod clock;
pub mod id_generator;
pub mod link;
pub mod transport;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::link::Link;
pub use self::transport::Transport;
