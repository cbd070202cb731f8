//! Protocol - envelope と、リンク上のフレーム
//!
//! - **Package**: シーケンス番号・ステータスコード・payload または error
//! - **Code**: `Unknown = -1`, `Done = 0`, `Error = 1`, `Aborted = 2`
//! - **Frame**: `request` / `response` / `event` のどのレーンかを示すタグ付きの本文

mod code;
mod frame;
mod package;

pub use self::code::Code;
pub use self::frame::{Channel, Frame};
pub use self::package::{
    CODE_FIELD, ERROR_FIELD, PAYLOAD_FIELD, Package, Payload, SEQUENCE_FIELD,
};
