//! Typed - 型付きメッセージ API
//!
//! シグネチャの typo を型で排除し、要求・応答・イベントの型と
//! ワイヤ上のシグネチャの対応を静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Message` trait, `TransportExt`, `EventStream` - 型安全
//! - **内部（Dyn）**: `DynRespondent` trait - object-safe, type erasure

pub mod facade;
pub mod message;
pub mod registry;
pub mod respondent;
pub mod subscription;

// 主要な trait/型 を再エクスポート
pub use self::facade::{EventStream, TransportExt};
pub use self::message::Message;
pub use self::registry::{RegistryError, RespondentRegistry};
pub use self::respondent::{DynRespondent, TypedRespondent};
pub use self::subscription::Subscription;
