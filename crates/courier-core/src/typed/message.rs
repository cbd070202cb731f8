//! Message trait - 型とシグネチャの対応付け
//!
//! # 学習ポイント
//! - Associated Constants (`const SIGNATURE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Clone + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Message はワイヤ上のシグネチャと型を対応付ける
///
/// # 使用例
/// ```ignore
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Ping {
///     value: u32,
/// }
///
/// impl Message for Ping {
///     const SIGNATURE: &'static str = "Ping";
/// }
/// ```
///
/// # Trait Bounds
/// - `Serialize` / `DeserializeOwned`: payload との相互変換のため
/// - `Clone`: TaskHandle の結果として bind 先にも配られるため
/// - `Send + Sync + 'static`: タスクやチャネルをまたいで渡すため
pub trait Message: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// payload のキーになるシグネチャ。プロセス間で一意であること。
    const SIGNATURE: &'static str;
}
