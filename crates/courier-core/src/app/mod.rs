//! App - アプリケーション層
//!
//! typed の respondent を束ねて Transport に取り付けます。
//!
//! # 主要コンポーネント
//! - **ServiceBuilder**: respondent の登録と起動時検証
//! - **Service**: 取り付け済みの respondent 群

pub mod builder;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, Service, ServiceBuilder};
