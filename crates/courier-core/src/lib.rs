//! courier-core
//!
//! Cancellable tasks and a typed request/response transport.
//!
//! # モジュール構成
//! - **task**: TaskHandle（キャンセル可能な非同期結果）と tracker / executor
//! - **queue**: 操作を 1 つずつ間隔を空けて流す SerialQueue
//! - **protocol**: ワイヤ上のパッケージとフレーム
//! - **domain**: ids, state, errors, native error
//! - **ports**: 抽象化レイヤー（Transport, Link, Clock, IdGenerator）
//! - **typed**: 型付きメッセージ API（Message trait, TransportExt, RespondentRegistry）
//! - **impls**: 実装（ChannelTransport, MemoryLink）
//! - **app**: ServiceBuilder
//! - **config** / **observability**: 設定と統計ビュー

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod protocol;
pub mod queue;
pub mod task;
pub mod typed;
