//! ServiceBuilder - respondent 群の構築と Transport への取り付け
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 途中で失敗した登録のロールバック

use std::sync::Arc;

use crate::domain::TransportError;
use crate::ports::Transport;
use crate::task::TaskHandle;
use crate::typed::{Message, RegistryError, RespondentRegistry, Subscription, TypedRespondent};

/// ServiceBuilder は 1 つの owner の respondent をまとめて登録する
///
/// # 使用例
/// ```ignore
/// let service = ServiceBuilder::new("search")
///     .respondent::<Find, Found, _>(|find| TaskHandle::resolved(lookup(find)))?
///     .expect_requests(&[Find::SIGNATURE])
///     .attach(&transport)?;
/// ```
///
/// # Fail-fast 設計
/// - expect_requests() で答えるべきシグネチャを宣言
/// - attach() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - Transport 側で重複があれば、それまでに取り付けた分を外してからエラーを返す
pub struct ServiceBuilder {
    owner: String,
    registry: RespondentRegistry,
    expected: Option<Vec<String>>,
}

/// BuildError はサービス構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing respondents: {0:?}. These requests were expected but not registered.")]
    MissingSignatures(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ServiceBuilder {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            registry: RespondentRegistry::new(),
            expected: None,
        }
    }

    /// Respondent を登録
    pub fn respondent<Req, Resp, F>(mut self, handler: F) -> Result<Self, RegistryError>
    where
        Req: Message,
        Resp: Message,
        F: Fn(Req) -> TaskHandle<Resp> + Send + Sync + 'static,
    {
        self.registry.register(
            &self.owner,
            Arc::new(TypedRespondent::<Req, Resp, F>::new(handler)),
        )?;
        Ok(self)
    }

    /// 答えるべきシグネチャのリストを設定
    pub fn expect_requests(mut self, signatures: &[&str]) -> Self {
        self.expected = Some(signatures.iter().map(|s| s.to_string()).collect());
        self
    }

    /// 検証してから全 respondent を `transport` に登録する
    pub fn attach<T: Transport + ?Sized>(self, transport: &T) -> Result<Service, BuildError> {
        let signatures = self.registry.registered_signatures();
        if let Some(expected) = &self.expected {
            let missing: Vec<String> = expected
                .iter()
                .filter(|signature| !signatures.contains(signature))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingSignatures(missing));
            }
        }

        let mut subscriptions = Vec::with_capacity(signatures.len());
        for respondent in self.registry.into_respondents() {
            match transport.register_respondent(&self.owner, respondent) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    tracing::warn!(owner = %self.owner, error = %err, "rolling back service attach");
                    for subscription in subscriptions {
                        subscription.unsubscribe();
                    }
                    return Err(err.into());
                }
            }
        }
        tracing::info!(owner = %self.owner, ?signatures, "service attached");
        Ok(Service {
            owner: self.owner,
            signatures,
            subscriptions,
        })
    }
}

/// Service は取り付け済みの respondent 群
pub struct Service {
    owner: String,
    signatures: Vec<String>,
    subscriptions: Vec<Subscription>,
}

impl Service {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn signatures(&self) -> &[String] {
        &self.signatures
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    /// 全 respondent の登録を外す
    pub fn detach(self) {
        tracing::info!(owner = %self.owner, "service detached");
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
    }
}
