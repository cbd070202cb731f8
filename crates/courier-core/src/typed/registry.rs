//! RespondentRegistry - respondent の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Arc による共有所有権
//!
//! シグネチャごとに respondent は 1 つだけです。登録時の owner を覚えておき、
//! 重複登録のエラーと登録解除の照合に使います。

use std::collections::HashMap;
use std::sync::Arc;

use super::respondent::DynRespondent;
use crate::domain::TransportError;

struct Registration {
    owner: String,
    respondent: Arc<dyn DynRespondent>,
}

#[derive(Default)]
pub struct RespondentRegistry {
    respondents: HashMap<String, Registration>,
}

/// RegistryError は RespondentRegistry の操作エラー
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("respondent for \"{signature}\" is already registered by {owner}")]
    AlreadyRegistered { signature: String, owner: String },
}

impl From<RegistryError> for TransportError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::AlreadyRegistered { signature, owner } => {
                TransportError::DuplicateRespondent { signature, owner }
            }
        }
    }
}

impl RespondentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        owner: &str,
        respondent: Arc<dyn DynRespondent>,
    ) -> Result<(), RegistryError> {
        let signature = respondent.signature().to_string();
        if let Some(existing) = self.respondents.get(&signature) {
            return Err(RegistryError::AlreadyRegistered {
                signature,
                owner: existing.owner.clone(),
            });
        }
        self.respondents.insert(
            signature,
            Registration {
                owner: owner.to_string(),
                respondent,
            },
        );
        Ok(())
    }

    pub fn get(&self, signature: &str) -> Option<Arc<dyn DynRespondent>> {
        self.respondents
            .get(signature)
            .map(|registration| Arc::clone(&registration.respondent))
    }

    /// Remove the registration of `signature` if `owner` made it.
    pub fn remove(&mut self, owner: &str, signature: &str) -> bool {
        match self.respondents.get(signature) {
            Some(registration) if registration.owner == owner => {
                self.respondents.remove(signature);
                true
            }
            _ => false,
        }
    }

    pub fn registered_signatures(&self) -> Vec<String> {
        let mut signatures: Vec<String> = self.respondents.keys().cloned().collect();
        signatures.sort();
        signatures
    }

    pub fn clear(&mut self) {
        self.respondents.clear();
    }

    pub fn into_respondents(self) -> Vec<Arc<dyn DynRespondent>> {
        self.respondents
            .into_values()
            .map(|registration| registration.respondent)
            .collect()
    }
}
