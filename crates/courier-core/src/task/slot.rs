//! DelegationSlot - bind されたタスク群で共有する「キャンセルの委譲先」
//!
//! bind で繋がった連結成分ごとに slot は 1 つだけで、各 TaskHandle は同じ
//! `Arc<DelegationSlot>` を指します。委譲先は slot に 1 つしか入らないので、
//! 「委譲は最大 1 つ」という不変条件は構造で保証されます。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::TaskError;

/// Forwarded cancellation. `Fn` because a withdrawn cancellation can be requested again.
pub type Delegation<C> = Arc<dyn Fn(Option<C>) + Send + Sync>;

pub(crate) struct DelegationSlot<C> {
    delegation: Mutex<Option<Delegation<C>>>,
}

impl<C> DelegationSlot<C> {
    pub(crate) fn new() -> Self {
        Self {
            delegation: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Delegation<C>>> {
        self.delegation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn current(&self) -> Option<Delegation<C>> {
        self.lock().clone()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn install(&self, delegation: Delegation<C>) -> Result<(), TaskError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(TaskError::DoubleDelegation);
        }
        *slot = Some(delegation);
        Ok(())
    }

    pub(crate) fn clear(&self) -> Option<Delegation<C>> {
        self.lock().take()
    }
}
