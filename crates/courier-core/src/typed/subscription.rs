use std::fmt;

/// Handle of a registration; `unsubscribe` removes it.
///
/// Dropping the subscription keeps the registration alive.
pub struct Subscription {
    id: String,
    unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new<F>(id: impl Into<String>, unsubscribe: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            id: id.into(),
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// `"{owner}:{signature}"` for respondents.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn unsubscribe_runs_the_callback() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let subscription = Subscription::new("owner:Ping", move || flag.store(true, Ordering::SeqCst));
        assert_eq!(subscription.id(), "owner:Ping");

        subscription.unsubscribe();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_keeps_the_registration() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        drop(Subscription::new("owner:Ping", move || flag.store(true, Ordering::SeqCst)));
        assert!(!called.load(Ordering::SeqCst));
    }
}
