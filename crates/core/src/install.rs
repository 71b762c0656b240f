//! Deferred "install app" prompt.
//!
//! The platform announces once that the app is installable. That signal is
//! captured into an [`InstallPromptSlot`] for the lifetime of the process and
//! re-issued when the user asks for it. The slot is cleared only when the user
//! accepts; a dismissed prompt stays available.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstallOutcome {
    Accepted,
    Dismissed,
}

#[async_trait::async_trait]
pub trait InstallPrompt: Send + Sync {
    /// Shows the platform install prompt.
    fn prompt(&self);

    /// Resolves once the user has answered the prompt.
    async fn user_choice(&self) -> InstallOutcome;
}

#[derive(Debug)]
pub struct InstallPromptSlot<P> {
    captured: Mutex<Option<Arc<P>>>,
}

impl<P> Default for InstallPromptSlot<P> {
    fn default() -> Self {
        Self {
            captured: Mutex::new(None),
        }
    }
}

impl<P: InstallPrompt> InstallPromptSlot<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the prompt, replacing any earlier capture.
    pub fn capture(&self, prompt: P) -> Arc<P> {
        let prompt = Arc::new(prompt);
        *self.lock() = Some(prompt.clone());
        tracing::debug!("install prompt captured");
        prompt
    }

    pub fn is_available(&self) -> bool {
        self.lock().is_some()
    }

    pub fn current(&self) -> Option<Arc<P>> {
        self.lock().clone()
    }

    /// Re-issues the captured prompt and waits for the answer. `None` when
    /// nothing has been captured.
    pub async fn request_install(&self) -> Option<InstallOutcome> {
        let prompt = self.current()?;
        prompt.prompt();
        let outcome = prompt.user_choice().await;

        if outcome == InstallOutcome::Accepted {
            let mut captured = self.lock();
            // Only clear if no newer prompt replaced this one meanwhile.
            if captured.as_ref().is_some_and(|c| Arc::ptr_eq(c, &prompt)) {
                *captured = None;
            }
        }
        tracing::info!(?outcome, "install prompt answered");
        Some(outcome)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Arc<P>>> {
        self.captured.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedPrompt {
        outcome: InstallOutcome,
        shown: AtomicUsize,
    }

    impl FixedPrompt {
        fn new(outcome: InstallOutcome) -> Self {
            Self {
                outcome,
                shown: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl InstallPrompt for FixedPrompt {
        fn prompt(&self) {
            self.shown.fetch_add(1, Ordering::SeqCst);
        }

        async fn user_choice(&self) -> InstallOutcome {
            self.outcome
        }
    }

    #[tokio::test]
    async fn empty_slot_does_nothing() {
        let slot = InstallPromptSlot::<FixedPrompt>::new();
        assert!(!slot.is_available());
        assert_eq!(slot.request_install().await, None);
    }

    #[tokio::test]
    async fn accepted_prompt_is_consumed() {
        let slot = InstallPromptSlot::new();
        let prompt = slot.capture(FixedPrompt::new(InstallOutcome::Accepted));
        assert!(slot.is_available());

        assert_eq!(slot.request_install().await, Some(InstallOutcome::Accepted));
        assert_eq!(prompt.shown.load(Ordering::SeqCst), 1);
        assert!(!slot.is_available());
    }

    #[tokio::test]
    async fn dismissed_prompt_stays_available() {
        let slot = InstallPromptSlot::new();
        let prompt = slot.capture(FixedPrompt::new(InstallOutcome::Dismissed));

        assert_eq!(slot.request_install().await, Some(InstallOutcome::Dismissed));
        assert_eq!(slot.request_install().await, Some(InstallOutcome::Dismissed));
        assert_eq!(prompt.shown.load(Ordering::SeqCst), 2);
        assert!(slot.is_available());
    }
}
