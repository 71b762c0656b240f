use alphasense_core::install::{InstallOutcome, InstallPrompt};
use tokio::sync::{mpsc, Mutex};

/// Install prompt captured by the browser and relayed to the server.
///
/// The page keeps the real platform event; it shows the prompt itself and
/// reports the user's answer, which `user_choice` hands back to the slot.
#[derive(Debug)]
pub struct RelayedInstallPrompt {
    tx: mpsc::UnboundedSender<InstallOutcome>,
    rx: Mutex<mpsc::UnboundedReceiver<InstallOutcome>>,
}

impl RelayedInstallPrompt {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    pub fn deliver(&self, outcome: InstallOutcome) {
        // The receiver lives as long as `self`, so this cannot fail.
        let _ = self.tx.send(outcome);
    }
}

impl Default for RelayedInstallPrompt {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InstallPrompt for RelayedInstallPrompt {
    fn prompt(&self) {
        tracing::debug!("install prompt shown by the browser");
    }

    async fn user_choice(&self) -> InstallOutcome {
        self.rx
            .lock()
            .await
            .recv()
            .await
            .unwrap_or(InstallOutcome::Dismissed)
    }
}
