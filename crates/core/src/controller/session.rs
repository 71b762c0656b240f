use crate::controller::{AnalysisController, ControllerSnapshot, Ticket};
use crate::domain::analysis::AnalysisRequest;
use crate::llm::LlmClient;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A controller shared with the client that serves it. The lock is never
/// held across the remote call.
#[derive(Clone)]
pub struct AnalysisSession {
    controller: Arc<Mutex<AnalysisController>>,
    client: Arc<dyn LlmClient>,
}

impl AnalysisSession {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self {
            controller: Arc::new(Mutex::new(AnalysisController::new())),
            client,
        }
    }

    /// Starts the request in the background. Returns false (and dispatches
    /// nothing) while another request is in flight.
    pub async fn dispatch(&self, request: AnalysisRequest) -> bool {
        let Some(ticket) = self.controller.lock().await.begin(&request) else {
            return false;
        };

        let session = self.clone();
        tokio::spawn(async move {
            session.execute(ticket, request).await;
        });
        true
    }

    /// Runs the request to completion. `None` when another request is in flight.
    pub async fn run(&self, request: AnalysisRequest) -> Option<ControllerSnapshot> {
        let ticket = self.controller.lock().await.begin(&request)?;
        self.execute(ticket, request).await;
        Some(self.snapshot().await)
    }

    pub async fn retry(&self) -> bool {
        self.controller.lock().await.retry()
    }

    pub async fn snapshot(&self) -> ControllerSnapshot {
        self.controller.lock().await.snapshot()
    }

    /// Runs `f` against the controller under the lock.
    pub async fn with_controller<R>(&self, f: impl FnOnce(&AnalysisController) -> R) -> R {
        let controller = self.controller.lock().await;
        f(&controller)
    }

    async fn execute(&self, ticket: Ticket, request: AnalysisRequest) {
        let outcome = self.client.analyze_stocks(request).await;

        let mut controller = self.controller.lock().await;
        match outcome {
            Ok(result) => {
                controller.complete(ticket, result);
            }
            Err(err) => {
                controller.fail(ticket, &err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::FALLBACK_ERROR_MESSAGE;
    use crate::domain::analysis::{
        AnalysisResult, AnalysisState, AnalysisType, BacktestStrategy,
    };
    use crate::llm::Provider;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Echoes the request back, optionally waiting for a release signal first.
    struct ScriptedClient {
        calls: AtomicUsize,
        fail_with: Option<String>,
        gate: Option<Arc<Notify>>,
    }

    impl ScriptedClient {
        fn ok() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_with: None,
                gate: None,
            }
        }
    }

    #[async_trait::async_trait]
    impl LlmClient for ScriptedClient {
        fn provider(&self) -> Provider {
            Provider::Gemini
        }

        async fn analyze_stocks(&self, request: AnalysisRequest) -> anyhow::Result<AnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if let Some(message) = &self.fail_with {
                anyhow::bail!("{message}");
            }
            Ok(AnalysisResult {
                analysis_type: request.analysis_type(),
                summary: "done".to_string(),
                stocks: vec![],
                sources: vec![],
                backtest_period: request.backtest_period().map(str::to_string),
                backtest_strategy: request.backtest_strategy(),
            })
        }
    }

    #[tokio::test]
    async fn fundamental_audit_completes() {
        let session = AnalysisSession::new(Arc::new(ScriptedClient::ok()));
        let snapshot = session.run(AnalysisRequest::fundamental()).await.unwrap();
        assert_eq!(snapshot.state, AnalysisState::Complete);
        assert_eq!(snapshot.result.unwrap().analysis_type, AnalysisType::Fundamental);
    }

    #[tokio::test]
    async fn backtest_shortcut_is_echoed() {
        let session = AnalysisSession::new(Arc::new(ScriptedClient::ok()));
        let request = AnalysisRequest::backtest(BacktestStrategy::Fundamental, "3 Years").unwrap();
        let result = session.run(request).await.unwrap().result.unwrap();
        assert_eq!(result.analysis_type, AnalysisType::Backtest);
        assert_eq!(result.backtest_period.as_deref(), Some("3 Years"));
        assert_eq!(result.backtest_strategy, Some(BacktestStrategy::Fundamental));
    }

    #[tokio::test]
    async fn empty_rejection_shows_fallback() {
        let client = ScriptedClient {
            fail_with: Some(String::new()),
            ..ScriptedClient::ok()
        };
        let session = AnalysisSession::new(Arc::new(client));
        let snapshot = session.run(AnalysisRequest::technical()).await.unwrap();
        assert_eq!(snapshot.state, AnalysisState::Error);
        assert_eq!(snapshot.error.as_deref(), Some(FALLBACK_ERROR_MESSAGE));

        assert!(session.retry().await);
        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, AnalysisState::Idle);
        assert!(snapshot.error.is_none() && snapshot.result.is_none());
    }

    #[tokio::test]
    async fn second_dispatch_while_analyzing_is_dropped() {
        let gate = Arc::new(Notify::new());
        let client = Arc::new(ScriptedClient {
            gate: Some(gate.clone()),
            ..ScriptedClient::ok()
        });
        let session = AnalysisSession::new(client.clone());

        assert!(session.dispatch(AnalysisRequest::fundamental()).await);
        assert!(!session.dispatch(AnalysisRequest::technical()).await);
        assert!(session.run(AnalysisRequest::technical()).await.is_none());
        assert_eq!(session.snapshot().await.state, AnalysisState::Analyzing);

        gate.notify_one();
        for _ in 0..100 {
            if session.snapshot().await.state != AnalysisState::Analyzing {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let snapshot = session.snapshot().await;
        assert_eq!(snapshot.state, AnalysisState::Complete);
        assert_eq!(snapshot.result.unwrap().analysis_type, AnalysisType::Fundamental);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
