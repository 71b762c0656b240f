use crate::controller::AnalysisController;
use crate::domain::analysis::{
    AnalysisRequest, AnalysisResult, AnalysisState, AnalysisType, BacktestStrategy,
};

/// Exactly one of the four page regions, projected from controller state.
#[derive(Debug, Clone, PartialEq)]
pub enum View<'a> {
    Prompt,
    Loading {
        analysis_type: AnalysisType,
        backtest_strategy: Option<BacktestStrategy>,
        backtest_period: Option<&'a str>,
    },
    Failed {
        message: &'a str,
    },
    Results(&'a AnalysisResult),
}

impl View<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            View::Prompt => "prompt",
            View::Loading { .. } => "loading",
            View::Failed { .. } => "error",
            View::Results(_) => "results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionGroup {
    Primary,
    FundamentalBacktest,
    TechnicalBacktest,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionButton {
    pub group: ActionGroup,
    pub label: String,
    pub caption: Option<&'static str>,
    pub request: AnalysisRequest,
    /// False while a request is in flight.
    pub enabled: bool,
    /// True for the action that is currently analyzing.
    pub busy: bool,
}

impl AnalysisController {
    pub fn view(&self) -> View<'_> {
        match self.state() {
            AnalysisState::Idle => View::Prompt,
            AnalysisState::Analyzing => match self.active() {
                Some(active) => View::Loading {
                    analysis_type: active.analysis_type,
                    backtest_strategy: active.backtest_strategy,
                    backtest_period: active.backtest_period.as_deref(),
                },
                None => View::Prompt,
            },
            AnalysisState::Error => View::Failed {
                message: self.error().unwrap_or(super::FALLBACK_ERROR_MESSAGE),
            },
            AnalysisState::Complete => match self.result() {
                Some(result) => View::Results(result),
                None => View::Prompt,
            },
        }
    }

    /// Two primary actions followed by the ten backtest shortcuts.
    pub fn actions(&self) -> Vec<ActionButton> {
        let enabled = !self.is_analyzing();
        let in_flight = self.active().filter(|_| self.is_analyzing());

        let primary = [
            (AnalysisRequest::fundamental(), "Find Multi-Baggers"),
            (AnalysisRequest::technical(), "Short Term Momentum"),
        ]
        .into_iter()
        .map(|(request, caption)| ActionButton {
            group: ActionGroup::Primary,
            label: request.analysis_type().label().to_string(),
            caption: Some(caption),
            busy: in_flight.is_some_and(|a| a.analysis_type == request.analysis_type()),
            request,
            enabled,
        });

        // Backtest buttons highlight per strategy row while that strategy runs.
        let backtests = AnalysisRequest::backtest_shortcuts()
            .into_iter()
            .map(|request| {
                let strategy = request.backtest_strategy();
                ActionButton {
                    group: match strategy {
                        Some(BacktestStrategy::Technical) => ActionGroup::TechnicalBacktest,
                        _ => ActionGroup::FundamentalBacktest,
                    },
                    label: request.backtest_period().unwrap_or_default().to_string(),
                    caption: None,
                    busy: in_flight.is_some_and(|a| {
                        a.analysis_type == AnalysisType::Backtest && a.backtest_strategy == strategy
                    }),
                    request,
                    enabled,
                }
            });

        primary.chain(backtests).collect()
    }
}
