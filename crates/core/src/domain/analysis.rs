use anyhow::{bail, ensure};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FUNDAMENTAL_PERIODS: [&str; 5] = ["3 Years", "5 Years", "10 Years", "15 Years", "20 Years"];
pub const TECHNICAL_PERIODS: [&str; 5] = ["2 Weeks", "4 Weeks", "6 Weeks", "3 Months", "6 Months"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisType {
    Fundamental,
    Technical,
    Backtest,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::Fundamental => "FUNDAMENTAL",
            AnalysisType::Technical => "TECHNICAL",
            AnalysisType::Backtest => "BACKTEST",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AnalysisType::Fundamental => "Fundamental Audit",
            AnalysisType::Technical => "Technical Sniper",
            AnalysisType::Backtest => "Strategy Backtest",
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnalysisType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNDAMENTAL" => Ok(AnalysisType::Fundamental),
            "TECHNICAL" => Ok(AnalysisType::Technical),
            "BACKTEST" => Ok(AnalysisType::Backtest),
            other => bail!("unknown analysis type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BacktestStrategy {
    Fundamental,
    Technical,
}

impl BacktestStrategy {
    pub const ALL: [BacktestStrategy; 2] = [BacktestStrategy::Fundamental, BacktestStrategy::Technical];

    pub fn as_str(&self) -> &'static str {
        match self {
            BacktestStrategy::Fundamental => "FUNDAMENTAL",
            BacktestStrategy::Technical => "TECHNICAL",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BacktestStrategy::Fundamental => "Fundamental",
            BacktestStrategy::Technical => "Technical",
        }
    }

    /// Period labels offered for this strategy, shortest first.
    pub fn periods(&self) -> &'static [&'static str] {
        match self {
            BacktestStrategy::Fundamental => &FUNDAMENTAL_PERIODS,
            BacktestStrategy::Technical => &TECHNICAL_PERIODS,
        }
    }
}

impl fmt::Display for BacktestStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BacktestStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "FUNDAMENTAL" => Ok(BacktestStrategy::Fundamental),
            "TECHNICAL" => Ok(BacktestStrategy::Technical),
            other => bail!("unknown backtest strategy: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnalysisState {
    #[default]
    Idle,
    Analyzing,
    Complete,
    Error,
}

impl AnalysisState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisState::Idle => "IDLE",
            AnalysisState::Analyzing => "ANALYZING",
            AnalysisState::Complete => "COMPLETE",
            AnalysisState::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StockData {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub current_price: f64,
    pub target_price: f64,
    pub stop_loss: f64,
    pub time_frame: String,
    pub rationale: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ema: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub super_trend: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peg_ratio: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debt_to_equity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub buy_alert: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_percentage: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub uri: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    #[serde(rename = "type")]
    pub analysis_type: AnalysisType,
    pub summary: String,
    pub stocks: Vec<StockData>,
    pub sources: Vec<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest_period: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backtest_strategy: Option<BacktestStrategy>,
}

impl AnalysisResult {
    pub fn heading(&self) -> String {
        match (self.analysis_type, self.backtest_strategy) {
            (AnalysisType::Backtest, Some(strategy)) => format!("Backtest Summary: {strategy}"),
            (AnalysisType::Backtest, None) => "Backtest Summary".to_string(),
            _ => "Auditor's Macro & Market Commentary".to_string(),
        }
    }

    pub fn has_sources(&self) -> bool {
        !self.sources.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BacktestParams {
    pub period: String,
    pub strategy: BacktestStrategy,
}

/// One canned analysis request. Backtest parameters are present iff the
/// type is [`AnalysisType::Backtest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    analysis_type: AnalysisType,
    backtest: Option<BacktestParams>,
}

impl AnalysisRequest {
    pub fn new(
        analysis_type: AnalysisType,
        backtest_period: Option<&str>,
        backtest_strategy: Option<BacktestStrategy>,
    ) -> anyhow::Result<Self> {
        let period = backtest_period.map(str::trim).filter(|p| !p.is_empty());
        match analysis_type {
            AnalysisType::Backtest => {
                let (Some(period), Some(strategy)) = (period, backtest_strategy) else {
                    bail!("backtest requests need both a period and a strategy");
                };
                Self::backtest(strategy, period)
            }
            _ => {
                ensure!(
                    period.is_none() && backtest_strategy.is_none(),
                    "{analysis_type} requests do not take backtest parameters"
                );
                Ok(Self {
                    analysis_type,
                    backtest: None,
                })
            }
        }
    }

    pub fn fundamental() -> Self {
        Self {
            analysis_type: AnalysisType::Fundamental,
            backtest: None,
        }
    }

    pub fn technical() -> Self {
        Self {
            analysis_type: AnalysisType::Technical,
            backtest: None,
        }
    }

    pub fn backtest(strategy: BacktestStrategy, period: &str) -> anyhow::Result<Self> {
        let period = strategy
            .periods()
            .iter()
            .find(|p| p.eq_ignore_ascii_case(period.trim()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unsupported {} backtest period {period:?} (expected one of: {})",
                    strategy.label().to_lowercase(),
                    strategy.periods().join(", ")
                )
            })?;

        Ok(Self {
            analysis_type: AnalysisType::Backtest,
            backtest: Some(BacktestParams {
                period: (*period).to_string(),
                strategy,
            }),
        })
    }

    /// The ten backtest shortcuts: every fundamental period, then every technical one.
    pub fn backtest_shortcuts() -> Vec<Self> {
        BacktestStrategy::ALL
            .iter()
            .flat_map(|strategy| {
                strategy.periods().iter().map(move |period| Self {
                    analysis_type: AnalysisType::Backtest,
                    backtest: Some(BacktestParams {
                        period: (*period).to_string(),
                        strategy: *strategy,
                    }),
                })
            })
            .collect()
    }

    pub fn analysis_type(&self) -> AnalysisType {
        self.analysis_type
    }

    pub fn backtest_params(&self) -> Option<&BacktestParams> {
        self.backtest.as_ref()
    }

    pub fn backtest_period(&self) -> Option<&str> {
        self.backtest.as_ref().map(|b| b.period.as_str())
    }

    pub fn backtest_strategy(&self) -> Option<BacktestStrategy> {
        self.backtest.as_ref().map(|b| b.strategy)
    }
}
