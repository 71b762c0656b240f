use alphasense_core::controller::{
    ActionButton, ActionGroup, AnalysisController, View, FALLBACK_ERROR_MESSAGE,
};
use alphasense_core::domain::analysis::{
    AnalysisResult, AnalysisType, BacktestStrategy, StockData,
};
use alphasense_core::domain::chart::{chart_series, upside_percent};
use anyhow::Context;
use minijinja::Environment;
use serde::Serialize;

const PAGE_TEMPLATE: &str = "page.html";
const FALLBACK_TEMPLATE: &str = "fallback.html";

/// Served when even the fallback template cannot render.
const BARE_FALLBACK: &str = "<!doctype html><title>AlphaSense</title>\
<h2>Oops, something went wrong.</h2><p><a href=\"/\">Reload App</a></p>";

pub fn environment() -> anyhow::Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(PAGE_TEMPLATE, include_str!("../templates/page.html"))
        .context("page template failed to compile")?;
    env.add_template(FALLBACK_TEMPLATE, include_str!("../templates/fallback.html"))
        .context("fallback template failed to compile")?;
    Ok(env)
}

pub fn render(
    env: &Environment<'static>,
    controller: &AnalysisController,
    install_available: bool,
) -> anyhow::Result<String> {
    let ctx = PageContext::build(controller, install_available);
    env.get_template(PAGE_TEMPLATE)?
        .render(&ctx)
        .context("page render failed")
}

/// The "something went wrong" page shown for failures outside the analysis
/// lifecycle. A blank message falls back to the generic one.
pub fn render_fallback(env: &Environment<'static>, message: &str) -> String {
    let message = match message.trim() {
        "" => FALLBACK_ERROR_MESSAGE,
        m => m,
    };
    env.get_template(FALLBACK_TEMPLATE)
        .and_then(|t| t.render(minijinja::context! { message }))
        .unwrap_or_else(|e| {
            tracing::error!(error = %e, "fallback page render failed");
            BARE_FALLBACK.to_string()
        })
}

#[derive(Debug, Serialize)]
struct PageContext {
    view: &'static str,
    analyzing: bool,
    install_available: bool,
    primary_actions: Vec<ActionContext>,
    backtest_rows: Vec<BacktestRow>,
    loading: Option<LoadingContext>,
    error: Option<String>,
    result: Option<ResultContext>,
}

#[derive(Debug, Serialize)]
struct ActionContext {
    label: String,
    caption: Option<&'static str>,
    analysis_type: &'static str,
    period: Option<String>,
    strategy: Option<&'static str>,
    enabled: bool,
    busy: bool,
}

#[derive(Debug, Serialize)]
struct BacktestRow {
    label: &'static str,
    actions: Vec<ActionContext>,
}

#[derive(Debug, Serialize)]
struct LoadingContext {
    title: String,
    detail: &'static str,
}

#[derive(Debug, Serialize)]
struct ResultContext {
    heading: String,
    accent: &'static str,
    summary: String,
    stocks: Vec<StockRow>,
    chart_label: Option<&'static str>,
    chart: Vec<ChartBar>,
    sources: Vec<SourceLink>,
}

#[derive(Debug, Serialize)]
struct StockRow {
    symbol: String,
    name: String,
    sector: String,
    current_price: String,
    target_price: String,
    stop_loss: String,
    upside: Option<String>,
    time_frame: String,
    rationale: String,
    metrics: Vec<Metric>,
}

#[derive(Debug, Serialize)]
struct Metric {
    label: &'static str,
    value: String,
}

#[derive(Debug, Serialize)]
struct ChartBar {
    symbol: String,
    value: String,
    width_pct: u32,
    negative: bool,
}

#[derive(Debug, Serialize)]
struct SourceLink {
    uri: String,
    title: String,
}

impl PageContext {
    fn build(controller: &AnalysisController, install_available: bool) -> Self {
        let view = controller.view();

        let mut primary_actions = Vec::new();
        let mut fundamental_backtests = Vec::new();
        let mut technical_backtests = Vec::new();
        for action in controller.actions() {
            let group = action.group;
            let ctx = ActionContext::from(action);
            match group {
                ActionGroup::Primary => primary_actions.push(ctx),
                ActionGroup::FundamentalBacktest => fundamental_backtests.push(ctx),
                ActionGroup::TechnicalBacktest => technical_backtests.push(ctx),
            }
        }

        let (loading, error, result) = match &view {
            View::Prompt => (None, None, None),
            View::Loading {
                analysis_type,
                backtest_strategy,
                backtest_period,
            } => {
                let title = match (analysis_type, backtest_strategy, backtest_period) {
                    (AnalysisType::Backtest, Some(strategy), Some(period)) => format!(
                        "Backtesting the {} strategy over {period}...",
                        strategy.label().to_lowercase()
                    ),
                    _ => "Analyzing Nifty 200 Data...".to_string(),
                };
                let loading = LoadingContext {
                    title,
                    detail: "Checking Oil, Bonds, War News • Verifying Prices",
                };
                (Some(loading), None, None)
            }
            View::Failed { message } => (None, Some(message.to_string()), None),
            View::Results(result) => (None, None, Some(ResultContext::from_result(result))),
        };

        Self {
            view: view.name(),
            analyzing: controller.is_analyzing(),
            install_available,
            primary_actions,
            backtest_rows: vec![
                BacktestRow {
                    label: BacktestStrategy::Fundamental.label(),
                    actions: fundamental_backtests,
                },
                BacktestRow {
                    label: BacktestStrategy::Technical.label(),
                    actions: technical_backtests,
                },
            ],
            loading,
            error,
            result,
        }
    }
}

impl From<ActionButton> for ActionContext {
    fn from(action: ActionButton) -> Self {
        Self {
            label: action.label,
            caption: action.caption,
            analysis_type: action.request.analysis_type().as_str(),
            period: action.request.backtest_period().map(str::to_string),
            strategy: action.request.backtest_strategy().map(|s| s.as_str()),
            enabled: action.enabled,
            busy: action.busy,
        }
    }
}

impl ResultContext {
    fn from_result(result: &AnalysisResult) -> Self {
        let series = chart_series(&result.stocks, result.analysis_type);
        let max = series
            .iter()
            .map(|p| p.value.abs())
            .fold(0.0_f64, f64::max);
        let chart = series
            .iter()
            .map(|p| ChartBar {
                symbol: p.symbol.clone(),
                value: format!("{:+.1}%", p.value),
                width_pct: if max > 0.0 {
                    (p.value.abs() / max * 100.0).round().clamp(1.0, 100.0) as u32
                } else {
                    1
                },
                negative: p.value < 0.0,
            })
            .collect::<Vec<_>>();

        Self {
            heading: result.heading(),
            accent: match result.analysis_type {
                AnalysisType::Fundamental => "blue",
                AnalysisType::Technical => "orange",
                AnalysisType::Backtest => "purple",
            },
            summary: result.summary.clone(),
            stocks: result.stocks.iter().map(StockRow::from_stock).collect(),
            chart_label: series.first().map(|p| p.label),
            chart,
            sources: result
                .sources
                .iter()
                .map(|s| SourceLink {
                    uri: s.uri.clone(),
                    title: s.title.clone(),
                })
                .collect(),
        }
    }
}

impl StockRow {
    fn from_stock(stock: &StockData) -> Self {
        let mut metrics = Vec::new();
        let mut push_text = |label: &'static str, value: &Option<String>| {
            if let Some(v) = value {
                metrics.push(Metric {
                    label,
                    value: v.clone(),
                });
            }
        };
        push_text("EMA", &stock.ema);
        push_text("SuperTrend", &stock.super_trend);
        push_text("Volume", &stock.volume_action);
        push_text("Trigger", &stock.technical_trigger);

        let numbers = [
            ("PEG", stock.peg_ratio, false),
            ("Debt/Equity", stock.debt_to_equity, false),
            ("RSI", stock.rsi, false),
            ("Buy Alert", stock.buy_alert, true),
            ("Entry", stock.entry_price, true),
        ];
        for (label, value, is_price) in numbers {
            if let Some(v) = value {
                metrics.push(Metric {
                    label,
                    value: if is_price { price(v) } else { format!("{v:.2}") },
                });
            }
        }
        if let Some(ret) = stock.return_percentage {
            metrics.push(Metric {
                label: "Return",
                value: format!("{ret:+.1}%"),
            });
        }

        Self {
            symbol: stock.symbol.clone(),
            name: stock.name.clone(),
            sector: stock.sector.clone(),
            current_price: price(stock.current_price),
            target_price: price(stock.target_price),
            stop_loss: price(stock.stop_loss),
            upside: upside_percent(stock).map(|u| format!("{u:+.1}%")),
            time_frame: stock.time_frame.clone(),
            rationale: stock.rationale.clone(),
            metrics,
        }
    }
}

fn price(v: f64) -> String {
    format!("₹{v:.2}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphasense_core::domain::analysis::{AnalysisRequest, Source};

    fn complete_with(sources: Vec<Source>) -> AnalysisController {
        let mut controller = AnalysisController::new();
        let request = AnalysisRequest::fundamental();
        let ticket = controller.begin(&request).unwrap();
        controller.complete(
            ticket,
            AnalysisResult {
                analysis_type: AnalysisType::Fundamental,
                summary: "Oil <softening> helps OMCs.".to_string(),
                stocks: vec![StockData {
                    symbol: "BPCL".to_string(),
                    name: "Bharat Petroleum".to_string(),
                    sector: "Energy".to_string(),
                    current_price: 300.0,
                    target_price: 360.0,
                    stop_loss: 270.0,
                    peg_ratio: Some(0.8),
                    ..Default::default()
                }],
                sources,
                backtest_period: None,
                backtest_strategy: None,
            },
        );
        controller
    }

    #[test]
    fn results_page_escapes_summary_and_lists_sources() {
        let env = environment().unwrap();
        let controller = complete_with(vec![Source {
            uri: "https://example.com/oil".to_string(),
            title: "Oil outlook".to_string(),
        }]);
        let html = render(&env, &controller, false).unwrap();

        assert!(html.contains("Auditor&#x27;s Macro &amp; Market Commentary"));
        assert!(html.contains("Oil &lt;softening&gt; helps OMCs."));
        assert!(html.contains("Verified Sources"));
        assert!(html.contains("https:&#x2f;&#x2f;example.com&#x2f;oil") || html.contains("https://example.com/oil"));
        assert!(html.contains("+20.0%"));
        assert!(!html.contains("Analysis Failed"));
    }

    #[test]
    fn empty_sources_omit_section() {
        let env = environment().unwrap();
        let html = render(&env, &complete_with(vec![]), false).unwrap();
        assert!(!html.contains("Verified Sources"));
    }

    #[test]
    fn loading_page_disables_actions_and_refreshes() {
        let env = environment().unwrap();
        let mut controller = AnalysisController::new();
        controller
            .begin(&AnalysisRequest::backtest(BacktestStrategy::Technical, "3 Months").unwrap())
            .unwrap();
        let html = render(&env, &controller, false).unwrap();

        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains("Backtesting the technical strategy over 3 Months..."));
        assert_eq!(html.matches("disabled").count(), 12);
    }

    #[test]
    fn fallback_page_escapes_message_and_offers_reload() {
        let env = environment().unwrap();
        let html = render_fallback(&env, "template <page.html> missing");
        assert!(html.contains("Oops, something went wrong."));
        assert!(html.contains("template &lt;page.html&gt; missing"));
        assert!(html.contains("Reload App"));

        let html = render_fallback(&env, "  ");
        assert!(html.contains(FALLBACK_ERROR_MESSAGE));
    }

    #[test]
    fn error_page_offers_retry_and_install_banner() {
        let env = environment().unwrap();
        let mut controller = AnalysisController::new();
        let ticket = controller.begin(&AnalysisRequest::technical()).unwrap();
        controller.fail(ticket, &anyhow::anyhow!(""));
        let html = render(&env, &controller, true).unwrap();

        assert!(html.contains("Analysis Failed"));
        assert!(html.contains("An unexpected error occurred."));
        assert!(html.contains("action=\"/retry\""));
        assert!(html.contains("Install AlphaSense"));
        assert!(html.contains("data-offered=\"true\""));
    }

    #[test]
    fn install_banner_waits_for_a_live_prompt() {
        let env = environment().unwrap();
        let mut controller = AnalysisController::new();
        controller.begin(&AnalysisRequest::fundamental()).unwrap();

        let html = render(&env, &controller, true).unwrap();
        assert!(html.contains("http-equiv=\"refresh\""));
        assert!(html.contains("<div id=\"install\" hidden data-offered=\"true\">"));

        let html = render(&env, &AnalysisController::new(), false).unwrap();
        assert!(html.contains("<div id=\"install\" hidden data-offered=\"false\">"));
    }
}
