use alphasense_core::controller::{AnalysisController, View};
use alphasense_core::domain::analysis::{AnalysisRequest, AnalysisType, BacktestStrategy, StockData};
use alphasense_core::domain::chart::{chart_series, upside_percent};
use std::fmt::Write;

const RULE: &str = "────────────────────────────────────────────────────────────";

pub fn render_view(controller: &AnalysisController) -> String {
    let mut out = String::new();
    match controller.view() {
        View::Prompt => {
            out.push_str("Pick an analysis: `fundamental`, `technical` or `backtest`.\n");
        }
        View::Loading {
            analysis_type,
            backtest_period,
            ..
        } => {
            let _ = writeln!(
                out,
                "Analyzing Nifty 200 data ({}{})...",
                analysis_type.label(),
                backtest_period.map(|p| format!(", {p}")).unwrap_or_default()
            );
        }
        View::Failed { message } => {
            let _ = writeln!(out, "Analysis Failed\n{message}");
        }
        View::Results(result) => {
            let _ = writeln!(out, "{}\n{RULE}\n{}\n", result.heading(), result.summary.trim());

            let series = chart_series(&result.stocks, result.analysis_type);
            if let Some(first) = series.first() {
                let _ = writeln!(out, "{}", first.label);
                for point in &series {
                    let _ = writeln!(out, "  {:<12} {:>+8.1}%", point.symbol, point.value);
                }
                out.push('\n');
            }

            for (idx, stock) in result.stocks.iter().enumerate() {
                render_stock(&mut out, idx + 1, stock, result.analysis_type);
            }

            if result.has_sources() {
                out.push_str("Verified Sources\n");
                for source in &result.sources {
                    let _ = writeln!(out, "  - {} <{}>", source.title, source.uri);
                }
            }
        }
    }
    out
}

fn render_stock(out: &mut String, rank: usize, stock: &StockData, analysis_type: AnalysisType) {
    let _ = writeln!(
        out,
        "{rank}. {} - {} [{}]",
        stock.symbol, stock.name, stock.sector
    );
    let upside = upside_percent(stock)
        .map(|u| format!(" ({u:+.1}%)"))
        .unwrap_or_default();
    let _ = writeln!(
        out,
        "   CMP ₹{:.2} | Target ₹{:.2}{upside} | SL ₹{:.2} | {}",
        stock.current_price, stock.target_price, stock.stop_loss, stock.time_frame
    );

    let mut metrics = Vec::new();
    match analysis_type {
        AnalysisType::Fundamental => {
            if let Some(v) = stock.peg_ratio {
                metrics.push(format!("PEG {v:.2}"));
            }
            if let Some(v) = stock.debt_to_equity {
                metrics.push(format!("D/E {v:.2}"));
            }
        }
        AnalysisType::Technical => {
            if let Some(v) = &stock.ema {
                metrics.push(format!("EMA {v}"));
            }
            if let Some(v) = &stock.super_trend {
                metrics.push(format!("SuperTrend {v}"));
            }
            if let Some(v) = stock.rsi {
                metrics.push(format!("RSI {v:.1}"));
            }
            if let Some(v) = &stock.volume_action {
                metrics.push(format!("Volume {v}"));
            }
            if let Some(v) = stock.buy_alert {
                metrics.push(format!("Buy alert ₹{v:.2}"));
            }
            if let Some(v) = &stock.technical_trigger {
                metrics.push(format!("Trigger {v}"));
            }
        }
        AnalysisType::Backtest => {
            if let Some(v) = stock.entry_price {
                metrics.push(format!("Entry ₹{v:.2}"));
            }
            if let Some(v) = stock.return_percentage {
                metrics.push(format!("Return {v:+.1}%"));
            }
        }
    }
    if !metrics.is_empty() {
        let _ = writeln!(out, "   {}", metrics.join(" | "));
    }
    if !stock.rationale.is_empty() {
        let _ = writeln!(out, "   {}", stock.rationale);
    }
    out.push('\n');
}

pub fn render_shortcuts() -> String {
    let mut out = String::new();
    for strategy in BacktestStrategy::ALL {
        let periods = AnalysisRequest::backtest_shortcuts()
            .into_iter()
            .filter(|r| r.backtest_strategy() == Some(strategy))
            .filter_map(|r| r.backtest_period().map(|p| format!("\"{p}\"")))
            .collect::<Vec<_>>();
        let _ = writeln!(out, "{:<12} {}", strategy.label(), periods.join(", "));
    }
    out
}
