use crate::domain::analysis::{AnalysisType, StockData};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub symbol: String,
    pub value: f64,
    pub label: &'static str,
}

/// Series for the chart widget: realized return for backtests, projected
/// upside to target otherwise. Stocks without a usable value are skipped.
pub fn chart_series(stocks: &[StockData], analysis_type: AnalysisType) -> Vec<ChartPoint> {
    stocks
        .iter()
        .filter_map(|stock| {
            let (value, label) = match analysis_type {
                AnalysisType::Backtest => (stock.return_percentage?, "Return %"),
                AnalysisType::Fundamental | AnalysisType::Technical => {
                    (upside_percent(stock)?, "Upside %")
                }
            };
            value.is_finite().then(|| ChartPoint {
                symbol: stock.symbol.clone(),
                value,
                label,
            })
        })
        .collect()
}

pub fn upside_percent(stock: &StockData) -> Option<f64> {
    if stock.current_price <= 0.0 {
        return None;
    }
    Some((stock.target_price - stock.current_price) / stock.current_price * 100.0)
}
