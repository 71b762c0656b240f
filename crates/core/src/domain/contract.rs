use crate::domain::analysis::{AnalysisRequest, AnalysisResult, Source, StockData};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// JSON block the model is asked to emit. Every key is optional and numbers
/// may come back as strings; values are taken as supplied.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmAnalysisPayload {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub stocks: Vec<LlmStock>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmStock {
    #[serde(default, deserialize_with = "lenient_string")]
    pub symbol: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub sector: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub current_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub target_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub stop_loss: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub time_frame: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub rationale: String,

    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub ema: Option<String>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub super_trend: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub peg_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub debt_to_equity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rsi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub volume_action: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub buy_alert: Option<f64>,
    #[serde(default, deserialize_with = "lenient_opt_string")]
    pub technical_trigger: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub entry_price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub return_percentage: Option<f64>,
}

impl LlmAnalysisPayload {
    /// Builds the typed result. Type and backtest parameters always come from
    /// the request, whatever the model echoed back.
    pub fn into_result(
        self,
        request: &AnalysisRequest,
        sources: Vec<Source>,
        narrative: &str,
    ) -> AnalysisResult {
        let summary = match self.summary.trim() {
            "" => narrative.trim().to_string(),
            s => s.to_string(),
        };

        AnalysisResult {
            analysis_type: request.analysis_type(),
            summary,
            stocks: self.stocks.into_iter().map(LlmStock::into_stock).collect(),
            sources,
            backtest_period: request.backtest_period().map(str::to_string),
            backtest_strategy: request.backtest_strategy(),
        }
    }
}

impl LlmStock {
    fn into_stock(self) -> StockData {
        StockData {
            symbol: self.symbol.trim().to_string(),
            name: self.name.trim().to_string(),
            sector: self.sector.trim().to_string(),
            current_price: self.current_price.unwrap_or_default(),
            target_price: self.target_price.unwrap_or_default(),
            stop_loss: self.stop_loss.unwrap_or_default(),
            time_frame: self.time_frame.trim().to_string(),
            rationale: self.rationale.trim().to_string(),
            ema: self.ema,
            super_trend: self.super_trend,
            peg_ratio: self.peg_ratio,
            debt_to_equity: self.debt_to_equity,
            rsi: self.rsi,
            volume_action: self.volume_action,
            buy_alert: self.buy_alert,
            technical_trigger: self.technical_trigger,
            entry_price: self.entry_price,
            return_percentage: self.return_percentage,
        }
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_opt_string(deserializer)?.unwrap_or_default())
}

fn lenient_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let s = match value {
        Some(Value::String(s)) => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => return Ok(None),
    };
    let s = s.trim();
    Ok((!s.is_empty()).then(|| s.to_string()))
}

/// Accepts `1234.5`, `"1234.5"`, `"₹1,234.50"`, `"Rs. 2,950"` or `"-12.5%"`.
fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_number(s),
        _ => None,
    }
}

/// Parses the first numeric token in `s`: an optional `-`, digits with `,`
/// grouping, then an optional fraction. Surrounding words are ignored.
fn first_number(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let first_digit = bytes.iter().position(u8::is_ascii_digit)?;

    // A leading `.` only counts when it opens the token, as in `".5"` or `"-.5"`.
    let mut start = first_digit;
    if start > 0 && bytes[start - 1] == b'.' {
        let opens_token = start == 1 || matches!(bytes[start - 2], b' ' | b'-' | b'+');
        if opens_token {
            start -= 1;
        }
    }
    let negative = start > 0 && bytes[start - 1] == b'-';

    let digit_at = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    let mut seen_dot = start < first_digit;
    let mut end = first_digit;
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => {}
            b',' if !seen_dot && digit_at(end + 1) => {}
            b'.' if !seen_dot && digit_at(end + 1) => seen_dot = true,
            _ => break,
        }
        end += 1;
    }

    let token: String = s[start..end].chars().filter(|c| *c != ',').collect();
    let n = token.parse::<f64>().ok()?;
    let n = if negative { -n } else { n };
    n.is_finite().then_some(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AnalysisType, BacktestStrategy};
    use serde_json::json;

    #[test]
    fn accepts_numbers_as_strings() {
        let stock: LlmStock = serde_json::from_value(json!({
            "symbol": " RELIANCE ",
            "name": "Reliance Industries",
            "currentPrice": "₹2,950.40",
            "targetPrice": 3400,
            "stopLoss": "2,700",
            "rsi": "61.2",
            "returnPercentage": "18.5%",
            "ema": "",
        }))
        .unwrap();

        let stock = stock.into_stock();
        assert_eq!(stock.symbol, "RELIANCE");
        assert_eq!(stock.current_price, 2950.40);
        assert_eq!(stock.target_price, 3400.0);
        assert_eq!(stock.stop_loss, 2700.0);
        assert_eq!(stock.rsi, Some(61.2));
        assert_eq!(stock.return_percentage, Some(18.5));
        assert_eq!(stock.ema, None);
    }

    #[test]
    fn prices_ignore_surrounding_words() {
        let cases = [
            ("Rs. 2,950", Some(2950.0)),
            ("Price: 1500", Some(1500.0)),
            ("approx. 820", Some(820.0)),
            ("INR 1,234.50", Some(1234.5)),
            ("₹1,234.50 (approx.)", Some(1234.5)),
            ("-4.2%", Some(-4.2)),
            ("+18.5%", Some(18.5)),
            (".5", Some(0.5)),
            ("Rs.2950", Some(2950.0)),
            ("n/a", None),
        ];
        for (raw, expected) in cases {
            let stock: LlmStock = serde_json::from_value(json!({ "currentPrice": raw })).unwrap();
            assert_eq!(stock.current_price, expected, "{raw}");
        }
    }

    #[test]
    fn missing_keys_default() {
        let payload: LlmAnalysisPayload =
            serde_json::from_value(json!({ "stocks": [{ "symbol": "ITC", "pegRatio": null }] }))
                .unwrap();
        assert!(payload.summary.is_empty());
        assert_eq!(payload.stocks[0].peg_ratio, None);
        assert_eq!(payload.stocks[0].current_price, None);
    }

    #[test]
    fn into_result_echoes_request_not_model() {
        let payload: LlmAnalysisPayload = serde_json::from_value(json!({
            "summary": "Quality compounders held up.",
            "backtestPeriod": "99 Years",
            "stocks": [],
        }))
        .unwrap();

        let request = AnalysisRequest::backtest(BacktestStrategy::Fundamental, "3 Years").unwrap();
        let result = payload.into_result(&request, vec![], "");
        assert_eq!(result.analysis_type, AnalysisType::Backtest);
        assert_eq!(result.backtest_period.as_deref(), Some("3 Years"));
        assert_eq!(result.backtest_strategy, Some(BacktestStrategy::Fundamental));
        assert_eq!(result.summary, "Quality compounders held up.");
    }

    #[test]
    fn into_result_falls_back_to_narrative_summary() {
        let payload = LlmAnalysisPayload::default();
        let result = payload.into_result(&AnalysisRequest::technical(), vec![], "  Momentum is broadening.\n");
        assert_eq!(result.summary, "Momentum is broadening.");
        assert_eq!(result.backtest_period, None);
        assert_eq!(result.backtest_strategy, None);
    }
}
