use crate::domain::analysis::{AnalysisRequest, AnalysisType, BacktestStrategy};

pub const UNIVERSE: &str = "Nifty 200";

pub fn system_instruction() -> String {
    [
        "You are AlphaSense, a meticulous equity research auditor for the Indian stock market.",
        "Use Google Search to verify current prices and recent news before recommending anything.",
        "Always weigh the global macro backdrop: crude oil, bond yields, currency moves, wars and geopolitical risk, and sector rotation.",
        "Only recommend stocks that are constituents of the Nifty 200 index.",
        "Prices are in INR. Never invent a price you could not verify; prefer the latest verified quote.",
        "Write the commentary first, then finish with exactly one fenced ```json block that matches the requested schema.",
        "Inside the JSON: double quotes only, no comments, no trailing commas, numbers as plain JSON numbers.",
    ]
    .join("\n")
}

pub fn user_prompt(request: &AnalysisRequest) -> String {
    match (request.analysis_type(), request.backtest_params()) {
        (AnalysisType::Backtest, Some(params)) => backtest_prompt(params.strategy, &params.period),
        (AnalysisType::Technical, _) => technical_prompt(),
        _ => fundamental_prompt(),
    }
}

fn fundamental_prompt() -> String {
    format!(
        "Task: Run a fundamental audit of the {UNIVERSE} and pick 5 to 8 potential multi-baggers for a 1 to 3 year horizon.\n\
Favour durable earnings growth, reasonable PEG ratios, low debt to equity and sector tailwinds.\n\
Explain how oil, bonds, war news and sector trends shape the picks in a short macro commentary.\n\n\
{}",
        schema(&[
            ("pegRatio", "number"),
            ("debtToEquity", "number"),
        ])
    )
}

fn technical_prompt() -> String {
    format!(
        "Task: Act as a technical sniper on the {UNIVERSE} and find 5 to 8 short-term momentum setups (2 to 6 weeks).\n\
Use EMA alignment, SuperTrend, RSI and volume action. Give a precise buy alert level and the technical trigger for each setup.\n\
Open with a short market commentary covering index trend, breadth and the macro risks that could invalidate the setups.\n\n\
{}",
        schema(&[
            ("ema", "string, e.g. \"Price above 20/50/200 EMA\""),
            ("superTrend", "string, e.g. \"Buy since 12 Mar\""),
            ("rsi", "number"),
            ("volumeAction", "string"),
            ("buyAlert", "number"),
            ("technicalTrigger", "string"),
        ])
    )
}

fn backtest_prompt(strategy: BacktestStrategy, period: &str) -> String {
    let method = match strategy {
        BacktestStrategy::Fundamental => {
            "the fundamental multi-bagger strategy (earnings growth, PEG, low leverage)"
        }
        BacktestStrategy::Technical => {
            "the technical momentum strategy (EMA alignment, SuperTrend, RSI, volume breakouts)"
        }
    };

    format!(
        "Task: Backtest {method} on the {UNIVERSE} over the last {period}.\n\
Identify the 5 to 8 stocks the strategy would have selected at the start of the window.\n\
For each, report the entry price at the start of the window, the current price and the realized return in percent.\n\
Summarize how the strategy performed against the index and which macro events drove the outcome.\n\n\
{}",
        schema(&[
            ("entryPrice", "number"),
            ("returnPercentage", "number"),
        ])
    )
}

fn schema(extra: &[(&str, &str)]) -> String {
    let mut fields = vec![
        ("symbol", "string, NSE symbol"),
        ("name", "string"),
        ("sector", "string"),
        ("currentPrice", "number"),
        ("targetPrice", "number"),
        ("stopLoss", "number"),
        ("timeFrame", "string"),
        ("rationale", "string, two or three sentences"),
    ];
    fields.extend_from_slice(extra);

    let stock_fields = fields
        .iter()
        .map(|(key, kind)| format!("      \"{key}\": <{kind}>"))
        .collect::<Vec<_>>()
        .join(",\n");

    format!(
        "Output schema:\n```json\n{{\n  \"summary\": <string, the commentary>,\n  \"stocks\": [\n    {{\n{stock_fields}\n    }}\n  ]\n}}\n```"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backtest_prompt_mentions_period_and_return_fields() {
        let request = AnalysisRequest::backtest(BacktestStrategy::Technical, "6 Weeks").unwrap();
        let prompt = user_prompt(&request);
        assert!(prompt.contains("last 6 Weeks"));
        assert!(prompt.contains("technical momentum strategy"));
        assert!(prompt.contains("\"returnPercentage\""));
    }

    #[test]
    fn technical_prompt_asks_for_indicators() {
        let prompt = user_prompt(&AnalysisRequest::technical());
        for key in ["\"superTrend\"", "\"rsi\"", "\"buyAlert\"", "\"currentPrice\""] {
            assert!(prompt.contains(key), "missing {key}");
        }
        assert!(!prompt.contains("\"pegRatio\""));
    }

    #[test]
    fn fundamental_prompt_targets_universe() {
        let prompt = user_prompt(&AnalysisRequest::fundamental());
        assert!(prompt.contains(UNIVERSE));
        assert!(prompt.contains("\"debtToEquity\""));
    }
}
