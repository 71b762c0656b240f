use crate::domain::contract::LlmAnalysisPayload;
use anyhow::Context;

#[derive(Debug, Clone)]
pub struct ParsedPayload {
    pub payload: LlmAnalysisPayload,
    /// Text around the JSON block, trimmed.
    pub narrative: String,
}

pub fn extract_json(text: &str) -> Option<String> {
    split_json(text).map(|(json, _)| json)
}

/// Splits model output into the JSON object and the prose around it.
fn split_json(text: &str) -> Option<(String, String)> {
    let trimmed = text.trim();

    // Markdown fences (```json ... ``` or ``` ... ```) anywhere in the text.
    let mut cursor = 0;
    while let Some(open_rel) = trimmed[cursor..].find("```") {
        let open = cursor + open_rel;
        let body_start = match trimmed[open + 3..].find('\n') {
            Some(nl) => open + 3 + nl + 1,
            None => break,
        };
        let Some(close_rel) = trimmed[body_start..].find("```") else {
            break;
        };
        let close = body_start + close_rel;
        let inner = trimmed[body_start..close].trim();
        if inner.starts_with('{') {
            let narrative = join_prose(&trimmed[..open], &trimmed[close + 3..]);
            return Some((inner.to_string(), narrative));
        }
        cursor = close + 3;
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    let narrative = join_prose(&trimmed[..start], &trimmed[end + 1..]);
    Some((trimmed[start..=end].trim().to_string(), narrative))
}

fn join_prose(before: &str, after: &str) -> String {
    [before.trim(), after.trim()]
        .iter()
        .filter(|s| !s.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text without any JSON object is a summary-only payload; an object that
/// does not decode is an error.
pub fn parse_payload(text: &str) -> anyhow::Result<ParsedPayload> {
    anyhow::ensure!(!text.trim().is_empty(), "the analysis service returned an empty response");

    let Some((json_str, narrative)) = split_json(text) else {
        return Ok(ParsedPayload {
            payload: LlmAnalysisPayload::default(),
            narrative: text.trim().to_string(),
        });
    };

    let payload = serde_json::from_str::<LlmAnalysisPayload>(&json_str)
        .context("the analysis service returned malformed stock data")?;
    Ok(ParsedPayload { payload, narrative })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn fenced_block_after_prose_keeps_narrative() {
        let body = json!({ "summary": "", "stocks": [{ "symbol": "LT" }] });
        let text = format!("Crude is easing and bond yields are flat.\n\n```json\n{body}\n```\nStay hedged.");
        let parsed = parse_payload(&text).unwrap();
        assert_eq!(parsed.payload.stocks.len(), 1);
        assert_eq!(
            parsed.narrative,
            "Crude is easing and bond yields are flat.\n\nStay hedged."
        );
    }

    #[test]
    fn skips_non_json_fences() {
        let text = "```text\nnot json\n```\n```json\n{\"summary\":\"s\"}\n```";
        assert_eq!(extract_json(text), Some("{\"summary\":\"s\"}".to_string()));
    }

    #[test]
    fn prose_only_becomes_summary() {
        let parsed = parse_payload("  Markets are range bound today.  ").unwrap();
        assert!(parsed.payload.stocks.is_empty());
        assert_eq!(parsed.narrative, "Markets are range bound today.");
    }

    #[test]
    fn rejects_malformed_json_and_empty_text() {
        assert!(parse_payload("{\"stocks\": [ {\"symbol\": }").is_err());
        assert!(parse_payload("   ").is_err());
    }
}
