use crate::config::Settings;
use crate::domain::analysis::{AnalysisRequest, AnalysisResult, Source};
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{json, prompts};
use crate::llm::{LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_TEMPERATURE: f32 = 0.4;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_gemini_api_key()?.to_string();
        let base_url = settings
            .gemini_base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let model = settings
            .gemini_model
            .clone()
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let temperature = std::env::var("GEMINI_TEMPERATURE")
            .ok()
            .and_then(|s| s.parse::<f32>().ok())
            .unwrap_or(DEFAULT_TEMPERATURE);

        // Without GEMINI_TIMEOUT_SECS a hung upstream keeps the session analyzing.
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder.build().context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            temperature,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate_content(
        &self,
        req: GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("could not reach the analysis service")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                detail: upstream_error_message(&text).unwrap_or_else(|| format!("status={status}")),
                raw_output: Some(text),
            }
            .into());
        }

        match serde_json::from_str::<GenerateContentResponse>(&text) {
            Ok(parsed) => Ok(parsed),
            Err(e) => Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "decode",
                detail: format!("unexpected response shape ({e})"),
                raw_output: Some(text),
            }
            .into()),
        }
    }

    fn build_request(&self, request: &AnalysisRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(prompts::system_instruction())],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(prompts::user_prompt(request))],
            }],
            tools: vec![Tool {
                google_search: GoogleSearch {},
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
            },
        }
    }

    fn response_text(res: &GenerateContentResponse) -> anyhow::Result<String> {
        if let Some(reason) = res
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_deref())
        {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "safety",
                detail: format!("the request was blocked ({reason})"),
                raw_output: None,
            }
            .into());
        }

        let mut out = String::new();
        let parts = res
            .candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.as_slice())
            .unwrap_or_default();
        for part in parts {
            if let Some(text) = part.text.as_deref() {
                out.push_str(text);
            }
        }

        if out.trim().is_empty() {
            let finish = res
                .candidates
                .first()
                .and_then(|c| c.finish_reason.as_deref())
                .unwrap_or("UNKNOWN");
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "response",
                detail: format!("no analysis text was returned (finish_reason={finish})"),
                raw_output: None,
            }
            .into());
        }
        Ok(out)
    }

    fn response_sources(res: &GenerateContentResponse) -> Vec<Source> {
        let chunks = res
            .candidates
            .first()
            .and_then(|c| c.grounding_metadata.as_ref())
            .map(|m| m.grounding_chunks.as_slice())
            .unwrap_or_default();

        let mut seen = HashSet::new();
        chunks
            .iter()
            .filter_map(|chunk| chunk.web.as_ref())
            .filter_map(|web| {
                let uri = web.uri.as_deref()?.trim();
                if uri.is_empty() || !seen.insert(uri.to_string()) {
                    return None;
                }
                let title = web
                    .title
                    .as_deref()
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .unwrap_or(uri);
                Some(Source {
                    uri: uri.to_string(),
                    title: title.to_string(),
                })
            })
            .collect()
    }

    fn into_result(
        request: &AnalysisRequest,
        res: &GenerateContentResponse,
    ) -> anyhow::Result<AnalysisResult> {
        let text = Self::response_text(res)?;
        let parsed = json::parse_payload(&text).map_err(|e| LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage: "parse",
            detail: format!("{e:#}"),
            raw_output: Some(text.clone()),
        })?;
        let sources = Self::response_sources(res);
        Ok(parsed.payload.into_result(request, sources, &parsed.narrative))
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn analyze_stocks(&self, request: AnalysisRequest) -> anyhow::Result<AnalysisResult> {
        let started = Instant::now();
        let res = self.generate_content(self.build_request(&request)).await?;
        let result = Self::into_result(&request, &res)?;

        tracing::info!(
            analysis_type = %request.analysis_type(),
            model = %self.model,
            stocks = result.stocks.len(),
            sources = result.sources.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gemini analysis finished"
        );
        Ok(result)
    }
}

fn upstream_error_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    value
        .pointer("/error/message")
        .and_then(|m| m.as_str())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    tools: Vec<Tool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: String) -> Self {
        Self { text: Some(text) }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: GoogleSearch,
}

#[derive(Debug, Clone, Serialize)]
struct GoogleSearch {}

#[derive(Debug, Clone, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebChunk {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::{AnalysisType, BacktestStrategy};
    use serde_json::json;

    fn response(value: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(value).unwrap()
    }

    fn client() -> GeminiClient {
        GeminiClient {
            http: reqwest::Client::new(),
            api_key: "test".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    #[test]
    fn parses_grounded_backtest_response() {
        let payload = json!({
            "summary": "The strategy beat the index by 14%.",
            "stocks": [{
                "symbol": "BEL",
                "name": "Bharat Electronics",
                "sector": "Defence",
                "currentPrice": 290.5,
                "targetPrice": 340,
                "stopLoss": 260,
                "timeFrame": "3 Years",
                "rationale": "Order book visibility.",
                "entryPrice": 95.2,
                "returnPercentage": 205.1
            }]
        });
        let res = response(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "Defence led the cycle.\n```json\n" },
                    { "text": format!("{payload}\n```") }
                ]},
                "finishReason": "STOP",
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://example.com/bel", "title": "BEL results" } },
                    { "web": { "uri": "https://example.com/bel", "title": "duplicate" } },
                    { "web": { "uri": "https://example.com/nifty" } },
                    { "retrievedContext": {} }
                ]}
            }]
        }));

        let request = AnalysisRequest::backtest(BacktestStrategy::Fundamental, "3 Years").unwrap();
        let result = GeminiClient::into_result(&request, &res).unwrap();

        assert_eq!(result.analysis_type, AnalysisType::Backtest);
        assert_eq!(result.backtest_period.as_deref(), Some("3 Years"));
        assert_eq!(result.backtest_strategy, Some(BacktestStrategy::Fundamental));
        assert_eq!(result.summary, "The strategy beat the index by 14%.");
        assert_eq!(result.stocks.len(), 1);
        assert_eq!(result.stocks[0].return_percentage, Some(205.1));
        assert_eq!(result.sources.len(), 2);
        assert_eq!(result.sources[0].title, "BEL results");
        assert_eq!(result.sources[1].title, "https://example.com/nifty");
    }

    #[test]
    fn blocked_prompt_is_an_error() {
        let res = response(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        let err = GeminiClient::into_result(&AnalysisRequest::fundamental(), &res).unwrap_err();
        assert!(err.to_string().contains("blocked (SAFETY)"));
    }

    #[test]
    fn empty_candidate_is_an_error() {
        let res = response(json!({ "candidates": [{ "finishReason": "MAX_TOKENS" }] }));
        let err = GeminiClient::into_result(&AnalysisRequest::technical(), &res).unwrap_err();
        assert!(err.to_string().contains("MAX_TOKENS"));
    }

    #[test]
    fn malformed_payload_is_a_parse_error() {
        let res = response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "```json\n{\"stocks\": [}\n```" }] } }]
        }));
        let err = GeminiClient::into_result(&AnalysisRequest::technical(), &res).unwrap_err();
        let diag = err.downcast_ref::<LlmDiagnosticsError>().unwrap();
        assert_eq!(diag.stage, "parse");
        assert!(diag.raw_output.is_some());
    }

    #[test]
    fn request_body_enables_search_grounding() {
        let body = serde_json::to_value(client().build_request(&AnalysisRequest::technical())).unwrap();
        assert_eq!(body["tools"][0], json!({ "googleSearch": {} }));
        assert_eq!(body["contents"][0]["role"], json!("user"));
        assert!(body["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Nifty 200"));
        assert!(body["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn upstream_error_message_is_extracted() {
        let body = r#"{"error":{"code":400,"message":"API key not valid. Please pass a valid API key.","status":"INVALID_ARGUMENT"}}"#;
        assert_eq!(
            upstream_error_message(body).as_deref(),
            Some("API key not valid. Please pass a valid API key.")
        );
        assert_eq!(upstream_error_message("<html>"), None);
    }
}
