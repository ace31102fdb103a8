// ===============================
// src/news_gemini.rs
// ===============================
//
// News desk ke Gemini generateContent (REST, JSON mode).
// - generate_news     : minta headline + impact dengan responseSchema
// - generate_analysis : tesis 2 kalimat untuk satu security
// Semua error dikembalikan sebagai NewsError; fallback diurus news.rs.
//

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::domain::{Impact, NewsDraft, Security};
use crate::news::{AnalysisGenerator, NewsError, NewsGenerator};

const DEFAULT_HEADLINE: &str = "Market Update";
const DEFAULT_CONTENT: &str = "Prices are moving as trading volume spikes.";
const EMPTY_ANALYSIS: &str = "Analysis currently unavailable.";

#[derive(Debug, Clone)]
pub struct GeminiDesk {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: String,
    timeout: Duration,
}

// ---- Minimal generateContent response model ----
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

/// Bentuk JSON yang diminta lewat responseSchema; semua field opsional.
#[derive(Debug, Default, Deserialize)]
struct RawNews {
    headline: Option<String>,
    content: Option<String>,
    impact: Option<String>,
    #[serde(rename = "affectedSymbol")]
    affected_symbol: Option<String>,
}

impl GeminiDesk {
    pub fn new(base_url: &str, model: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.to_string(),
            timeout,
        }
    }

    async fn generate(&self, body: serde_json::Value) -> Result<String, NewsError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(%url, "calling generateContent");

        let rsp = self
            .http
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        if !rsp.status().is_success() {
            let status = rsp.status().as_u16();
            let body = rsp.text().await.unwrap_or_default();
            return Err(NewsError::Status { status, body });
        }

        let data: GenerateResponse = rsp.json().await?;
        // tanpa candidate (mis. diblokir safety filter)
        if data.candidates.is_empty() {
            return Err(NewsError::Empty);
        }
        Ok(extract_text(data))
    }
}

fn extract_text(rsp: GenerateResponse) -> String {
    rsp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect::<Vec<_>>().join(""))
        .unwrap_or_default()
}

fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let inner = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .map(|t| t.trim_end_matches("```"))
        .unwrap_or(text);
    inner.trim()
}

fn non_empty(s: Option<String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Parse model text into a draft. Empty text yields the default update.
pub(crate) fn parse_news_payload(text: &str) -> Result<NewsDraft, NewsError> {
    let cleaned = strip_fences(text);
    let raw: RawNews = if cleaned.is_empty() {
        RawNews::default()
    } else {
        serde_json::from_str(cleaned)?
    };

    Ok(NewsDraft {
        headline: non_empty(raw.headline).unwrap_or_else(|| DEFAULT_HEADLINE.to_string()),
        content: non_empty(raw.content).unwrap_or_else(|| DEFAULT_CONTENT.to_string()),
        impact: raw.impact.as_deref().map(Impact::parse).unwrap_or_default(),
        affected_symbol: non_empty(raw.affected_symbol).map(|s| s.to_ascii_uppercase()),
    })
}

pub(crate) fn news_prompt(catalog: &[Security]) -> String {
    let stock_info = catalog
        .iter()
        .map(|s| format!("{} ({}) in {}", s.symbol, s.name, s.sector))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "Generate a realistic breaking news headline and a short 2-sentence description for a fictional stock market. \
         Available companies: {stock_info}. \
         Randomly pick ONE company or a general market event. \
         Provide the impact (positive, negative, neutral) and which symbol it affects."
    )
}

pub(crate) fn analysis_prompt(security: &Security) -> String {
    format!(
        "Act as a senior market analyst. Provide a 2-sentence investment thesis for {} ({}) in the {} sector. Current price is ${:.2}.",
        security.name, security.symbol, security.sector, security.price
    )
}

impl NewsGenerator for GeminiDesk {
    async fn generate_news(&self, catalog: &[Security]) -> Result<NewsDraft, NewsError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": news_prompt(catalog) }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "headline": { "type": "STRING" },
                        "content": { "type": "STRING" },
                        "impact": { "type": "STRING", "enum": ["positive", "negative", "neutral"] },
                        "affectedSymbol": { "type": "STRING" }
                    },
                    "required": ["headline", "content", "impact", "affectedSymbol"]
                }
            }
        });
        let text = self.generate(body).await?;
        parse_news_payload(&text)
    }
}

impl AnalysisGenerator for GeminiDesk {
    async fn generate_analysis(&self, security: &Security) -> Result<String, NewsError> {
        let body = json!({
            "contents": [{ "parts": [{ "text": analysis_prompt(security) }] }]
        });
        let text = self.generate(body).await?;
        let text = text.trim();
        if text.is_empty() {
            Ok(EMPTY_ANALYSIS.to_string())
        } else {
            Ok(text.to_string())
        }
    }
}
