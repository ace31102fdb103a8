// ===============================
// src/news.rs (news desk, offline wire + fallbacks)
// ===============================
//
// Kolaborator eksternal untuk news wire & analisis:
// - NewsGenerator / AnalysisGenerator : capability trait, boleh gagal
// - news_or_fallback / analysis_or_fallback : pembungkus yang TIDAK pernah gagal
// - MockWire : generator offline (rand), dipakai saat NEWS_MODE=mock
// - NewsDesk : dispatch enum mock / gemini (lihat news_gemini.rs)
//

use chrono::Local;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::domain::{Impact, NewsDraft, NewsItem, Security};
use crate::metrics::COLLAB_FALLBACKS;
use crate::news_gemini::GeminiDesk;

pub const FALLBACK_HEADLINE: &str = "Market Volatility Continues";
pub const FALLBACK_CONTENT: &str =
    "Traders are watching the indices closely as economic data releases loom.";
pub const FALLBACK_ANALYSIS: &str =
    "The market is currently digesting new information. Stay tuned for further analysis.";

#[derive(Debug, Error)]
pub enum NewsError {
    #[error("news request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("news API error {status}: {body}")]
    Status { status: u16, body: String },
    #[error("news API returned empty content")]
    Empty,
    #[error("malformed news payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub trait NewsGenerator: Send + Sync {
    fn generate_news(
        &self,
        catalog: &[Security],
    ) -> impl Future<Output = Result<NewsDraft, NewsError>> + Send;
}

pub trait AnalysisGenerator: Send + Sync {
    fn generate_analysis(
        &self,
        security: &Security,
    ) -> impl Future<Output = Result<String, NewsError>> + Send;
}

pub fn fallback_draft() -> NewsDraft {
    NewsDraft {
        headline: FALLBACK_HEADLINE.to_string(),
        content: FALLBACK_CONTENT.to_string(),
        impact: Impact::Neutral,
        affected_symbol: None,
    }
}

/// Beri id & timestamp pada draft.
pub fn stamp(draft: NewsDraft) -> NewsItem {
    let id_bytes: [u8; 5] = rand::thread_rng().gen();
    NewsItem {
        id: hex::encode(id_bytes),
        timestamp: Local::now().format("%H:%M:%S").to_string(),
        headline: draft.headline,
        content: draft.content,
        impact: draft.impact,
        affected_symbol: draft.affected_symbol,
    }
}

pub async fn news_or_fallback<G: NewsGenerator>(
    generator: &G,
    catalog: &[Security],
    limit: Duration,
) -> NewsItem {
    let draft = match timeout(limit, generator.generate_news(catalog)).await {
        Ok(Ok(draft)) => draft,
        Ok(Err(e)) => {
            warn!(error = %e, "news generation failed, using fallback");
            COLLAB_FALLBACKS.with_label_values(&["news"]).inc();
            fallback_draft()
        }
        Err(_) => {
            warn!(?limit, "news generation timed out, using fallback");
            COLLAB_FALLBACKS.with_label_values(&["news"]).inc();
            fallback_draft()
        }
    };
    stamp(draft)
}

pub async fn analysis_or_fallback<G: AnalysisGenerator>(
    generator: &G,
    security: &Security,
    limit: Duration,
) -> String {
    match timeout(limit, generator.generate_analysis(security)).await {
        Ok(Ok(text)) => text,
        Ok(Err(e)) => {
            warn!(error = %e, symbol = %security.symbol, "analysis failed, using fallback");
            COLLAB_FALLBACKS.with_label_values(&["analysis"]).inc();
            FALLBACK_ANALYSIS.to_string()
        }
        Err(_) => {
            warn!(?limit, symbol = %security.symbol, "analysis timed out, using fallback");
            COLLAB_FALLBACKS.with_label_values(&["analysis"]).inc();
            FALLBACK_ANALYSIS.to_string()
        }
    }
}

// -----------------------------------------------------------------------------
// MockWire: headline kalengan, cukup untuk jalan tanpa network
// -----------------------------------------------------------------------------
const MARKET_EVENTS: [(&str, &str); 4] = [
    ("Central Bank Holds Rates Steady", "Policy makers left borrowing costs unchanged. Analysts expect a cautious tone through the quarter."),
    ("Trading Volume Spikes Across Exchanges", "Desks report heavy turnover in the opening hour. Liquidity remains ample despite the rush."),
    ("Bond Yields Edge Higher", "Treasury yields crept up on stronger payroll data. Equity traders are weighing the rate outlook."),
    ("Quarterly Options Expiry Looms", "Open interest is concentrated near current levels. Volatility desks expect choppy sessions."),
];

pub struct MockWire {
    rng: Mutex<StdRng>,
}

impl MockWire {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self { rng: Mutex::new(rng) }
    }

    fn draft(&self, catalog: &[Security]) -> NewsDraft {
        // lock poisoned -> tetap pakai isi rng-nya
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());

        // satu slot ekstra = general market event
        let pick = rng.gen_range(0..=catalog.len());
        let Some(sec) = catalog.get(pick) else {
            let (headline, content) = MARKET_EVENTS
                .choose(&mut *rng)
                .copied()
                .unwrap_or((FALLBACK_HEADLINE, FALLBACK_CONTENT));
            return NewsDraft {
                headline: headline.to_string(),
                content: content.to_string(),
                impact: Impact::Neutral,
                affected_symbol: None,
            };
        };

        let impact = [Impact::Positive, Impact::Negative, Impact::Neutral]
            .choose(&mut *rng)
            .copied()
            .unwrap_or_default();
        let (headline, content) = match impact {
            Impact::Positive => (
                format!("{} Beats Expectations as {} Demand Surges", sec.name, sec.sector),
                format!(
                    "{} reported results well ahead of guidance. Buy-side desks are rotating into {}.",
                    sec.name, sec.symbol
                ),
            ),
            Impact::Negative => (
                format!("{} Shares Slide After Regulatory Probe", sec.name),
                format!(
                    "Regulators opened an inquiry into {} operations. The {} sector is trading defensively.",
                    sec.name, sec.sector
                ),
            ),
            Impact::Neutral => (
                format!("{} Holds Steady Ahead of Investor Day", sec.name),
                format!(
                    "Management at {} declined to update guidance. Traders expect {} to track the broader market.",
                    sec.name, sec.symbol
                ),
            ),
        };
        NewsDraft { headline, content, impact, affected_symbol: Some(sec.symbol.clone()) }
    }
}

impl NewsGenerator for MockWire {
    async fn generate_news(&self, catalog: &[Security]) -> Result<NewsDraft, NewsError> {
        Ok(self.draft(catalog))
    }
}

impl AnalysisGenerator for MockWire {
    async fn generate_analysis(&self, security: &Security) -> Result<String, NewsError> {
        let stance = if security.trend > 0.05 {
            "Recent newsflow supports a constructive view, and momentum buyers are likely to stay involved."
        } else if security.trend < -0.05 {
            "Sentiment has turned cautious after recent headlines, so position sizing should stay conservative."
        } else {
            "Without a fresh catalyst the stock should trade with its sector, making it a reasonable core holding."
        };
        Ok(format!(
            "{} ({}) trades at ${:.2} with a solid footing in {}. {}",
            security.name, security.symbol, security.price, security.sector, stance
        ))
    }
}

// -----------------------------------------------------------------------------
// NewsDesk: pilihan runtime antara mock & gemini
// -----------------------------------------------------------------------------
pub enum NewsDesk {
    Mock(MockWire),
    Gemini(GeminiDesk),
}

impl NewsDesk {
    pub fn label(&self) -> &'static str {
        match self { NewsDesk::Mock(_) => "mock", NewsDesk::Gemini(_) => "gemini" }
    }
}

impl NewsGenerator for NewsDesk {
    async fn generate_news(&self, catalog: &[Security]) -> Result<NewsDraft, NewsError> {
        match self {
            NewsDesk::Mock(m) => m.generate_news(catalog).await,
            NewsDesk::Gemini(g) => g.generate_news(catalog).await,
        }
    }
}

impl AnalysisGenerator for NewsDesk {
    async fn generate_analysis(&self, security: &Security) -> Result<String, NewsError> {
        match self {
            NewsDesk::Mock(m) => m.generate_analysis(security).await,
            NewsDesk::Gemini(g) => g.generate_analysis(security).await,
        }
    }
}
