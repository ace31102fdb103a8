// ===============================
// src/config.rs
// ===============================
/*
=============================================================================
Project : stellar_trade - simulated stock-trading terminal in Rust
Module  : config.rs
Version : 0.1.0
Author  : Kukuh Tripamungkas Wicaksono (Kukuh TW)
License : MIT (see LICENSE)

Summary : Simulates a small catalog of fictional securities (random walk
          with news-driven trend bias), runs an average-cost paper ledger
          against virtual cash, feeds a synthetic news wire (mock/Gemini),
          exposes Prometheus metrics, and records JSONL events.

(c) 2025 Kukuh TW. All rights reserved where applicable.
=============================================================================
*/
use clap::Parser;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::catalog;

/// Sumber news wire
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NewsMode {
    Off,
    Mock,
    Gemini,
}

impl NewsMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" | "disabled" => Some(NewsMode::Off),
            "mock" | "offline" => Some(NewsMode::Mock),
            "gemini" | "ai" => Some(NewsMode::Gemini),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NewsMode::Off => "off",
            NewsMode::Mock => "mock",
            NewsMode::Gemini => "gemini",
        }
    }
}

/// Override dari command line (prioritas di atas ENV).
#[derive(Debug, Default, Parser)]
#[command(name = "stellar_trade", about = "Simulated stock-trading terminal")]
pub struct Cli {
    /// Seed for a reproducible price path
    #[arg(long)]
    pub seed: Option<u64>,
    /// News source: gemini | mock | off
    #[arg(long)]
    pub news_mode: Option<String>,
    /// Append JSONL events to this file
    #[arg(long)]
    pub record_file: Option<String>,
    /// Starting cash balance
    #[arg(long)]
    pub initial_cash: Option<f64>,
}

#[derive(Clone, Debug)]
pub struct Settings {
    // ledger
    pub initial_cash: f64,
    pub default_symbol: String,
    pub default_trade_shares: f64,

    // scheduling
    pub tick_interval: Duration,
    pub news_interval: Duration,

    // news desk
    pub news_mode: NewsMode,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub news_timeout: Duration,
    pub news_feed_len: usize,

    // simulator
    pub seed: Option<u64>,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

pub fn load() -> Settings {
    // Pastikan .env dibaca (agar GEMINI_API_KEY, RECORD_FILE, dll ter-load)
    let _ = dotenv();
    let mut settings = from_env();
    settings.apply_cli(Cli::parse());
    settings
}

pub fn from_env() -> Settings {
    // ===== Ledger =====
    let initial_cash = env_parse::<f64>("INITIAL_CASH")
        .filter(|c| c.is_finite() && *c >= 0.0)
        .unwrap_or(50_000.0);

    let default_symbol = env_non_empty("DEFAULT_SYMBOL")
        .map(|s| s.to_ascii_uppercase())
        .filter(|s| catalog::symbols().contains(&s.as_str()))
        .unwrap_or_else(|| "TECH".to_string());

    let default_trade_shares = env_parse::<f64>("DEFAULT_TRADE_SHARES")
        .filter(|n| n.is_finite() && *n >= 1.0)
        .unwrap_or(10.0);

    // ===== Scheduling =====
    let tick_interval = Duration::from_millis(
        env_parse::<u64>("TICK_INTERVAL_MS").filter(|ms| *ms > 0).unwrap_or(3_000),
    );
    let news_interval = Duration::from_millis(
        env_parse::<u64>("NEWS_INTERVAL_MS").filter(|ms| *ms > 0).unwrap_or(45_000),
    );

    // ===== News desk =====
    let gemini_api_key = env_non_empty("GEMINI_API_KEY").or_else(|| env_non_empty("API_KEY"));
    let default_mode = if gemini_api_key.is_some() { NewsMode::Gemini } else { NewsMode::Mock };
    let news_mode = env::var("NEWS_MODE")
        .ok()
        .and_then(|s| NewsMode::parse_one(&s))
        .unwrap_or(default_mode);

    let gemini_model =
        env_non_empty("GEMINI_MODEL").unwrap_or_else(|| "gemini-3-flash-preview".to_string());
    let gemini_base_url = env_non_empty("GEMINI_BASE_URL")
        .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string());
    let news_timeout = Duration::from_millis(
        env_parse::<u64>("NEWS_TIMEOUT_MS").filter(|ms| *ms > 0).unwrap_or(15_000),
    );
    let news_feed_len = env_parse::<usize>("NEWS_FEED_LEN").filter(|n| *n > 0).unwrap_or(10);

    Settings {
        initial_cash,
        default_symbol,
        default_trade_shares,
        tick_interval,
        news_interval,
        news_mode,
        gemini_api_key,
        gemini_model,
        gemini_base_url,
        news_timeout,
        news_feed_len,
        seed: env_parse("SIM_SEED"),
        record_file: env_non_empty("RECORD_FILE"),
        metrics_port: env_parse("METRICS_PORT").unwrap_or(9898),
    }
}

impl Settings {
    pub fn apply_cli(&mut self, cli: Cli) {
        if let Some(seed) = cli.seed {
            self.seed = Some(seed);
        }
        if let Some(mode) = cli.news_mode.as_deref().and_then(NewsMode::parse_one) {
            self.news_mode = mode;
        }
        if let Some(path) = cli.record_file {
            self.record_file = Some(path);
        }
        if let Some(cash) = cli.initial_cash.filter(|c| c.is_finite() && *c >= 0.0) {
            self.initial_cash = cash;
        }
    }

    /// Gemini tanpa key tidak bisa jalan -> turun ke mock.
    pub fn effective_news_mode(&self) -> NewsMode {
        match (&self.news_mode, &self.gemini_api_key) {
            (NewsMode::Gemini, None) => NewsMode::Mock,
            (mode, _) => mode.clone(),
        }
    }
}
