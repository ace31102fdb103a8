// ===============================
// src/main.rs
// ===============================
/*
 # jalankan offline dengan seed tetap + journal
 NEWS_MODE=mock cargo run -- --seed 42 --record-file data/events.jsonl

 # konfigurasi yang aktif
curl -s localhost:9898/metrics | egrep '^config_(news_mode|symbol)'

# harga & portfolio
curl -s localhost:9898/metrics | grep '^security_price'
curl -s localhost:9898/metrics | egrep '^portfolio_(cash|net_worth)'

*/
/*
=============================================================================
Project : stellar_trade - simulated stock-trading terminal in Rust
Module  : main.rs
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
mod domain;
mod config;
mod metrics;
mod recorder;
mod catalog;
mod simulator;
mod ledger;
mod engine;
mod news;
mod news_gemini;      // Gemini generateContent client
mod posttrade;
mod terminal;

use rand::{rngs::StdRng, SeedableRng};
use std::sync::Arc;
use tokio::{
    select,
    sync::{mpsc, watch},
    time::{interval, timeout, Duration, MissedTickBehavior},
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::NewsMode;
use crate::domain::{Event, MarketSnapshot, NewsItem, TradeReport};
use crate::engine::{EngineCmd, Market};
use crate::news::{MockWire, NewsDesk};
use crate::news_gemini::GeminiDesk;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // ---- Load config ----
    let args = config::load();
    let news_mode = args.effective_news_mode();
    if news_mode != args.news_mode {
        warn!("NEWS_MODE=gemini but no GEMINI_API_KEY/API_KEY set, using mock wire");
    }

    // ---- Metrics ----
    metrics::init();
    if args.metrics_port != 0 {
        metrics::serve_metrics(args.metrics_port);
    }

    // ---- Human-friendly startup info + export config to metrics ----
    info!(
        news_mode = news_mode.as_str(),
        initial_cash = args.initial_cash,
        symbol = %args.default_symbol,
        tick_ms = args.tick_interval.as_millis() as u64,
        news_ms = args.news_interval.as_millis() as u64,
        seed = ?args.seed,
        record_file = ?args.record_file,
        "startup config"
    );
    crate::metrics::CONFIG_NEWS_MODE
        .with_label_values(&[news_mode.as_str()])
        .set(1);
    for s in catalog::symbols() {
        crate::metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }

    // ---- Market ----
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let securities = catalog::initial_securities(&mut rng);
    let market = Market::new(securities, args.initial_cash, args.news_feed_len, &args.default_symbol);
    let first_snapshot = market.snapshot();

    // ---- Buses ----
    let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCmd>(256);
    let (news_tx, news_rx) = mpsc::channel::<NewsItem>(64);
    let (report_tx, report_rx) = mpsc::channel::<TradeReport>(256);
    let (snap_tx, snap_rx) = watch::channel::<MarketSnapshot>(first_snapshot);

    // ---- Recorder (optional) ----
    let (rec_tx, rec_rx) = mpsc::channel::<Event>(8192);
    let rec_handle = if let Some(path) = args.record_file.clone() {
        let handle = tokio::spawn(recorder::run(rec_rx, path));
        let _ = rec_tx.try_send(Event::Note(format!(
            "session start news_mode={} cash={:.2} seed={:?}",
            news_mode.as_str(),
            args.initial_cash,
            args.seed
        )));
        Some(handle)
    } else {
        // tanpa journal: receiver di-drop, try_send cukup gagal diam-diam
        drop(rec_rx);
        None
    };

    // ---- Engine (single writer) ----
    tokio::spawn(engine::run(
        market,
        rng,
        args.tick_interval,
        cmd_rx,
        news_rx,
        snap_tx,
        report_tx,
        rec_tx.clone(),
    ));

    // ---- News desk ----
    let desk: Option<Arc<NewsDesk>> = match (&news_mode, &args.gemini_api_key) {
        (NewsMode::Off, _) => None,
        (NewsMode::Gemini, Some(key)) => Some(Arc::new(NewsDesk::Gemini(GeminiDesk::new(
            &args.gemini_base_url,
            &args.gemini_model,
            key,
            args.news_timeout,
        )))),
        _ => Some(Arc::new(NewsDesk::Mock(MockWire::new(args.seed)))),
    };

    if let Some(desk) = desk.clone() {
        info!(desk = desk.label(), model = %args.gemini_model, "news wire enabled");
        let snap_rx = snap_rx.clone();
        let every = args.news_interval;
        let limit = args.news_timeout;
        tokio::spawn(async move {
            // tick pertama langsung: satu berita saat start
            let mut timer = interval(every);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                timer.tick().await;
                let catalog = snap_rx.borrow().securities.clone();
                let item = news::news_or_fallback(desk.as_ref(), &catalog, limit).await;
                if news_tx.send(item).await.is_err() {
                    warn!("engine gone, news wire stopped");
                    break;
                }
            }
        });
    } else {
        info!("news wire disabled");
    }

    // ---- Post-Trade ----
    tokio::spawn(posttrade::run(report_rx, rec_tx));

    // ---- Terminal ----
    let term_cfg = terminal::TerminalCfg {
        default_shares: args.default_trade_shares,
        analysis_timeout: args.news_timeout,
    };
    select! {
        res = terminal::run(term_cfg, cmd_tx, snap_rx, desk) => {
            if let Err(e) = res {
                error!(?e, "terminal input failed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("ctrl-c received");
        }
    }
    // terminal selesai -> cmd_tx ter-drop -> engine & posttrade berhenti -> journal di-flush
    info!("shutting down");
    if let Some(handle) = rec_handle {
        if timeout(Duration::from_secs(2), handle).await.is_err() {
            warn!("recorder did not finish in time");
        }
    }
    // stdin reader berjalan di blocking thread; jangan tunggu sampai Enter ditekan
    std::process::exit(0);
}
