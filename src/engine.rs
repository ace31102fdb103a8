// ===============================
// src/engine.rs (single writer: securities + portfolio + news feed)
// ===============================
//
// Satu-satunya task yang boleh mengubah state pasar. Task lain cukup kirim
// EngineCmd / NewsItem lewat channel dan membaca MarketSnapshot dari watch.
//

use ahash::AHashMap as HashMap;
use chrono::Utc;
use rand::{rngs::StdRng, Rng};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::domain::{
    Event, Fill, MarketSnapshot, NewsItem, Portfolio, Security, TradeAction, TradeIntent,
    TradeOutcome, TradeReport,
};
use crate::ledger::{self, LedgerError};
use crate::metrics::{
    CASH, NET_WORTH, NEWS, PNL_UNREALIZED, PRICE, TICKS, TICKS_BY_SYMBOL, TRADES, TRADE_REJECTS,
    TREND,
};
use crate::simulator;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TradeError {
    #[error("Unknown symbol {0}")]
    UnknownSymbol(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl TradeError {
    pub fn code(&self) -> &'static str {
        match self {
            TradeError::UnknownSymbol(_) => "unknown_symbol",
            TradeError::Ledger(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineCmd {
    Trade(TradeIntent),
    Select(String),
}

pub struct Market {
    securities: Vec<Security>,
    index: HashMap<String, usize>,
    portfolio: Portfolio,
    news: VecDeque<NewsItem>,
    news_cap: usize,
    selected: String,
    tick: u64,
}

impl Market {
    pub fn new(securities: Vec<Security>, initial_cash: f64, news_cap: usize, selected: &str) -> Self {
        let index = securities
            .iter()
            .enumerate()
            .map(|(i, s)| (s.symbol.clone(), i))
            .collect::<HashMap<_, _>>();
        let selected = if index.contains_key(selected) {
            selected.to_string()
        } else {
            securities.first().map(|s| s.symbol.clone()).unwrap_or_default()
        };
        Self {
            securities,
            index,
            portfolio: Portfolio::new(initial_cash),
            news: VecDeque::with_capacity(news_cap),
            news_cap: news_cap.max(1),
            selected,
            tick: 0,
        }
    }

    pub fn security(&self, symbol: &str) -> Option<&Security> {
        self.index.get(symbol).map(|&i| &self.securities[i])
    }

    pub fn securities(&self) -> &[Security] { &self.securities }
    pub fn portfolio(&self) -> &Portfolio { &self.portfolio }
    pub fn tick_count(&self) -> u64 { self.tick }

    pub fn prices(&self) -> HashMap<String, f64> {
        self.securities.iter().map(|s| (s.symbol.clone(), s.price)).collect()
    }

    /// Urutan update antar security tidak berpengaruh; tiap security independen.
    pub fn tick_all<R: Rng + ?Sized>(&mut self, rng: &mut R, time: &str) {
        for sec in self.securities.iter_mut() {
            *sec = simulator::advance_tick(sec, rng, time);
        }
        self.tick += 1;
    }

    /// Simpan news (terbaru di depan) dan terapkan impact kalau symbolnya dikenal.
    pub fn ingest_news(&mut self, item: NewsItem) -> bool {
        let mut applied = false;
        if let Some(sym) = item.affected_symbol.as_deref() {
            match self.index.get(sym) {
                Some(&i) => {
                    self.securities[i] = simulator::apply_news_impact(&self.securities[i], item.impact);
                    applied = true;
                }
                None => warn!(symbol = %sym, "news names a symbol outside the catalog, impact ignored"),
            }
        }
        self.news.push_front(item);
        self.news.truncate(self.news_cap);
        applied
    }

    pub fn execute(&mut self, intent: &TradeIntent) -> Result<Fill, TradeError> {
        let sec = self
            .security(&intent.symbol)
            .ok_or_else(|| TradeError::UnknownSymbol(intent.symbol.clone()))?;
        let price = sec.price;

        let (next, realized_pnl) = match intent.action {
            TradeAction::Buy => (ledger::buy(&self.portfolio, &intent.symbol, intent.shares, price)?, None),
            TradeAction::Sell => {
                let realized = self
                    .portfolio
                    .position(&intent.symbol)
                    .map(|p| p.realized_on(intent.shares, price));
                (ledger::sell(&self.portfolio, &intent.symbol, intent.shares, price)?, realized)
            }
        };
        self.portfolio = next;

        Ok(Fill {
            action: intent.action,
            symbol: intent.symbol.clone(),
            shares: intent.shares,
            price,
            notional: intent.shares * price,
            realized_pnl,
            cash_after: self.portfolio.cash,
        })
    }

    pub fn select(&mut self, symbol: &str) -> Result<(), TradeError> {
        if !self.index.contains_key(symbol) {
            return Err(TradeError::UnknownSymbol(symbol.to_string()));
        }
        self.selected = symbol.to_string();
        Ok(())
    }

    pub fn snapshot(&self) -> MarketSnapshot {
        MarketSnapshot {
            tick: self.tick,
            selected: self.selected.clone(),
            securities: self.securities.clone(),
            portfolio: self.portfolio.clone(),
            news: self.news.iter().cloned().collect(),
        }
    }

    fn unrealized_pnl(&self) -> f64 {
        self.portfolio
            .positions
            .values()
            .filter_map(|p| self.security(&p.symbol).map(|s| p.unrealized_pnl(s.price)))
            .sum()
    }
}

fn now_ns() -> i128 {
    Utc::now().timestamp_nanos_opt().unwrap_or(0) as i128
}

fn publish_portfolio_metrics(market: &Market) {
    CASH.set(market.portfolio.cash);
    NET_WORTH.set(market.portfolio.net_worth(&market.prices()));
    PNL_UNREALIZED.set(market.unrealized_pnl());
}

fn handle_trade(market: &mut Market, intent: TradeIntent) -> TradeReport {
    let outcome = match market.execute(&intent) {
        Ok(fill) => {
            TRADES.with_label_values(&[fill.action.as_str(), &fill.symbol]).inc();
            TradeOutcome::Filled(fill)
        }
        Err(e) => {
            TRADE_REJECTS.with_label_values(&[e.code()]).inc();
            TradeOutcome::Rejected { reason: e.to_string(), code: e.code().to_string() }
        }
    };
    publish_portfolio_metrics(market);
    TradeReport { ts_ns: now_ns(), intent, outcome }
}

/// Engine loop: tick timer + trade commands + news arrivals.
#[allow(clippy::too_many_arguments)]
pub async fn run(
    mut market: Market,
    mut rng: StdRng,
    tick_every: Duration,
    mut cmd_rx: mpsc::Receiver<EngineCmd>,
    mut news_rx: mpsc::Receiver<NewsItem>,
    snap_tx: watch::Sender<MarketSnapshot>,
    report_tx: mpsc::Sender<TradeReport>,
    rec_tx: mpsc::Sender<Event>,
) {
    let mut ticker = interval(tick_every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await; // tick pertama langsung selesai; harga baru setelah 1 interval

    publish_portfolio_metrics(&market);
    let _ = snap_tx.send(market.snapshot());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                market.tick_all(&mut rng, &simulator::time_label());
                let ts_ns = now_ns();
                for sec in market.securities() {
                    TICKS.inc();
                    TICKS_BY_SYMBOL.with_label_values(&[&sec.symbol]).inc();
                    PRICE.with_label_values(&[&sec.symbol]).set(sec.price);
                    TREND.with_label_values(&[&sec.symbol]).set(sec.trend);
                    debug!(symbol = %sec.symbol, price = sec.price, trend = sec.trend, "tick");
                    let _ = rec_tx.try_send(Event::Tick {
                        ts_ns,
                        symbol: sec.symbol.clone(),
                        price: sec.price,
                        trend: sec.trend,
                    });
                }
                publish_portfolio_metrics(&market);
                info!(
                    tick = market.tick_count(),
                    cash = market.portfolio().cash,
                    net_worth = market.portfolio().net_worth(&market.prices()),
                    "heartbeat"
                );
            }
            Some(item) = news_rx.recv() => {
                let applied = market.ingest_news(item.clone());
                NEWS.with_label_values(&[item.impact.as_str(), if applied { "yes" } else { "no" }]).inc();
                info!(
                    headline = %item.headline,
                    impact = item.impact.as_str(),
                    symbol = ?item.affected_symbol,
                    applied,
                    "news"
                );
                let _ = rec_tx.try_send(Event::News(item));
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(EngineCmd::Trade(intent)) => {
                        let report = handle_trade(&mut market, intent);
                        if let Err(e) = report_tx.send(report).await {
                            warn!(?e, "trade report dropped");
                        }
                    }
                    Some(EngineCmd::Select(symbol)) => {
                        if let Err(e) = market.select(&symbol) {
                            warn!(error = %e, "select ignored");
                        }
                    }
                    None => {
                        info!("command channel closed, engine stopped");
                        break;
                    }
                }
            }
        }
        let _ = snap_tx.send(market.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Impact, PricePoint};
    use rand::SeedableRng;

    fn market() -> Market {
        let secs = vec![
            Security::new("TECH", "TechnoCore Systems", "Technology", "", 150.25, 0.02, vec![
                PricePoint { time: "0:00".into(), price: 150.0 },
            ]),
            Security::new("ZEN", "Zenith BioMed", "Healthcare", "", 85.4, 0.035, vec![]),
        ];
        Market::new(secs, 50_000.0, 3, "TECH")
    }

    fn news(symbol: Option<&str>, impact: Impact, id: &str) -> NewsItem {
        NewsItem {
            id: id.into(),
            timestamp: "12:00:00".into(),
            headline: "h".into(),
            content: "c".into(),
            impact,
            affected_symbol: symbol.map(str::to_string),
        }
    }

    fn intent(action: TradeAction, symbol: &str, shares: f64) -> TradeIntent {
        TradeIntent { action, symbol: symbol.into(), shares }
    }

    #[test]
    fn trades_use_current_market_price() {
        let mut m = market();
        let fill = m.execute(&intent(TradeAction::Buy, "TECH", 10.0)).unwrap();
        assert_eq!(fill.price, 150.25);
        assert!((fill.cash_after - 48_497.5).abs() < 1e-9);
        assert_eq!(fill.realized_pnl, None);

        let fill = m.execute(&intent(TradeAction::Sell, "TECH", 4.0)).unwrap();
        assert_eq!(fill.realized_pnl, Some(0.0));
        assert!((m.portfolio().position("TECH").unwrap().shares - 6.0).abs() < 1e-9);
    }

    #[test]
    fn rejected_trades_leave_portfolio_alone() {
        let mut m = market();
        let before = m.portfolio().clone();

        let err = m.execute(&intent(TradeAction::Buy, "TECH", 1_000.0)).unwrap_err();
        assert_eq!(err.code(), "insufficient_funds");
        let err = m.execute(&intent(TradeAction::Sell, "ZEN", 1.0)).unwrap_err();
        assert_eq!(err.code(), "no_position");
        let err = m.execute(&intent(TradeAction::Buy, "NOPE", 1.0)).unwrap_err();
        assert_eq!(err, TradeError::UnknownSymbol("NOPE".into()));

        assert_eq!(m.portfolio(), &before);
    }

    #[test]
    fn news_applies_only_to_known_symbols() {
        let mut m = market();
        assert!(m.ingest_news(news(Some("ZEN"), Impact::Positive, "a")));
        assert!((m.security("ZEN").unwrap().trend - 0.4).abs() < 1e-12);

        assert!(!m.ingest_news(news(Some("GHOST"), Impact::Negative, "b")));
        assert!(!m.ingest_news(news(None, Impact::Negative, "c")));
        assert_eq!(m.security("TECH").unwrap().trend, 0.0);
    }

    #[test]
    fn news_feed_is_newest_first_and_bounded() {
        let mut m = market();
        for id in ["1", "2", "3", "4"] {
            m.ingest_news(news(None, Impact::Neutral, id));
        }
        let ids: Vec<String> = m.snapshot().news.into_iter().map(|n| n.id).collect();
        assert_eq!(ids, vec!["4", "3", "2"]);
    }

    #[test]
    fn tick_all_advances_every_security() {
        let mut m = market();
        let mut rng = StdRng::seed_from_u64(8);
        m.tick_all(&mut rng, "t1");
        m.tick_all(&mut rng, "t2");
        assert_eq!(m.tick_count(), 2);
        for s in m.securities() {
            assert_eq!(s.last_point().map(|p| p.time.as_str()), Some("t2"));
            assert_eq!(s.last_point().map(|p| p.price), Some(s.price));
        }
    }

    #[test]
    fn select_validates_symbol() {
        let mut m = market();
        m.select("ZEN").unwrap();
        assert_eq!(m.snapshot().selected, "ZEN");
        assert!(m.select("nope").is_err());
        assert_eq!(m.snapshot().selected, "ZEN");

        let fallback = Market::new(market().securities().to_vec(), 1.0, 1, "MISSING");
        assert_eq!(fallback.snapshot().selected, "TECH");
    }

    #[tokio::test]
    async fn run_loop_reports_trades_and_stops_when_commands_close() {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (news_tx, news_rx) = mpsc::channel(8);
        let (snap_tx, mut snap_rx) = watch::channel(MarketSnapshot::default());
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let (rec_tx, _rec_rx) = mpsc::channel(64);

        let handle = tokio::spawn(run(
            market(),
            StdRng::seed_from_u64(1),
            Duration::from_millis(10),
            cmd_rx,
            news_rx,
            snap_tx,
            report_tx,
            rec_tx,
        ));

        news_tx.send(news(Some("TECH"), Impact::Positive, "n1")).await.unwrap();
        cmd_tx.send(EngineCmd::Trade(intent(TradeAction::Buy, "ZEN", 2.0))).await.unwrap();
        let report = report_rx.recv().await.unwrap();
        assert!(matches!(report.outcome, TradeOutcome::Filled(_)));

        cmd_tx.send(EngineCmd::Trade(intent(TradeAction::Sell, "TECH", 1.0))).await.unwrap();
        let report = report_rx.recv().await.unwrap();
        match report.outcome {
            TradeOutcome::Rejected { code, .. } => assert_eq!(code, "no_position"),
            other => panic!("unexpected outcome: {other:?}"),
        }

        // tunggu sampai minimal satu tick terjadi dan news sudah masuk feed
        loop {
            snap_rx.changed().await.unwrap();
            let snap = snap_rx.borrow();
            if snap.tick > 0 && snap.news.iter().any(|n| n.id == "n1") {
                break;
            }
        }

        drop(cmd_tx);
        handle.await.unwrap();
    }
}
