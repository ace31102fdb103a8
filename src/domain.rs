// ===============================
// src/domain.rs
// ===============================
use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Jumlah titik history yang disimpan per security.
pub const HISTORY_CAP: usize = 30;
/// Harga minimum; simulator tidak pernah turun di bawah ini.
pub const PRICE_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint { pub time: String, pub price: f64 }

/// One tradable instrument.
///
/// `change` / `change_percent` are only ever written by the simulator, so they
/// stay private and are exposed through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Security {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub description: String,
    pub price: f64,
    pub volatility: f64,
    pub trend: f64,
    pub(crate) change: f64,
    pub(crate) change_percent: f64,
    pub(crate) history: VecDeque<PricePoint>,
}

impl Security {
    pub fn new(
        symbol: &str,
        name: &str,
        sector: &str,
        description: &str,
        price: f64,
        volatility: f64,
        history: Vec<PricePoint>,
    ) -> Self {
        let price = price.max(PRICE_FLOOR);
        let mut history: VecDeque<PricePoint> = history.into();
        while history.len() > HISTORY_CAP {
            history.pop_front();
        }
        if history.is_empty() {
            history.push_back(PricePoint { time: "0:00".to_string(), price });
        }
        Self {
            symbol: symbol.to_string(),
            name: name.to_string(),
            sector: sector.to_string(),
            description: description.to_string(),
            price,
            volatility: volatility.max(0.0),
            trend: 0.0,
            change: 0.0,
            change_percent: 0.0,
            history,
        }
    }

    pub fn change(&self) -> f64 { self.change }
    pub fn change_percent(&self) -> f64 { self.change_percent }
    pub fn history(&self) -> &VecDeque<PricePoint> { &self.history }

    pub fn last_point(&self) -> Option<&PricePoint> { self.history.back() }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction { Buy, Sell }

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self { TradeAction::Buy => "buy", TradeAction::Sell => "sell" }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent { pub action: TradeAction, pub symbol: String, pub shares: f64 }

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position { pub symbol: String, pub shares: f64, pub average_price: f64 }

impl Position {
    pub fn market_value(&self, price: f64) -> f64 { self.shares * price }

    pub fn cost_basis(&self) -> f64 { self.shares * self.average_price }

    pub fn unrealized_pnl(&self, price: f64) -> f64 { self.market_value(price) - self.cost_basis() }

    /// Gain (or loss) that selling `shares` at `price` would lock in.
    pub fn realized_on(&self, shares: f64, price: f64) -> f64 { shares * (price - self.average_price) }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub cash: f64,
    pub positions: HashMap<String, Position>,
}

impl Portfolio {
    pub fn new(cash: f64) -> Self { Self { cash, positions: HashMap::new() } }

    pub fn position(&self, symbol: &str) -> Option<&Position> { self.positions.get(symbol) }

    /// Nilai seluruh saham; symbol yang tidak ada harganya dihitung 0.
    pub fn stock_value(&self, prices: &HashMap<String, f64>) -> f64 {
        self.positions
            .values()
            .map(|p| p.market_value(prices.get(&p.symbol).copied().unwrap_or(0.0)))
            .sum()
    }

    pub fn net_worth(&self, prices: &HashMap<String, f64>) -> f64 {
        self.cash + self.stock_value(prices)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    Positive,
    Negative,
    #[default]
    Neutral,
}

impl Impact {
    /// Unknown strings read as neutral.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Impact::Positive,
            "negative" => Impact::Negative,
            _ => Impact::Neutral,
        }
    }

    pub fn trend_delta(&self) -> f64 {
        match self { Impact::Positive => 0.4, Impact::Negative => -0.4, Impact::Neutral => 0.0 }
    }

    pub fn as_str(&self) -> &'static str {
        match self { Impact::Positive => "positive", Impact::Negative => "negative", Impact::Neutral => "neutral" }
    }
}

/// Output of a news generator before it is stamped with id/timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsDraft {
    pub headline: String,
    pub content: String,
    pub impact: Impact,
    pub affected_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub id: String,
    pub timestamp: String,
    pub headline: String,
    pub content: String,
    pub impact: Impact,
    pub affected_symbol: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub action: TradeAction,
    pub symbol: String,
    pub shares: f64,
    pub price: f64,
    pub notional: f64,
    /// Hanya terisi untuk sell.
    pub realized_pnl: Option<f64>,
    pub cash_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TradeOutcome { Filled(Fill), Rejected { reason: String, code: String } }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeReport { pub ts_ns: i128, pub intent: TradeIntent, pub outcome: TradeOutcome }

/// Read-only view published by the engine after every state change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub tick: u64,
    pub selected: String,
    pub securities: Vec<Security>,
    pub portfolio: Portfolio,
    pub news: Vec<NewsItem>,
}

impl MarketSnapshot {
    pub fn security(&self, symbol: &str) -> Option<&Security> {
        self.securities.iter().find(|s| s.symbol == symbol)
    }

    pub fn prices(&self) -> HashMap<String, f64> {
        self.securities.iter().map(|s| (s.symbol.clone(), s.price)).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Tick { ts_ns: i128, symbol: String, price: f64, trend: f64 },
    News(NewsItem),
    Trade(TradeReport),
    Note(String),
}
