// ===============================
// src/terminal.rs (line-oriented trading terminal)
// ===============================
//
// Baca perintah dari stdin, kirim intent ke engine, render snapshot ke stdout.
// Perintah:
//   buy [SYM] [N] | sell [SYM] [N] | select SYM | quotes | portfolio | news
//   analyze [SYM] | help | quit
// SYM default = symbol terpilih, N default = DEFAULT_TRADE_SHARES (min 1).
//

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::{mpsc, watch},
};
use tracing::{info, warn};

use crate::domain::{MarketSnapshot, Security, TradeAction, TradeIntent, TradeOutcome, TradeReport};
use crate::engine::EngineCmd;
use crate::news::{analysis_or_fallback, NewsDesk, FALLBACK_ANALYSIS};

pub const HELP: &str = "\
commands:
  buy [SYM] [N]     buy N shares (defaults: selected symbol, configured size)
  sell [SYM] [N]    sell N shares
  select SYM        switch the selected symbol (requests an analysis)
  quotes | q        market overview
  portfolio | p     cash, net worth and open positions
  news | n          market wire
  analyze [SYM]     analyst thesis for a symbol
  help | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Trade { action: TradeAction, symbol: Option<String>, shares: Option<f64> },
    Select(String),
    Quotes,
    Portfolio,
    News,
    Analyze(Option<String>),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}' (try 'help')")]
    Unknown(String),
    #[error("invalid share count '{0}'")]
    BadShares(String),
    #[error("usage: select SYM")]
    MissingSymbol,
}

fn parse_trade(action: TradeAction, args: &[&str]) -> Result<Command, ParseError> {
    let mut symbol = None;
    let mut shares = None;
    for a in args {
        if a.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '.') {
            let n: f64 = a.parse().map_err(|_| ParseError::BadShares(a.to_string()))?;
            if !n.is_finite() {
                return Err(ParseError::BadShares(a.to_string()));
            }
            // sama seperti input UI: minimal 1 share
            shares = Some(n.max(1.0));
        } else {
            symbol = Some(a.to_ascii_uppercase());
        }
    }
    Ok(Command::Trade { action, symbol, shares })
}

pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let Some((verb, args)) = tokens.split_first() else {
        return Err(ParseError::Empty);
    };
    match verb.to_ascii_lowercase().as_str() {
        "buy" | "b" => parse_trade(TradeAction::Buy, args),
        "sell" | "s" => parse_trade(TradeAction::Sell, args),
        "select" | "sel" => args
            .first()
            .map(|s| Command::Select(s.to_ascii_uppercase()))
            .ok_or(ParseError::MissingSymbol),
        "quotes" | "q" => Ok(Command::Quotes),
        "portfolio" | "p" => Ok(Command::Portfolio),
        "news" | "n" => Ok(Command::News),
        "analyze" | "a" => Ok(Command::Analyze(args.first().map(|s| s.to_ascii_uppercase()))),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(ParseError::Unknown(other.to_string())),
    }
}

pub fn to_intent(
    action: TradeAction,
    symbol: Option<String>,
    shares: Option<f64>,
    selected: &str,
    default_shares: f64,
) -> TradeIntent {
    TradeIntent {
        action,
        symbol: symbol.unwrap_or_else(|| selected.to_string()),
        shares: shares.unwrap_or(default_shares),
    }
}

/// 48497.5 -> "48,497.50"
pub fn fmt_money(v: f64) -> String {
    let s = format!("{:.2}", v.abs());
    let (int_part, frac) = s.split_once('.').unwrap_or((s.as_str(), "00"));
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let sign = if v < 0.0 && s != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

fn fmt_shares(n: f64) -> String {
    if n.fract() == 0.0 { format!("{n:.0}") } else { format!("{n:.4}") }
}

pub fn render_quotes(snap: &MarketSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "   {:<6} {:>10} {:>9} {:>8} {:>7}", "SYMBOL", "PRICE", "CHANGE", "CHG%", "TREND");
    for s in &snap.securities {
        let marker = if s.symbol == snap.selected { '>' } else { ' ' };
        let _ = writeln!(
            out,
            " {marker} {:<6} {:>10} {:>+9.2} {:>+7.2}% {:>+7.3}",
            s.symbol,
            fmt_money(s.price),
            s.change(),
            s.change_percent(),
            s.trend
        );
    }
    if let Some(sel) = snap.security(&snap.selected) {
        let _ = writeln!(out, "   {}: {} ({})", sel.symbol, sel.name, sel.sector);
        let _ = write!(out, "   {}", sparkline(sel));
    }
    out
}

const BARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Satu karakter per titik history, diskalakan ke min..max.
pub fn sparkline(security: &Security) -> String {
    let prices: Vec<f64> = security.history().iter().map(|p| p.price).collect();
    let lo = prices.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = prices.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let span = hi - lo;
    prices
        .iter()
        .map(|p| {
            if span <= f64::EPSILON {
                BARS[3]
            } else {
                let idx = ((p - lo) / span * (BARS.len() - 1) as f64).round() as usize;
                BARS[idx.min(BARS.len() - 1)]
            }
        })
        .collect()
}

pub fn render_portfolio(snap: &MarketSnapshot) -> String {
    let prices = snap.prices();
    let pf = &snap.portfolio;
    let mut out = String::new();
    let _ = writeln!(out, "Cash Balance ${}", fmt_money(pf.cash));
    let _ = writeln!(out, "Net Worth    ${}", fmt_money(pf.net_worth(&prices)));

    let mut open: Vec<_> = pf.positions.values().filter(|p| p.shares > 0.0).collect();
    open.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    if open.is_empty() {
        let _ = write!(out, "No positions yet. Start trading!");
        return out;
    }
    let _ = writeln!(out, "{:<6} {:>8} {:>10} {:>12} {:>11}", "SYMBOL", "SHARES", "AVG", "VALUE", "P/L");
    for p in open {
        // symbol di luar catalog tidak ditampilkan
        let Some(price) = prices.get(&p.symbol).copied() else { continue };
        let pnl = p.unrealized_pnl(price);
        let _ = writeln!(
            out,
            "{:<6} {:>8} {:>10} {:>12} {:>1}{:>10}",
            p.symbol,
            fmt_shares(p.shares),
            fmt_money(p.average_price),
            fmt_money(p.market_value(price)),
            if pnl >= 0.0 { "+" } else { "-" },
            fmt_money(pnl.abs()),
        );
    }
    out.trim_end().to_string()
}

pub fn render_news(snap: &MarketSnapshot) -> String {
    if snap.news.is_empty() {
        return "Waiting for news broadcast...".to_string();
    }
    let mut out = String::new();
    for n in &snap.news {
        let tag = n.affected_symbol.as_deref().map(|s| format!(" [{s}]")).unwrap_or_default();
        let _ = writeln!(out, "{} {:<8}{} {}", n.timestamp, n.impact.as_str(), tag, n.headline);
        let _ = writeln!(out, "    {}", n.content);
    }
    out.trim_end().to_string()
}

pub fn render_report(report: &TradeReport) -> String {
    let i = &report.intent;
    match &report.outcome {
        TradeOutcome::Filled(f) => {
            let realized = f
                .realized_pnl
                .map(|r| format!(", realized {}{}", if r >= 0.0 { "+" } else { "-" }, fmt_money(r.abs())))
                .unwrap_or_default();
            format!(
                "FILLED {} {} {} @ ${} (total ${}{}), cash ${}",
                f.action.as_str().to_ascii_uppercase(),
                fmt_shares(f.shares),
                f.symbol,
                fmt_money(f.price),
                fmt_money(f.notional),
                realized,
                fmt_money(f.cash_after)
            )
        }
        TradeOutcome::Rejected { reason, .. } => format!(
            "REJECTED {} {} {}: {}",
            i.action.as_str().to_ascii_uppercase(),
            fmt_shares(i.shares),
            i.symbol,
            reason
        ),
    }
}

#[derive(Clone)]
pub struct TerminalCfg {
    pub default_shares: f64,
    pub analysis_timeout: Duration,
}

fn spawn_analysis(desk: Option<Arc<NewsDesk>>, security: Security, limit: Duration) {
    println!("Consulting analyst tools...");
    tokio::spawn(async move {
        let text = match desk {
            Some(d) => analysis_or_fallback(d.as_ref(), &security, limit).await,
            None => FALLBACK_ANALYSIS.to_string(),
        };
        println!("[{}] \"{}\"", security.symbol, text);
    });
}

/// State terminal: symbol terpilih dipegang lokal, tidak menunggu snapshot engine.
pub struct Session {
    cfg: TerminalCfg,
    cmd_tx: mpsc::Sender<EngineCmd>,
    desk: Option<Arc<NewsDesk>>,
    selected: String,
}

impl Session {
    pub fn new(
        cfg: TerminalCfg,
        cmd_tx: mpsc::Sender<EngineCmd>,
        desk: Option<Arc<NewsDesk>>,
        selected: String,
    ) -> Self {
        Self { cfg, cmd_tx, desk, selected }
    }

    pub fn selected(&self) -> &str {
        &self.selected
    }

    /// Proses satu perintah. `false` = terminal berhenti.
    pub async fn handle(&mut self, cmd: Command, snap: &MarketSnapshot) -> bool {
        match cmd {
            Command::Trade { action, symbol, shares } => {
                let intent = to_intent(action, symbol, shares, &self.selected, self.cfg.default_shares);
                if self.cmd_tx.send(EngineCmd::Trade(intent)).await.is_err() {
                    warn!("engine gone, terminal stopping");
                    return false;
                }
            }
            Command::Select(sym) => match snap.security(&sym).cloned() {
                Some(sec) => {
                    if self.cmd_tx.send(EngineCmd::Select(sym.clone())).await.is_err() {
                        warn!("engine gone, terminal stopping");
                        return false;
                    }
                    self.selected = sym;
                    spawn_analysis(self.desk.clone(), sec, self.cfg.analysis_timeout);
                }
                None => println!("unknown symbol {sym}"),
            },
            Command::Quotes => {
                let mut view = snap.clone();
                view.selected = self.selected.clone();
                println!("{}", render_quotes(&view));
            }
            Command::Portfolio => println!("{}", render_portfolio(snap)),
            Command::News => println!("{}", render_news(snap)),
            Command::Analyze(sym) => {
                let sym = sym.unwrap_or_else(|| self.selected.clone());
                match snap.security(&sym).cloned() {
                    Some(sec) => spawn_analysis(self.desk.clone(), sec, self.cfg.analysis_timeout),
                    None => println!("unknown symbol {sym}"),
                }
            }
            Command::Help => println!("{HELP}"),
            Command::Quit => {
                info!("quit requested");
                return false;
            }
        }
        true
    }
}

/// Loop stdin. Selesai saat `quit`; EOF juga mengakhiri loop.
pub async fn run(
    cfg: TerminalCfg,
    cmd_tx: mpsc::Sender<EngineCmd>,
    snap_rx: watch::Receiver<MarketSnapshot>,
    desk: Option<Arc<NewsDesk>>,
) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("{HELP}");

    // analisis awal untuk symbol terpilih
    let (selected, first) = {
        let snap = snap_rx.borrow();
        (snap.selected.clone(), snap.security(&snap.selected).cloned())
    };
    if let Some(sec) = first {
        spawn_analysis(desk.clone(), sec, cfg.analysis_timeout);
    }
    let mut session = Session::new(cfg, cmd_tx, desk, selected);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let cmd = match parse_command(&line) {
            Ok(c) => c,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };

        let snap = snap_rx.borrow().clone();
        if !session.handle(cmd, &snap).await {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Fill, Impact, NewsItem, Portfolio, Position, PricePoint};

    fn snap() -> MarketSnapshot {
        let mut pf = Portfolio::new(48_497.5);
        pf.positions.insert("TECH".into(), Position { symbol: "TECH".into(), shares: 10.0, average_price: 150.25 });
        pf.positions.insert("ZEN".into(), Position { symbol: "ZEN".into(), shares: 0.0, average_price: 80.0 });
        let mut tech = Security::new("TECH", "TechnoCore Systems", "Technology", "", 160.0, 0.02, vec![]);
        tech.trend = 0.4;
        MarketSnapshot {
            tick: 1,
            selected: "TECH".into(),
            securities: vec![tech, Security::new("ZEN", "Zenith BioMed", "Healthcare", "", 85.4, 0.035, vec![])],
            portfolio: pf,
            news: vec![],
        }
    }

    #[test]
    fn parses_trade_commands_in_any_order() {
        assert_eq!(
            parse_command("buy tech 5").unwrap(),
            Command::Trade { action: TradeAction::Buy, symbol: Some("TECH".into()), shares: Some(5.0) }
        );
        assert_eq!(
            parse_command("SELL 2.5 zen").unwrap(),
            Command::Trade { action: TradeAction::Sell, symbol: Some("ZEN".into()), shares: Some(2.5) }
        );
        assert_eq!(
            parse_command("b").unwrap(),
            Command::Trade { action: TradeAction::Buy, symbol: None, shares: None }
        );
    }

    #[test]
    fn share_counts_are_clamped_to_one() {
        match parse_command("buy TECH -3").unwrap() {
            Command::Trade { shares, .. } => assert_eq!(shares, Some(1.0)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(parse_command("buy TECH 1x"), Err(ParseError::BadShares("1x".into())));
    }

    #[test]
    fn parses_views_and_errors() {
        assert_eq!(parse_command("q").unwrap(), Command::Quotes);
        assert_eq!(parse_command("portfolio").unwrap(), Command::Portfolio);
        assert_eq!(parse_command("select auto").unwrap(), Command::Select("AUTO".into()));
        assert_eq!(parse_command("select"), Err(ParseError::MissingSymbol));
        assert_eq!(parse_command("analyze").unwrap(), Command::Analyze(None));
        assert_eq!(parse_command("   "), Err(ParseError::Empty));
        assert_eq!(parse_command("short TECH"), Err(ParseError::Unknown("short".into())));
    }

    #[test]
    fn intent_defaults_to_selection_and_size() {
        let i = to_intent(TradeAction::Buy, None, None, "ZEN", 10.0);
        assert_eq!(i, TradeIntent { action: TradeAction::Buy, symbol: "ZEN".into(), shares: 10.0 });
    }

    #[tokio::test]
    async fn trade_after_select_uses_new_symbol_before_engine_catches_up() {
        use crate::engine::{self, Market};
        use rand::{rngs::StdRng, SeedableRng};

        let market = Market::new(snap().securities, 50_000.0, 5, "TECH");
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let (_news_tx, news_rx) = mpsc::channel(8);
        let (snap_tx, snap_rx) = watch::channel(market.snapshot());
        let (report_tx, mut report_rx) = mpsc::channel(8);
        let (rec_tx, _rec_rx) = mpsc::channel(64);
        let engine = tokio::spawn(engine::run(
            market,
            StdRng::seed_from_u64(4),
            Duration::from_secs(60),
            cmd_rx,
            news_rx,
            snap_tx,
            report_tx,
            rec_tx,
        ));

        let cfg = TerminalCfg { default_shares: 10.0, analysis_timeout: Duration::from_millis(50) };
        let mut session = Session::new(cfg, cmd_tx, None, "TECH".into());

        // snapshot sengaja dibaca sebelum engine memproses Select
        let stale = snap_rx.borrow().clone();
        assert!(session.handle(Command::Select("ZEN".into()), &stale).await);
        assert_eq!(session.selected(), "ZEN");
        let buy = Command::Trade { action: TradeAction::Buy, symbol: None, shares: None };
        assert!(session.handle(buy, &stale).await);

        let report = report_rx.recv().await.unwrap();
        assert_eq!(report.intent.symbol, "ZEN");
        match report.outcome {
            TradeOutcome::Filled(f) => assert_eq!(f.symbol, "ZEN"),
            other => panic!("unexpected {other:?}"),
        }

        // select symbol asing tidak mengubah pilihan
        assert!(session.handle(Command::Select("NOPE".into()), &stale).await);
        assert_eq!(session.selected(), "ZEN");

        drop(session);
        engine.await.unwrap();
    }

    #[tokio::test]
    async fn select_stops_session_when_engine_is_gone() {
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        drop(cmd_rx);
        let cfg = TerminalCfg { default_shares: 1.0, analysis_timeout: Duration::from_millis(50) };
        let mut session = Session::new(cfg, cmd_tx, None, "TECH".into());
        assert!(!session.handle(Command::Select("ZEN".into()), &snap()).await);
        assert_eq!(session.selected(), "TECH");
    }

    #[test]
    fn money_formatting_groups_thousands() {
        assert_eq!(fmt_money(48_497.5), "48,497.50");
        assert_eq!(fmt_money(0.0), "0.00");
        assert_eq!(fmt_money(999.999), "1,000.00");
        assert_eq!(fmt_money(-1_234_567.891), "-1,234,567.89");
        assert_eq!(fmt_money(12.45), "12.45");
    }

    #[test]
    fn portfolio_view_hides_closed_positions() {
        let text = render_portfolio(&snap());
        assert!(text.contains("Cash Balance $48,497.50"));
        // 48497.5 + 10 * 160
        assert!(text.contains("Net Worth    $50,097.50"));
        // (160 - 150.25) * 10
        let row = text.lines().find(|l| l.starts_with("TECH")).unwrap();
        assert!(row.contains("1,600.00"));
        assert!(row.ends_with("+     97.50"));
        assert!(!text.contains("ZEN"));

        let mut empty = snap();
        empty.portfolio = Portfolio::new(50_000.0);
        assert!(render_portfolio(&empty).ends_with("No positions yet. Start trading!"));
    }

    #[test]
    fn quotes_mark_selected_symbol() {
        let text = render_quotes(&snap());
        assert!(text.lines().any(|l| l.starts_with(" > TECH")));
        assert!(text.lines().any(|l| l.starts_with("   ZEN")));
        assert!(text.contains("TechnoCore Systems"));
    }

    #[test]
    fn sparkline_scales_history() {
        let sec = Security::new("X", "X", "S", "", 3.0, 0.0, vec![
            PricePoint { time: "a".into(), price: 1.0 },
            PricePoint { time: "b".into(), price: 2.0 },
            PricePoint { time: "c".into(), price: 3.0 },
        ]);
        assert_eq!(sparkline(&sec), "▁▅█");
        let flat = Security::new("Y", "Y", "S", "", 5.0, 0.0, vec![]);
        assert_eq!(sparkline(&flat), "▄");
    }

    #[test]
    fn news_view_shows_placeholder_then_items() {
        let mut s = snap();
        assert_eq!(render_news(&s), "Waiting for news broadcast...");
        s.news.push(NewsItem {
            id: "x".into(),
            timestamp: "10:00:00".into(),
            headline: "ZEN wins approval".into(),
            content: "Details.".into(),
            impact: Impact::Positive,
            affected_symbol: Some("ZEN".into()),
        });
        let text = render_news(&s);
        assert!(text.contains("[ZEN] ZEN wins approval"));
        assert!(text.contains("positive"));
    }

    #[test]
    fn reports_render_fill_and_reject() {
        let intent = TradeIntent { action: TradeAction::Sell, symbol: "TECH".into(), shares: 5.0 };
        let filled = TradeReport {
            ts_ns: 0,
            intent: intent.clone(),
            outcome: TradeOutcome::Filled(Fill {
                action: TradeAction::Sell,
                symbol: "TECH".into(),
                shares: 5.0,
                price: 170.0,
                notional: 850.0,
                realized_pnl: Some(74.5),
                cash_after: 49_347.5,
            }),
        };
        assert_eq!(
            render_report(&filled),
            "FILLED SELL 5 TECH @ $170.00 (total $850.00, realized +74.50), cash $49,347.50"
        );

        let rejected = TradeReport {
            ts_ns: 0,
            intent,
            outcome: TradeOutcome::Rejected { reason: "No position in TECH".into(), code: "no_position".into() },
        };
        assert_eq!(render_report(&rejected), "REJECTED SELL 5 TECH: No position in TECH");
    }
}
