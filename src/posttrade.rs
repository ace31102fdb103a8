// ===============================
// src/posttrade.rs
// ===============================
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::domain::{Event, TradeOutcome, TradeReport};
use crate::terminal;

/// Konsumsi TradeReport dari engine: log, tampilkan ke user, teruskan ke recorder.
pub async fn run(mut report_rx: mpsc::Receiver<TradeReport>, rec_tx: mpsc::Sender<Event>) {
    while let Some(report) = report_rx.recv().await {
        match &report.outcome {
            TradeOutcome::Filled(f) => info!(
                action = f.action.as_str(),
                symbol = %f.symbol,
                shares = f.shares,
                price = f.price,
                realized = ?f.realized_pnl,
                cash = f.cash_after,
                "FILLED"
            ),
            TradeOutcome::Rejected { reason, code } => warn!(
                action = report.intent.action.as_str(),
                symbol = %report.intent.symbol,
                shares = report.intent.shares,
                code = %code,
                reason = %reason,
                "REJECT"
            ),
        }
        println!("{}", terminal::render_report(&report));
        let _ = rec_tx.try_send(Event::Trade(report));
    }
    info!("posttrade: report channel closed");
}
