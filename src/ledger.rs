// ===============================
// src/ledger.rs (cash & average-cost positions)
// ===============================
//
// buy / sell menerima portfolio lama dan mengembalikan portfolio baru.
// Gagal = portfolio lama tidak tersentuh (atomic, tanpa partial fill).
// Harga selalu disuplai caller; ledger tidak pernah membaca harga live.
//

use thiserror::Error;

use crate::domain::{Portfolio, Position};

/// Toleransi sisa float pada jumlah share (mis. 2.3 - 1.1 = 1.1999999999999997).
pub const SHARE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("Insufficient funds: need {needed:.2}, have {available:.2}")]
    InsufficientFunds { needed: f64, available: f64 },
    #[error("No position in {symbol}")]
    NoPosition { symbol: String },
    #[error("Not enough {symbol} shares: requested {requested}, held {held}")]
    InsufficientShares { symbol: String, requested: f64, held: f64 },
    #[error("Invalid order: {0}")]
    InvalidOrder(String),
}

impl LedgerError {
    /// Label pendek untuk metrics / recorder.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::NoPosition { .. } => "no_position",
            LedgerError::InsufficientShares { .. } => "insufficient_shares",
            LedgerError::InvalidOrder(_) => "invalid_order",
        }
    }
}

fn validate(shares: f64, price: f64) -> Result<(), LedgerError> {
    if !(shares.is_finite() && shares > 0.0) {
        return Err(LedgerError::InvalidOrder(format!("shares must be > 0, got {shares}")));
    }
    if !(price.is_finite() && price > 0.0) {
        return Err(LedgerError::InvalidOrder(format!("price must be > 0, got {price}")));
    }
    Ok(())
}

pub fn buy(portfolio: &Portfolio, symbol: &str, shares: f64, price: f64) -> Result<Portfolio, LedgerError> {
    validate(shares, price)?;

    let cost = shares * price;
    if portfolio.cash < cost {
        return Err(LedgerError::InsufficientFunds { needed: cost, available: portfolio.cash });
    }

    let mut next = portfolio.clone();
    next.cash -= cost;
    let entry = next
        .positions
        .entry(symbol.to_string())
        .or_insert_with(|| Position { symbol: symbol.to_string(), shares: 0.0, average_price: 0.0 });

    // weighted average atas share yang masih dipegang saja
    let total_shares = entry.shares + shares;
    entry.average_price = (entry.shares * entry.average_price + cost) / total_shares;
    entry.shares = total_shares;
    Ok(next)
}

pub fn sell(portfolio: &Portfolio, symbol: &str, shares: f64, price: f64) -> Result<Portfolio, LedgerError> {
    validate(shares, price)?;

    let held = match portfolio.positions.get(symbol) {
        Some(pos) => pos.shares,
        None => return Err(LedgerError::NoPosition { symbol: symbol.to_string() }),
    };
    if held + SHARE_EPSILON < shares {
        return Err(LedgerError::InsufficientShares { symbol: symbol.to_string(), requested: shares, held });
    }

    let mut next = portfolio.clone();
    next.cash += shares * price;
    if let Some(pos) = next.positions.get_mut(symbol) {
        // average_price tidak diubah; sisa di bawah epsilon dibulatkan ke 0
        let left = pos.shares - shares;
        pos.shares = if left.abs() < SHARE_EPSILON { 0.0 } else { left };
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn approx(a: f64, b: f64) -> bool { (a - b).abs() < EPS }

    #[test]
    fn worked_example_buy_buy_sell() {
        let pf = Portfolio::new(50_000.0);

        let pf = buy(&pf, "TECH", 10.0, 150.25).unwrap();
        assert!(approx(pf.cash, 48_497.50));
        let pos = pf.position("TECH").unwrap();
        assert!(approx(pos.shares, 10.0));
        assert!(approx(pos.average_price, 150.25));

        let pf = buy(&pf, "TECH", 10.0, 160.0).unwrap();
        assert!(approx(pf.position("TECH").unwrap().average_price, 155.125));

        let cash_before = pf.cash;
        let pf = sell(&pf, "TECH", 5.0, 170.0).unwrap();
        assert!(approx(pf.cash - cash_before, 850.0));
        let pos = pf.position("TECH").unwrap();
        assert!(approx(pos.shares, 15.0));
        assert!(approx(pos.average_price, 155.125));
    }

    #[test]
    fn round_trip_restores_cash_and_keeps_average() {
        let start = Portfolio::new(10_000.0);
        let bought = buy(&start, "ZEN", 7.0, 85.4).unwrap();
        let sold = sell(&bought, "ZEN", 7.0, 85.4).unwrap();
        assert!(approx(sold.cash, start.cash));
        let pos = sold.position("ZEN").unwrap();
        assert_eq!(pos.shares, 0.0);
        assert!(approx(pos.average_price, 85.4));
    }

    #[test]
    fn average_moves_toward_new_purchase_price() {
        let pf = buy(&Portfolio::new(100_000.0), "AUTO", 10.0, 200.0).unwrap();
        let up = buy(&pf, "AUTO", 5.0, 230.0).unwrap();
        let up_avg = up.position("AUTO").unwrap().average_price;
        assert!(up_avg > 200.0 && up_avg < 230.0);

        let down = buy(&pf, "AUTO", 5.0, 170.0).unwrap();
        let down_avg = down.position("AUTO").unwrap().average_price;
        assert!(down_avg < 200.0 && down_avg > 170.0);
    }

    #[test]
    fn average_is_bounded_by_contributing_prices() {
        let prices = [42.1, 40.0, 44.9, 41.3, 43.0];
        let mut pf = Portfolio::new(1_000_000.0);
        for (i, px) in prices.iter().enumerate() {
            pf = buy(&pf, "SOLR", (i + 1) as f64, *px).unwrap();
            let avg = pf.position("SOLR").unwrap().average_price;
            let seen = &prices[..=i];
            let lo = seen.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = seen.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            assert!(avg >= lo - EPS && avg <= hi + EPS);
        }
    }

    #[test]
    fn sell_never_changes_average() {
        let mut pf = buy(&Portfolio::new(5_000.0), "COSM", 100.0, 12.45).unwrap();
        for px in [10.0, 15.0, 12.0] {
            pf = sell(&pf, "COSM", 10.0, px).unwrap();
            assert!(approx(pf.position("COSM").unwrap().average_price, 12.45));
        }
    }

    #[test]
    fn insufficient_funds_leaves_portfolio_unchanged() {
        let pf = buy(&Portfolio::new(1_000.0), "TECH", 2.0, 150.0).unwrap();
        let err = buy(&pf, "TECH", 10.0, 150.0).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientFunds { needed: 1_500.0, available: 700.0 });
        assert_eq!(err.code(), "insufficient_funds");
        // caller tetap memegang portfolio lama; pastikan value-equal
        assert_eq!(pf, buy(&Portfolio::new(1_000.0), "TECH", 2.0, 150.0).unwrap());
    }

    #[test]
    fn buying_with_exactly_enough_cash_succeeds() {
        let pf = buy(&Portfolio::new(1_502.5), "TECH", 10.0, 150.25).unwrap();
        assert_eq!(pf.cash, 0.0);
        assert_eq!(pf.position("TECH").unwrap().shares, 10.0);

        let err = buy(&Portfolio::new(1_502.49), "TECH", 10.0, 150.25).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[test]
    fn fractional_residue_does_not_block_selling_the_rest() {
        let pf = buy(&Portfolio::new(1_000.0), "SOLR", 2.3, 42.0).unwrap();
        let pf = sell(&pf, "SOLR", 1.1, 42.0).unwrap();
        let pf = sell(&pf, "SOLR", 1.2, 42.0).unwrap();
        assert_eq!(pf.position("SOLR").unwrap().shares, 0.0);
        assert!(matches!(sell(&pf, "SOLR", 0.001, 42.0), Err(LedgerError::InsufficientShares { .. })));
    }

    #[test]
    fn sell_without_position_is_rejected() {
        let pf = Portfolio::new(1_000.0);
        let err = sell(&pf, "ZEN", 1.0, 80.0).unwrap_err();
        assert_eq!(err, LedgerError::NoPosition { symbol: "ZEN".into() });
    }

    #[test]
    fn selling_more_than_held_is_rejected() {
        let pf = buy(&Portfolio::new(1_000.0), "ZEN", 3.0, 80.0).unwrap();
        let err = sell(&pf, "ZEN", 4.0, 80.0).unwrap_err();
        assert_eq!(err, LedgerError::InsufficientShares { symbol: "ZEN".into(), requested: 4.0, held: 3.0 });
    }

    #[test]
    fn zero_share_position_persists_and_can_be_rebought() {
        let pf = buy(&Portfolio::new(1_000.0), "ZEN", 2.0, 50.0).unwrap();
        let pf = sell(&pf, "ZEN", 2.0, 60.0).unwrap();
        assert!(pf.position("ZEN").is_some());
        assert!(matches!(sell(&pf, "ZEN", 1.0, 60.0), Err(LedgerError::InsufficientShares { .. })));

        let pf = buy(&pf, "ZEN", 1.0, 70.0).unwrap();
        assert!(approx(pf.position("ZEN").unwrap().average_price, 70.0));
    }

    #[test]
    fn non_positive_inputs_are_invalid() {
        let pf = Portfolio::new(1_000.0);
        assert!(matches!(buy(&pf, "A", 0.0, 10.0), Err(LedgerError::InvalidOrder(_))));
        assert!(matches!(buy(&pf, "A", 1.0, -1.0), Err(LedgerError::InvalidOrder(_))));
        assert!(matches!(sell(&pf, "A", f64::NAN, 1.0), Err(LedgerError::InvalidOrder(_))));
    }
}
