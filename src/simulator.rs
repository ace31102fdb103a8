// ===============================
// src/simulator.rs
// ===============================
//
// Price simulator:
// - advance_tick      : satu langkah random walk + trend bias untuk satu security
// - apply_news_impact : tambah bias trend dari news (additive, tanpa clamp)
//
// Notes:
// - Pure functions: input security tidak diubah, hasilnya value baru.
// - Randomness di-inject lewat `Rng` agar bisa di-seed di test / SIM_SEED.
// - Trend meluruh 5% tiap tick, dengan atau tanpa news di tick itu.
//

use chrono::Local;
use rand::Rng;

use crate::domain::{Impact, PricePoint, Security, HISTORY_CAP, PRICE_FLOOR};

pub const TREND_DECAY: f64 = 0.95;

/// Label waktu untuk history point (HH:MM:SS lokal).
pub fn time_label() -> String {
    Local::now().format("%H:%M:%S").to_string()
}

/// Advance one security by one tick, drawing the noise term from `rng`.
pub fn advance_tick<R: Rng + ?Sized>(security: &Security, rng: &mut R, time: &str) -> Security {
    let random_factor = rng.gen_range(-0.5..=0.5);
    step_with(security, random_factor, time)
}

/// Deterministic core of [`advance_tick`]; `random_factor` is expected in `[-0.5, 0.5]`.
pub fn step_with(security: &Security, random_factor: f64, time: &str) -> Security {
    let drift = security.trend * security.volatility * 2.0;
    let step = random_factor * security.volatility + drift;
    let new_price = (security.price + security.price * step).max(PRICE_FLOOR);

    // referensi = titik terakhir SEBELUM titik baru ditambahkan
    let reference = security
        .last_point()
        .map(|p| p.price)
        .unwrap_or(security.price);

    let mut next = security.clone();
    next.history.push_back(PricePoint { time: time.to_string(), price: new_price });
    while next.history.len() > HISTORY_CAP {
        next.history.pop_front();
    }

    next.price = new_price;
    next.change = new_price - reference;
    next.change_percent = (new_price / reference - 1.0) * 100.0;
    next.trend = security.trend * TREND_DECAY;
    next
}

pub fn apply_news_impact(security: &Security, impact: Impact) -> Security {
    let mut next = security.clone();
    next.trend += impact.trend_delta();
    next
}
