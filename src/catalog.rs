// ===============================
// src/catalog.rs
// ===============================
//
// Static security catalog. Set ini tetap selama sesi; history awal 20 titik
// diacak seragam di [base, base + spread).
//

use rand::Rng;

use crate::domain::{PricePoint, Security};

struct Listing {
    symbol: &'static str,
    name: &'static str,
    sector: &'static str,
    description: &'static str,
    price: f64,
    volatility: f64,
    history_base: f64,
    history_spread: f64,
}

const SEED_POINTS: usize = 20;

const LISTINGS: [Listing; 5] = [
    Listing {
        symbol: "TECH",
        name: "TechnoCore Systems",
        sector: "Technology",
        description: "Leading provider of cloud infrastructure and quantum computing hardware.",
        price: 150.25,
        volatility: 0.02,
        history_base: 150.0,
        history_spread: 5.0,
    },
    Listing {
        symbol: "ZEN",
        name: "Zenith BioMed",
        sector: "Healthcare",
        description: "Pioneering gene editing and regenerative medicine therapies.",
        price: 85.40,
        volatility: 0.035,
        history_base: 85.0,
        history_spread: 8.0,
    },
    Listing {
        symbol: "SOLR",
        name: "Solaris Energy",
        sector: "Energy",
        description: "The world's largest manufacturer of high-efficiency solar cells.",
        price: 42.10,
        volatility: 0.015,
        history_base: 42.0,
        history_spread: 3.0,
    },
    Listing {
        symbol: "AUTO",
        name: "Velocity Motors",
        sector: "Consumer Cyclical",
        description: "Luxury electric vehicle manufacturer with a focus on autonomous driving.",
        price: 210.80,
        volatility: 0.04,
        history_base: 210.0,
        history_spread: 12.0,
    },
    Listing {
        symbol: "COSM",
        name: "Cosmos Logistics",
        sector: "Industrials",
        description: "Global shipping and automated warehouse management solutions.",
        price: 12.45,
        volatility: 0.01,
        history_base: 12.0,
        history_spread: 0.5,
    },
];

/// Build the startup catalog in display order.
pub fn initial_securities<R: Rng + ?Sized>(rng: &mut R) -> Vec<Security> {
    LISTINGS
        .iter()
        .map(|l| {
            let history = (0..SEED_POINTS)
                .map(|i| PricePoint {
                    time: format!("{i}:00"),
                    price: l.history_base + rng.gen::<f64>() * l.history_spread,
                })
                .collect();
            Security::new(l.symbol, l.name, l.sector, l.description, l.price, l.volatility, history)
        })
        .collect()
}

pub fn symbols() -> Vec<&'static str> {
    LISTINGS.iter().map(|l| l.symbol).collect()
}
