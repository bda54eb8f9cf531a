//! # models::instrument
//!
//! Defines [`TrackedInstrument`], the fixed set of symbols the nightly job
//! keeps price history and forecasts for.
//!
//! Instruments are seeded once at startup from [`InstrumentSeed`] values and
//! are read-only for the rest of the pipeline.

use serde::{Deserialize, Serialize};

/// An instrument row as stored in the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInstrument {
    /// Store-assigned identity.
    pub id: i64,
    /// Provider ticker, always upper-case, e.g. `"PKO.WA"`.
    pub symbol: String,
    /// Human readable name shown on dashboards.
    pub name: String,
}

/// A `(symbol, name)` pair used to seed / upsert [`TrackedInstrument`] rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentSeed {
    pub symbol: String,
    pub name: String,
}

impl InstrumentSeed {
    pub fn new(symbol: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            symbol: normalize_symbol(&symbol.into()),
            name:   name.into(),
        }
    }

    /// The instruments tracked when `FORECAST_INSTRUMENTS` is not set.
    pub fn defaults() -> Vec<InstrumentSeed> {
        vec![
            Self::new("BOS.WA", "Bank Ochrony Srodowiska S.A."),
            Self::new("GTN.WA", "Getin Holding SA"),
            Self::new("BHW.WA", "Bank Handlowy w Warszawie S.A."),
            Self::new("PKO.WA", "Powszechna Kasa Oszczednosci Bank Polski Spolka Akcyjna"),
            Self::new("SPL.WA", "Santander Bank Polska S.A."),
        ]
    }
}

/// Symbols are matched case-insensitively everywhere; the canonical form is
/// trimmed upper-case.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase()
}
