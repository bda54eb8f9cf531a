//! # config — อ่าน Config จาก Environment Variables
//!
//! | Variable                      | Default                            |
//! |-------------------------------|------------------------------------|
//! | `BIND_ADDR`                   | `0.0.0.0:3000`                     |
//! | `DATABASE_URL`                | unset → in-memory store            |
//! | `MARKET_DATA_URL`             | `https://query1.finance.yahoo.com` |
//! | `FORECAST_SCHEDULE_UTC`       | `01:00`                            |
//! | `FORECAST_HISTORY_START`      | `2015-01-01`                       |
//! | `FORECAST_FETCH_TIMEOUT_SECS` | `30`                               |
//! | `FORECAST_FIT_TIMEOUT_SECS`   | `120`                              |
//! | `FORECAST_INSTRUMENTS`        | the five default seeds             |
//! | `FORECAST_FIXED_ORDERS`       | empty                              |
//! | `FORECAST_RUN_ON_START`       | `false`                            |
//! | `API_KEY`                     | unset → dev mode, no auth          |

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::{NaiveDate, NaiveTime};

use crate::engine::{ModelTable, SearchBounds};
use crate::models::{InstrumentSeed, FORECAST_DAYS};

pub const DEFAULT_MARKET_DATA_URL: &str = "https://query1.finance.yahoo.com";

/// Settings the nightly orchestrator needs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Sync start for instruments without any stored history.
    pub history_start: NaiveDate,
    pub fetch_timeout: Duration,
    pub fit_timeout:   Duration,
    pub horizon:       usize,
    pub models:        ModelTable,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            history_start: NaiveDate::from_ymd_opt(2015, 1, 1).unwrap_or_default(),
            fetch_timeout: Duration::from_secs(30),
            fit_timeout:   Duration::from_secs(120),
            horizon:       FORECAST_DAYS,
            models:        ModelTable::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr:       SocketAddr,
    /// PostgreSQL URL; only honoured with the `postgres` feature.
    pub database_url:    Option<String>,
    /// Provider base URL, or `mock` for synthetic data.
    pub market_data_url: String,
    /// Daily trigger time, UTC.
    pub schedule_at:     NaiveTime,
    pub run_on_start:    bool,
    pub api_key:         Option<String>,
    pub instruments:     Vec<InstrumentSeed>,
    pub pipeline:        PipelineConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr: SocketAddr = get("BIND_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .context("BIND_ADDR must be host:port")?;

        let schedule_at = match get("FORECAST_SCHEDULE_UTC") {
            Some(raw) => NaiveTime::parse_from_str(&raw, "%H:%M")
                .with_context(|| format!("FORECAST_SCHEDULE_UTC must be HH:MM, got '{raw}'"))?,
            None => NaiveTime::from_hms_opt(1, 0, 0).unwrap_or_default(),
        };

        let defaults = PipelineConfig::default();
        let history_start = match get("FORECAST_HISTORY_START") {
            Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
                .with_context(|| format!("FORECAST_HISTORY_START must be YYYY-MM-DD, got '{raw}'"))?,
            None => defaults.history_start,
        };

        let fetch_secs = parse_secs(get("FORECAST_FETCH_TIMEOUT_SECS"), "FORECAST_FETCH_TIMEOUT_SECS", 30)?;
        let fit_secs = parse_secs(get("FORECAST_FIT_TIMEOUT_SECS"), "FORECAST_FIT_TIMEOUT_SECS", 120)?;

        let instruments = match get("FORECAST_INSTRUMENTS") {
            Some(raw) => parse_instruments(&raw)?,
            None => InstrumentSeed::defaults(),
        };

        let models = ModelTable::parse(&get("FORECAST_FIXED_ORDERS").unwrap_or_default(), SearchBounds::default())
            .context("FORECAST_FIXED_ORDERS is invalid")?;

        let run_on_start = match get("FORECAST_RUN_ON_START").map(|v| v.to_lowercase()).as_deref() {
            None | Some("0" | "false" | "no") => false,
            Some("1" | "true" | "yes") => true,
            Some(other) => bail!("FORECAST_RUN_ON_START must be true/false, got '{other}'"),
        };

        Ok(Self {
            bind_addr,
            database_url:    get("DATABASE_URL"),
            market_data_url: get("MARKET_DATA_URL").unwrap_or_else(|| DEFAULT_MARKET_DATA_URL.to_string()),
            schedule_at,
            run_on_start,
            api_key:         get("API_KEY"),
            instruments,
            pipeline: PipelineConfig {
                history_start,
                fetch_timeout: Duration::from_secs(fetch_secs),
                fit_timeout: Duration::from_secs(fit_secs),
                horizon: FORECAST_DAYS,
                models,
            },
        })
    }
}

fn parse_secs(raw: Option<String>, key: &str, default: u64) -> anyhow::Result<u64> {
    let secs = match raw {
        Some(v) => v.parse().with_context(|| format!("{key} must be a number of seconds"))?,
        None => default,
    };
    if secs == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(secs)
}

/// `SYM=Display Name;SYM2=Other`. A bare `SYM` uses the symbol as its name.
fn parse_instruments(raw: &str) -> anyhow::Result<Vec<InstrumentSeed>> {
    let seeds: Vec<InstrumentSeed> = raw
        .split(';')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((symbol, name)) => InstrumentSeed::new(symbol.trim(), name.trim()),
            None => InstrumentSeed::new(entry, entry),
        })
        .collect();
    if seeds.iter().any(|s| s.symbol.is_empty()) {
        bail!("FORECAST_INSTRUMENTS contains an entry without a symbol");
    }
    if seeds.is_empty() {
        bail!("FORECAST_INSTRUMENTS is set but lists no instruments");
    }
    Ok(seeds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let c = config(&[]).unwrap();
        assert_eq!(c.bind_addr.port(), 3000);
        assert_eq!(c.market_data_url, DEFAULT_MARKET_DATA_URL);
        assert_eq!(c.schedule_at, NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        assert_eq!(c.pipeline.history_start, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(c.pipeline.fit_timeout, Duration::from_secs(120));
        assert_eq!(c.instruments.len(), 5);
        assert!(c.database_url.is_none());
        assert!(!c.run_on_start);
        assert!(c.api_key.is_none());
    }

    #[test]
    fn overrides_are_parsed() {
        let c = config(&[
            ("FORECAST_SCHEDULE_UTC", "22:30"),
            ("FORECAST_INSTRUMENTS", "aapl=Apple; MSFT"),
            ("FORECAST_FIXED_ORDERS", "AAPL=1,1,0,0,0,0,5"),
            ("FORECAST_RUN_ON_START", "TRUE"),
            ("MARKET_DATA_URL", "mock"),
        ])
        .unwrap();
        assert_eq!(c.schedule_at, NaiveTime::from_hms_opt(22, 30, 0).unwrap());
        assert_eq!(c.instruments, vec![InstrumentSeed::new("AAPL", "Apple"), InstrumentSeed::new("MSFT", "MSFT")]);
        assert_eq!(c.pipeline.models.fixed_len(), 1);
        assert!(c.run_on_start);
        assert_eq!(c.market_data_url, "mock");
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(config(&[("FORECAST_SCHEDULE_UTC", "1am")]).is_err());
        assert!(config(&[("FORECAST_FIT_TIMEOUT_SECS", "0")]).is_err());
        assert!(config(&[("FORECAST_HISTORY_START", "yesterday")]).is_err());
        assert!(config(&[("FORECAST_RUN_ON_START", "maybe")]).is_err());
        assert!(config(&[("FORECAST_INSTRUMENTS", " ; ")]).is_err());
    }
}
