//! # market::yahoo
//!
//! Daily closes from the Yahoo Finance v8 chart endpoint:
//! `GET {base}/v8/finance/chart/{symbol}?period1=..&period2=..&interval=1d`
//!
//! Adjusted closes (`indicators.adjclose`) are preferred when present so
//! splits and dividends don't show up as price jumps; otherwise the raw
//! `indicators.quote[0].close` series is used. `null` closes are skipped.

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use serde::Deserialize;
use tracing::debug;

use super::MarketDataProvider;
use crate::models::PriceBar;

pub struct YahooChartProvider {
    client:   reqwest::Client,
    base_url: String,
}

impl YahooChartProvider {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

// ─── Response format ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error:  Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code:        String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta:       ChartMeta,
    #[serde(default)]
    timestamp:  Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    /// Exchange offset from UTC in seconds (e.g. 3600 for Warsaw in winter)
    #[serde(default)]
    gmtoffset: i64,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote:    Vec<QuoteBlock>,
    #[serde(default)]
    adjclose: Vec<AdjCloseBlock>,
}

#[derive(Debug, Deserialize)]
struct QuoteBlock {
    #[serde(default)]
    close: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjCloseBlock {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Turn a chart response body into ordered daily bars.
fn parse_chart(body: &str) -> anyhow::Result<Vec<PriceBar>> {
    let envelope: ChartEnvelope =
        serde_json::from_str(body).context("Failed to parse chart response")?;

    if let Some(err) = envelope.chart.error {
        bail!("chart API error {}: {}", err.code, err.description);
    }

    let Some(result) = envelope.chart.result.and_then(|r| r.into_iter().next()) else {
        return Ok(Vec::new());
    };

    let closes = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|b| b.adjclose)
        .filter(|c| !c.is_empty())
        .or_else(|| result.indicators.quote.into_iter().next().map(|q| q.close))
        .unwrap_or_default();

    let offset = result.meta.gmtoffset;
    let mut bars: Vec<PriceBar> = result
        .timestamp
        .iter()
        .zip(closes)
        .filter_map(|(&ts, close)| {
            let close = close?;
            let date = DateTime::from_timestamp(ts + offset, 0)?.date_naive();
            Some(PriceBar::new(date, close))
        })
        .collect();

    bars.sort_by_key(|b| b.date);
    Ok(bars)
}

fn unix_midnight(date: NaiveDate) -> i64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp())
        .unwrap_or_default()
}

#[async_trait]
impl MarketDataProvider for YahooChartProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PriceBar>> {
        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let period1 = unix_midnight(start).to_string();
        let period2 = unix_midnight(end).to_string();

        debug!(%symbol, %start, %end, "Requesting daily closes");

        let response = self
            .client
            .get(&url)
            .query(&[
                ("period1", period1.as_str()),
                ("period2", period2.as_str()),
                ("interval", "1d"),
                ("events", "history"),
            ])
            .header(reqwest::header::USER_AGENT, "Mozilla/5.0 (pricecast)")
            .send()
            .await
            .context("Market data API unreachable")?;

        let status = response.status();
        let body = response.text().await.context("Failed to read chart response")?;
        if !status.is_success() {
            bail!("Market data API HTTP {status}: {}", body.chars().take(200).collect::<String>());
        }

        let bars = parse_chart(&body)?;
        Ok(bars.into_iter().filter(|b| b.date >= start && b.date < end).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "PKO.WA", "gmtoffset": 3600 },
                "timestamp": [1704182400, 1704268800, 1704355200],
                "indicators": {
                    "quote": [{ "close": [50.1, null, 51.3] }],
                    "adjclose": [{ "adjclose": [49.0, null, 50.2] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn prefers_adjusted_closes_and_skips_nulls() {
        let bars = parse_chart(SAMPLE).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].date, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!((bars[0].close - 49.0).abs() < 1e-12);
        assert!((bars[1].close - 50.2).abs() < 1e-12);
    }

    #[test]
    fn falls_back_to_raw_close() {
        let body = r#"{"chart":{"result":[{"meta":{"gmtoffset":0},
            "timestamp":[1704182400],
            "indicators":{"quote":[{"close":[12.5]}]}}],"error":null}}"#;
        let bars = parse_chart(body).unwrap();
        assert_eq!(bars, vec![PriceBar::new(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 12.5)]);
    }

    #[test]
    fn api_error_is_reported() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found"}}}"#;
        assert!(parse_chart(body).is_err());
    }

    #[test]
    fn empty_result_is_no_data() {
        let body = r#"{"chart":{"result":[],"error":null}}"#;
        assert!(parse_chart(body).unwrap().is_empty());
    }
}
