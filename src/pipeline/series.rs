//! # pipeline::series — Series Preparer
//!
//! Stored closes → regular business-day grid (Mon–Fri) with as-of
//! forward-fill. Holidays are not known here; they simply repeat the previous
//! close.

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::models::PriceObservation;

#[derive(Debug, Clone, PartialEq)]
pub struct BusinessDaySeries {
    pub dates:  Vec<NaiveDate>,
    pub values: Vec<f64>,
}

impl BusinessDaySeries {
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }
}

fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

fn next_day(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_add_days(Days::new(1))
}

/// `history` must be ordered by trading date (the store guarantees it).
/// `None` when there is no history or no business day is covered.
pub fn prepare_series(history: &[PriceObservation]) -> Option<BusinessDaySeries> {
    let first = history.first()?.trading_date;
    let last = history.last()?.trading_date;

    let mut dates = Vec::new();
    let mut values = Vec::new();
    let mut obs = history.iter().peekable();
    let mut current: Option<f64> = None;

    let mut day = first;
    while day <= last {
        while let Some(o) = obs.next_if(|o| o.trading_date <= day) {
            current = Some(o.close);
        }
        if is_business_day(day) {
            if let Some(close) = current {
                dates.push(day);
                values.push(close);
            }
        }
        let Some(next) = next_day(day) else { break };
        day = next;
    }

    (!values.is_empty()).then_some(BusinessDaySeries { dates, values })
}
