// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Calendar arithmetic for billing cycles and recurring schedules.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};

use crate::error;

/// Last day of the given month.
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 => {
            if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
                29
            } else {
                28
            }
        }
        _ => 0,
    }
}

/// Build a date clamping `day` to the month's length. Day 31 in April lands on the 30th.
pub fn clamped_date(year: i32, month: u32, day: u32) -> Result<NaiveDate> {
    let last = days_in_month(year, month);
    if last == 0 {
        return Err(error::validation(format!("invalid month number {}", month)));
    }
    let d = day.min(last).max(1);
    NaiveDate::from_ymd_opt(year, month, d)
        .ok_or_else(|| error::validation(format!("invalid date {}-{:02}-{:02}", year, month, d)))
}

/// Next calendar month of a `YYYY-MM` style (year, month) pair.
pub fn next_month(year: i32, month: u32) -> (i32, u32) {
    if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    }
}

/// Invoice period a purchase belongs to. Purchases strictly after the close
/// day roll into the following month's invoice.
pub fn invoice_period_for(date: NaiveDate, close_day: u32) -> String {
    let (y, m) = if date.day() <= close_day {
        (date.year(), date.month())
    } else {
        next_month(date.year(), date.month())
    };
    format!("{:04}-{:02}", y, m)
}

/// Due date of the invoice with the given `YYYY-MM` period, clamping the
/// card's due day to the period month.
pub fn due_date_for(period: &str, due_day: u32) -> Result<NaiveDate> {
    let (y, m) = parse_period(period)?;
    clamped_date(y, m, due_day)
}

pub fn parse_period(period: &str) -> Result<(i32, u32)> {
    let mut it = period.splitn(2, '-');
    let y = it
        .next()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| error::validation(format!("invalid period '{}'", period)))?;
    let m = it
        .next()
        .and_then(|s| s.parse::<u32>().ok())
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| error::validation(format!("invalid period '{}'", period)))?;
    Ok((y, m))
}

/// First occurrence of a monthly schedule anchored at `due_day`: the current
/// month if the day has not passed yet, otherwise next month.
pub fn first_occurrence(today: NaiveDate, due_day: u32) -> Result<NaiveDate> {
    if today.day() <= due_day {
        clamped_date(today.year(), today.month(), due_day)
    } else {
        let (y, m) = next_month(today.year(), today.month());
        clamped_date(y, m, due_day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    #[test]
    fn month_lengths() {
        assert_eq!(days_in_month(2025, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
        assert_eq!(days_in_month(2025, 4), 30);
        assert_eq!(days_in_month(2025, 12), 31);
    }

    #[test]
    fn clamped_date_shortens_day() {
        assert_eq!(clamped_date(2025, 2, 31).unwrap(), d(2025, 2, 28));
        assert_eq!(clamped_date(2024, 2, 30).unwrap(), d(2024, 2, 29));
        assert_eq!(clamped_date(2025, 4, 31).unwrap(), d(2025, 4, 30));
        assert!(clamped_date(2025, 13, 1).is_err());
    }

    #[test]
    fn purchase_on_close_day_stays_in_period() {
        assert_eq!(invoice_period_for(d(2025, 3, 20), 20), "2025-03");
        assert_eq!(invoice_period_for(d(2025, 3, 21), 20), "2025-04");
        assert_eq!(invoice_period_for(d(2025, 12, 28), 20), "2026-01");
    }

    #[test]
    fn due_date_clamped_to_period_month() {
        assert_eq!(due_date_for("2025-02", 31).unwrap(), d(2025, 2, 28));
        assert_eq!(due_date_for("2024-02", 30).unwrap(), d(2024, 2, 29));
        assert_eq!(due_date_for("2025-04", 31).unwrap(), d(2025, 4, 30));
        assert_eq!(due_date_for("2025-07", 10).unwrap(), d(2025, 7, 10));
    }

    #[test]
    fn first_occurrence_honors_today() {
        assert_eq!(first_occurrence(d(2025, 3, 5), 10).unwrap(), d(2025, 3, 10));
        assert_eq!(first_occurrence(d(2025, 3, 10), 10).unwrap(), d(2025, 3, 10));
        assert_eq!(first_occurrence(d(2025, 3, 11), 10).unwrap(), d(2025, 4, 10));
        // day 31 schedule started in January lands on Feb 28 next
        assert_eq!(first_occurrence(d(2025, 2, 5), 31).unwrap(), d(2025, 2, 28));
    }

    #[test]
    fn period_parsing() {
        assert_eq!(parse_period("2025-07").unwrap(), (2025, 7));
        assert!(parse_period("2025-13").is_err());
        assert!(parse_period("garbage").is_err());
    }
}
