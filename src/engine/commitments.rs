// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Scheduled future expenses: N monthly pending occurrences from one
//! input, settled one by one into real cash transactions.

use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::engine::cycle;
use crate::error;
use crate::models::{AccountType, CategoryKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    Single,
    Future,
}

impl DeleteScope {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "single" => Ok(DeleteScope::Single),
            "future" => Ok(DeleteScope::Future),
            _ => Err(error::validation(format!(
                "invalid scope '{}', expected single|future",
                s
            ))),
        }
    }
}

/// Create N monthly pending occurrences anchored at `due_day`. The first
/// lands in the current month if `due_day` has not passed, else next month.
/// All rows share a series id (the first row's id). Returns the row ids in
/// date order.
#[allow(clippy::too_many_arguments)]
pub fn schedule_series(
    conn: &mut Connection,
    today: NaiveDate,
    account_id: i64,
    category_id: Option<i64>,
    kind: CategoryKind,
    description: &str,
    amount: Decimal,
    due_day: u32,
    repeat_months: u32,
    notes: Option<&str>,
) -> Result<Vec<i64>> {
    let first = cycle::first_occurrence(today, due_day)?;
    let signed = match kind {
        CategoryKind::Income => amount,
        _ => -amount,
    };

    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(repeat_months as usize);
    let mut series_id: Option<i64> = None;
    for i in 0..repeat_months {
        let total = first.year() * 12 + first.month0() as i32 + i as i32;
        let (y, m) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
        let date = cycle::clamped_date(y, m, due_day)?;
        tx.execute(
            "INSERT INTO transactions(date, description, amount, account_id, category_id, kind,
                                      method, due_day, series_id, charge_status, source_type, notes)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, 'Futuro', ?7, ?8, 'Pending', 'commitment', ?9)",
            params![
                date.to_string(),
                description,
                signed.to_string(),
                account_id,
                category_id,
                kind.as_str(),
                due_day,
                series_id,
                notes
            ],
        )?;
        let id = tx.last_insert_rowid();
        if series_id.is_none() {
            tx.execute(
                "UPDATE transactions SET series_id=?1 WHERE id=?1",
                params![id],
            )?;
            series_id = Some(id);
        }
        ids.push(id);
    }
    tx.commit()?;
    Ok(ids)
}

/// Scheduled credit-card purchases. Occurrences are anchored at the card's
/// due day and stay out of any invoice until their cycle closes.
pub fn schedule_credit_series(
    conn: &mut Connection,
    today: NaiveDate,
    card_id: i64,
    category_id: Option<i64>,
    description: &str,
    amount: Decimal,
    repeat_months: u32,
    notes: Option<&str>,
) -> Result<Vec<i64>> {
    let card = crate::engine::cards::fetch_card(conn, card_id)?;
    let due_day = card
        .due_day
        .ok_or_else(|| error::validation(format!("card '{}' is not a credit card", card.name)))?;
    let first = cycle::first_occurrence(today, due_day)?;

    let tx = conn.transaction()?;
    let mut ids = Vec::with_capacity(repeat_months as usize);
    let mut series_id: Option<i64> = None;
    for i in 0..repeat_months {
        let total = first.year() * 12 + first.month0() as i32 + i as i32;
        let (y, m) = (total.div_euclid(12), total.rem_euclid(12) as u32 + 1);
        let date = cycle::clamped_date(y, m, due_day)?;
        tx.execute(
            "INSERT INTO transactions(date, description, amount, account_id, category_id, kind,
                                      card_id, method, due_day, series_id, charge_status, source_type, notes)
             VALUES(?1, ?2, ?3, ?4, ?5, 'Expense', ?6, 'Futuro', ?7, ?8, 'Pending', 'credit_commitment', ?9)",
            params![
                date.to_string(),
                description,
                (-amount).to_string(),
                card.account_id,
                category_id,
                card.id,
                due_day,
                series_id,
                notes
            ],
        )?;
        let id = tx.last_insert_rowid();
        if series_id.is_none() {
            tx.execute(
                "UPDATE transactions SET series_id=?1 WHERE id=?1",
                params![id],
            )?;
            series_id = Some(id);
        }
        ids.push(id);
    }
    tx.commit()?;
    Ok(ids)
}

fn fetch_commitment(conn: &Connection, tx_id: i64) -> Result<(String, String, Option<i64>, String)> {
    let row: Option<(String, String, Option<i64>, String)> = conn
        .query_row(
            "SELECT date, source_type, series_id, COALESCE(charge_status, '') FROM transactions WHERE id=?1",
            params![tx_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some(row) = row else {
        return Err(error::integrity(format!("transaction {} not found", tx_id)));
    };
    if row.1 != "commitment" && row.1 != "credit_commitment" {
        return Err(error::validation(format!(
            "transaction {} is not a scheduled entry",
            tx_id
        )));
    }
    Ok(row)
}

/// Remove one occurrence, or the clicked one plus all later unsettled
/// occurrences of the same series. Settled occurrences are never touched.
pub fn delete_scope(conn: &mut Connection, tx_id: i64, scope: DeleteScope) -> Result<usize> {
    let (date, _, series_id, status) = fetch_commitment(conn, tx_id)?;
    if status == "Paid" {
        return Err(error::conflict(format!(
            "occurrence {} was already settled",
            tx_id
        )));
    }
    match scope {
        DeleteScope::Single => {
            let n = conn.execute("DELETE FROM transactions WHERE id=?1", params![tx_id])?;
            Ok(n)
        }
        DeleteScope::Future => {
            let series = series_id
                .ok_or_else(|| error::integrity(format!("occurrence {} has no series", tx_id)))?;
            let n = conn.execute(
                "DELETE FROM transactions WHERE series_id=?1 AND date>=?2 AND charge_status='Pending'",
                params![series, date],
            )?;
            Ok(n)
        }
    }
}

/// Convert one pending occurrence into a real cash transaction. The
/// user-entered amount and date are authoritative; the row flips to Paid
/// and never reopens.
pub fn settle(
    conn: &mut Connection,
    tx_id: i64,
    payment_date: NaiveDate,
    account_id: i64,
    amount: Decimal,
    notes: Option<&str>,
) -> Result<()> {
    if amount <= Decimal::ZERO {
        return Err(error::validation("settlement amount must be positive"));
    }
    let acct = crate::engine::transactions::account_type(conn, account_id)?;
    if !matches!(acct, AccountType::Bank | AccountType::Cash) {
        return Err(error::validation(
            "settlement requires a bank or cash account",
        ));
    }

    let tx = conn.transaction()?;
    let row: Option<(String, String, String)> = tx
        .query_row(
            "SELECT source_type, COALESCE(charge_status, ''), kind FROM transactions WHERE id=?1",
            params![tx_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((source_type, status, kind)) = row else {
        return Err(error::integrity(format!("transaction {} not found", tx_id)));
    };
    if source_type != "commitment" {
        return Err(error::validation(format!(
            "transaction {} is not a settleable scheduled entry",
            tx_id
        )));
    }
    if status == "Paid" {
        return Err(error::conflict(format!(
            "occurrence {} was already settled",
            tx_id
        )));
    }
    let signed = if kind == "Income" { amount } else { -amount };
    tx.execute(
        "UPDATE transactions
         SET date=?1, amount=?2, account_id=?3, charge_status='Paid',
             notes=COALESCE(?4, notes)
         WHERE id=?5",
        params![
            payment_date.to_string(),
            signed.to_string(),
            account_id,
            notes,
            tx_id
        ],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    fn fixture() -> Connection {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO accounts(name, type) VALUES('Nubank', 'Bank');
             INSERT INTO accounts(name, type) VALUES('Carteira', 'Cash');
             INSERT INTO categories(name, kind) VALUES('Assinaturas', 'Expense');",
        )
        .unwrap();
        conn
    }

    fn dates_of(conn: &Connection, ids: &[i64]) -> Vec<String> {
        ids.iter()
            .map(|id| {
                conn.query_row("SELECT date FROM transactions WHERE id=?1", params![id], |r| {
                    r.get(0)
                })
                .unwrap()
            })
            .collect()
    }

    #[test]
    fn series_generates_n_monthly_rows_with_clamping() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 1, 10),
            1,
            Some(1),
            CategoryKind::Expense,
            "aluguel",
            dec!(1200),
            31,
            4,
            None,
        )
        .unwrap();
        assert_eq!(ids.len(), 4);
        assert_eq!(
            dates_of(&conn, &ids),
            vec!["2025-01-31", "2025-02-28", "2025-03-31", "2025-04-30"]
        );
        let series: Vec<i64> = ids
            .iter()
            .map(|id| {
                conn.query_row(
                    "SELECT series_id FROM transactions WHERE id=?1",
                    params![id],
                    |r| r.get(0),
                )
                .unwrap()
            })
            .collect();
        assert!(series.iter().all(|s| *s == ids[0]));
    }

    #[test]
    fn first_occurrence_skips_passed_day() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 3, 15),
            1,
            Some(1),
            CategoryKind::Expense,
            "internet",
            dec!(99.9),
            10,
            2,
            None,
        )
        .unwrap();
        assert_eq!(dates_of(&conn, &ids), vec!["2025-04-10", "2025-05-10"]);
    }

    #[test]
    fn future_scope_deletes_from_clicked_date_forward() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 1, 1),
            1,
            Some(1),
            CategoryKind::Expense,
            "curso",
            dec!(200),
            5,
            6,
            None,
        )
        .unwrap();
        // settle the third so it must survive the sweep
        settle(&mut conn, ids[2], d(2025, 3, 5), 1, dec!(200), None).unwrap();
        let n = delete_scope(&mut conn, ids[1], DeleteScope::Future).unwrap();
        assert_eq!(n, 4); // occurrences 2, 4, 5, 6
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 2); // first one and the settled third
    }

    #[test]
    fn single_scope_deletes_one() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 1, 1),
            1,
            None,
            CategoryKind::Expense,
            "x",
            dec!(10),
            5,
            3,
            None,
        )
        .unwrap();
        assert_eq!(delete_scope(&mut conn, ids[1], DeleteScope::Single).unwrap(), 1);
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 2);
    }

    #[test]
    fn settlement_is_authoritative_and_single_shot() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 1, 1),
            1,
            Some(1),
            CategoryKind::Expense,
            "luz",
            dec!(150),
            10,
            1,
            None,
        )
        .unwrap();
        settle(&mut conn, ids[0], d(2025, 1, 12), 2, dec!(163.27), None).unwrap();
        let (date, amount, account, status): (String, String, i64, String) = conn
            .query_row(
                "SELECT date, amount, account_id, charge_status FROM transactions WHERE id=?1",
                params![ids[0]],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
            )
            .unwrap();
        assert_eq!(date, "2025-01-12");
        assert_eq!(amount, "-163.27");
        assert_eq!(account, 2);
        assert_eq!(status, "Paid");

        let err = settle(&mut conn, ids[0], d(2025, 1, 13), 2, dec!(163.27), None).unwrap_err();
        assert!(crate::error::is_conflict(&err), "{err:#}");
    }

    #[test]
    fn settle_rejects_bad_inputs() {
        let mut conn = fixture();
        let ids = schedule_series(
            &mut conn,
            d(2025, 1, 1),
            1,
            None,
            CategoryKind::Expense,
            "x",
            dec!(10),
            5,
            1,
            None,
        )
        .unwrap();
        assert!(settle(&mut conn, ids[0], d(2025, 1, 5), 1, dec!(0), None).is_err());
        assert!(settle(&mut conn, ids[0], d(2025, 1, 5), 99, dec!(10), None).is_err());
    }
}
