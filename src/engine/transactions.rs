// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Posting layer: turns a classified request into ledger rows.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::engine::classify::{self, Classified, LedgerMode, Request};
use crate::engine::{cards, commitments};
use crate::error;
use crate::models::{AccountType, CategoryKind, Method};

/// A user-facing posting request. `amount` is a positive magnitude; the
/// sign is derived from the category kind.
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub kind: CategoryKind,
    pub method: Method,
    pub destination_account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub due_day: Option<u32>,
    pub repeat_months: Option<u32>,
    pub notes: Option<String>,
}

/// What a posting produced: the mode it resolved to and the ids of every
/// row written (transaction rows, or the charge row for credit purchases).
#[derive(Debug)]
pub struct Posted {
    pub mode: LedgerMode,
    pub ids: Vec<i64>,
}

pub fn account_type(conn: &Connection, account_id: i64) -> Result<AccountType> {
    let t: Option<String> = conn
        .query_row(
            "SELECT type FROM accounts WHERE id=?1",
            params![account_id],
            |r| r.get(0),
        )
        .optional()?;
    match t {
        Some(s) => AccountType::parse(&s),
        None => Err(error::integrity(format!("account {} not found", account_id))),
    }
}

pub fn account_name(conn: &Connection, account_id: i64) -> Result<String> {
    conn.query_row(
        "SELECT name FROM accounts WHERE id=?1",
        params![account_id],
        |r| r.get(0),
    )
    .with_context(|| format!("account {} not found", account_id))
}

/// Classify and persist a request. The single entry point for `tx add`.
pub fn post_entry(conn: &mut Connection, today: NaiveDate, e: &NewEntry) -> Result<Posted> {
    if e.amount <= Decimal::ZERO {
        return Err(error::validation("amount must be positive"));
    }
    if e.description.trim().is_empty() {
        return Err(error::validation("description must not be empty"));
    }

    let c = classify::classify(&Request {
        kind: e.kind,
        method: e.method,
        has_destination: e.destination_account_id.is_some(),
        card_id: e.card_id,
        due_day: e.due_day,
        repeat_months: e.repeat_months,
    })?;

    match c.mode {
        LedgerMode::Normal => post_normal(conn, e),
        LedgerMode::Transfer => post_transfer(conn, e),
        LedgerMode::CreditCardCharge => {
            let card_id = e.card_id.unwrap_or_default();
            let charge_id = cards::register_charge(
                conn,
                card_id,
                e.date,
                &e.description,
                e.amount,
                e.category_id,
                e.notes.as_deref(),
            )?;
            Ok(Posted {
                mode: c.mode,
                ids: vec![charge_id],
            })
        }
        LedgerMode::FutureSchedule | LedgerMode::FutureCreditSchedule => {
            post_schedule(conn, today, e, &c)
        }
    }
}

fn post_normal(conn: &mut Connection, e: &NewEntry) -> Result<Posted> {
    let account_id = match (e.method, e.card_id) {
        (Method::Debit, Some(card_id)) => {
            // a debit-card purchase settles against the card's linked account
            let card = cards::fetch_card(conn, card_id)?;
            if card.card_type != crate::models::CardType::Debit {
                return Err(error::validation(format!(
                    "card '{}' is not a debit card",
                    card.name
                )));
            }
            card.account_id
        }
        _ => {
            account_type(conn, e.account_id)?;
            e.account_id
        }
    };

    let signed = match e.kind {
        CategoryKind::Income => e.amount,
        _ => -e.amount,
    };
    conn.execute(
        "INSERT INTO transactions(date, description, amount, account_id, category_id, kind, card_id, method, source_type, notes)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'normal', ?9)",
        params![
            e.date.to_string(),
            e.description,
            signed.to_string(),
            account_id,
            e.category_id,
            e.kind.as_str(),
            e.card_id,
            e.method.as_str(),
            e.notes
        ],
    )?;
    Ok(Posted {
        mode: LedgerMode::Normal,
        ids: vec![conn.last_insert_rowid()],
    })
}

/// Two mirrored legs in one transaction. Endpoints must be distinct cash
/// holders of different types (Bank on one side, Brokerage on the other).
fn post_transfer(conn: &mut Connection, e: &NewEntry) -> Result<Posted> {
    let dst = e
        .destination_account_id
        .ok_or_else(|| error::validation("transfer requires a destination account"))?;
    if dst == e.account_id {
        return Err(error::validation(
            "transfer source and destination must differ",
        ));
    }
    let src_type = account_type(conn, e.account_id)?;
    let dst_type = account_type(conn, dst)?;
    for (label, t) in [("source", src_type), ("destination", dst_type)] {
        if !matches!(t, AccountType::Bank | AccountType::Brokerage) {
            return Err(error::validation(format!(
                "transfer {} must be a bank or brokerage account",
                label
            )));
        }
    }
    if src_type == dst_type {
        return Err(error::validation(
            "transfer must move between a bank and a brokerage account",
        ));
    }

    let src_name = account_name(conn, e.account_id)?;
    let dst_name = account_name(conn, dst)?;
    let out_desc = format!("TRANSF -> {} | {}", dst_name, e.description);
    let in_desc = format!("TRANSF <- {} | {}", src_name, e.description);

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO transactions(date, description, amount, account_id, kind, source_account_id, method, source_type, notes)
         VALUES(?1, ?2, ?3, ?4, 'Transfer', ?5, ?6, 'transfer', ?7)",
        params![
            e.date.to_string(),
            out_desc,
            (-e.amount).to_string(),
            e.account_id,
            dst,
            e.method.as_str(),
            e.notes
        ],
    )?;
    let out_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO transactions(date, description, amount, account_id, kind, source_account_id, method, source_type, notes)
         VALUES(?1, ?2, ?3, ?4, 'Transfer', ?5, ?6, 'transfer', ?7)",
        params![
            e.date.to_string(),
            in_desc,
            e.amount.to_string(),
            dst,
            e.account_id,
            e.method.as_str(),
            e.notes
        ],
    )?;
    let in_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(Posted {
        mode: LedgerMode::Transfer,
        ids: vec![out_id, in_id],
    })
}

fn post_schedule(
    conn: &mut Connection,
    today: NaiveDate,
    e: &NewEntry,
    c: &Classified,
) -> Result<Posted> {
    match c.mode {
        LedgerMode::FutureSchedule => {
            let day = e
                .due_day
                .ok_or_else(|| error::validation("scheduled entries require a due day"))?;
            account_type(conn, e.account_id)?;
            commitments::schedule_series(
                conn,
                today,
                e.account_id,
                e.category_id,
                e.kind,
                &e.description,
                e.amount,
                day,
                c.repeat_months,
                e.notes.as_deref(),
            )
            .map(|ids| Posted { mode: c.mode, ids })
        }
        LedgerMode::FutureCreditSchedule => {
            let card_id = e
                .card_id
                .ok_or_else(|| error::validation("scheduled card charges require a card"))?;
            commitments::schedule_credit_series(
                conn,
                today,
                card_id,
                e.category_id,
                &e.description,
                e.amount,
                c.repeat_months,
                e.notes.as_deref(),
            )
            .map(|ids| Posted { mode: c.mode, ids })
        }
        _ => Err(error::integrity("schedule poster called with a non-schedule mode")),
    }
}

/// Delete a settled (non-commitment) transaction. Transfer legs are removed
/// in pairs so the books stay balanced.
pub fn delete_transaction(conn: &mut Connection, id: i64) -> Result<usize> {
    let row: Option<(String, String, Option<i64>, String)> = conn
        .query_row(
            "SELECT date, amount, source_account_id, source_type FROM transactions WHERE id=?1",
            params![id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((date, amount, source_account_id, source_type)) = row else {
        return Err(error::integrity(format!("transaction {} not found", id)));
    };
    if source_type == "commitment" || source_type == "credit_commitment" {
        return Err(error::validation(
            "scheduled entries are deleted through 'tx rm --scope'",
        ));
    }

    let tx = conn.transaction()?;
    let mut n = tx.execute("DELETE FROM transactions WHERE id=?1", params![id])?;
    if source_type == "transfer" {
        if let Some(peer_account) = source_account_id {
            let counter: Decimal = crate::utils::parse_decimal(&amount)?;
            n += tx.execute(
                "DELETE FROM transactions WHERE id=(
                     SELECT id FROM transactions
                     WHERE source_type='transfer' AND date=?1 AND account_id=?2 AND amount=?3
                     LIMIT 1)",
                params![date, peer_account, (-counter).to_string()],
            )?;
        }
    }
    tx.commit()?;
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rust_decimal_macros::dec;

    fn fixture() -> Connection {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO accounts(name, type) VALUES('Nubank', 'Bank');
             INSERT INTO accounts(name, type) VALUES('XP', 'Brokerage');
             INSERT INTO accounts(name, type) VALUES('Carteira', 'Cash');
             INSERT INTO categories(name, kind) VALUES('Mercado', 'Expense');
             INSERT INTO categories(name, kind) VALUES('Salário', 'Income');",
        )
        .unwrap();
        conn
    }

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    fn entry(kind: CategoryKind, method: Method, amount: Decimal) -> NewEntry {
        NewEntry {
            date: d(2025, 3, 10),
            description: "teste".into(),
            amount,
            account_id: 1,
            category_id: Some(1),
            kind,
            method,
            destination_account_id: None,
            card_id: None,
            due_day: None,
            repeat_months: None,
            notes: None,
        }
    }

    fn balance(conn: &Connection, account_id: i64) -> Decimal {
        let mut stmt = conn
            .prepare("SELECT amount FROM transactions WHERE account_id=?1")
            .unwrap();
        let amounts = stmt
            .query_map(params![account_id], |r| r.get::<_, String>(0))
            .unwrap();
        amounts
            .map(|a| a.unwrap().parse::<Decimal>().unwrap())
            .sum()
    }

    #[test]
    fn expense_is_stored_negative_income_positive() {
        let mut conn = fixture();
        post_entry(&mut conn, d(2025, 3, 10), &entry(CategoryKind::Expense, Method::Pix, dec!(50)))
            .unwrap();
        let mut inc = entry(CategoryKind::Income, Method::Pix, dec!(200));
        inc.category_id = Some(2);
        post_entry(&mut conn, d(2025, 3, 10), &inc).unwrap();
        assert_eq!(balance(&conn, 1), dec!(150));
    }

    #[test]
    fn transfer_conserves_value_and_names_legs() {
        let mut conn = fixture();
        let mut e = entry(CategoryKind::Transfer, Method::Pix, dec!(300));
        e.category_id = None;
        e.destination_account_id = Some(2);
        e.description = "aporte".into();
        let posted = post_entry(&mut conn, d(2025, 3, 10), &e).unwrap();
        assert_eq!(posted.ids.len(), 2);
        assert_eq!(balance(&conn, 1) + balance(&conn, 2), dec!(0));
        let desc: String = conn
            .query_row(
                "SELECT description FROM transactions WHERE id=?1",
                params![posted.ids[0]],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(desc, "TRANSF -> XP | aporte");
        let desc_in: String = conn
            .query_row(
                "SELECT description FROM transactions WHERE id=?1",
                params![posted.ids[1]],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(desc_in, "TRANSF <- Nubank | aporte");
    }

    #[test]
    fn transfer_rejects_same_type_endpoints() {
        let mut conn = fixture();
        conn.execute("INSERT INTO accounts(name, type) VALUES('Inter', 'Bank')", [])
            .unwrap();
        let mut e = entry(CategoryKind::Transfer, Method::Pix, dec!(100));
        e.category_id = None;
        e.destination_account_id = Some(4);
        let err = post_entry(&mut conn, d(2025, 3, 10), &e).unwrap_err();
        assert!(crate::error::is_validation(&err), "{err:#}");
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn transfer_rejects_cash_endpoint_and_self() {
        let mut conn = fixture();
        let mut e = entry(CategoryKind::Transfer, Method::Pix, dec!(100));
        e.category_id = None;
        e.destination_account_id = Some(3);
        assert!(post_entry(&mut conn, d(2025, 3, 10), &e).is_err());
        e.destination_account_id = Some(1);
        assert!(post_entry(&mut conn, d(2025, 3, 10), &e).is_err());
    }

    #[test]
    fn zero_amount_rejected() {
        let mut conn = fixture();
        let e = entry(CategoryKind::Expense, Method::Pix, dec!(0));
        assert!(post_entry(&mut conn, d(2025, 3, 10), &e).is_err());
    }

    #[test]
    fn delete_transfer_removes_both_legs() {
        let mut conn = fixture();
        let mut e = entry(CategoryKind::Transfer, Method::Pix, dec!(120));
        e.category_id = None;
        e.destination_account_id = Some(2);
        let posted = post_entry(&mut conn, d(2025, 3, 10), &e).unwrap();
        let n = delete_transaction(&mut conn, posted.ids[0]).unwrap();
        assert_eq!(n, 2);
        let left: i64 = conn
            .query_row("SELECT COUNT(*) FROM transactions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(left, 0);
    }
}
