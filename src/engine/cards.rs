// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Credit-card billing cycles: charge assignment, invoice accumulation
//! and payment. Invoices move `OPEN -> PAID`, never back.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;

use crate::engine::cycle;
use crate::error;
use crate::models::{Card, CardInvoice, CardType};
use crate::utils::parse_decimal;

pub fn fetch_card(conn: &Connection, card_id: i64) -> Result<Card> {
    let card = conn
        .query_row(
            "SELECT id, name, brand, card_type, account_id, close_day, due_day
             FROM cards WHERE id=?1",
            params![card_id],
            |r| {
                Ok((
                    r.get::<_, i64>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, i64>(4)?,
                    r.get::<_, Option<u32>>(5)?,
                    r.get::<_, Option<u32>>(6)?,
                ))
            },
        )
        .optional()?;
    let Some((id, name, brand, card_type, account_id, close_day, due_day)) = card else {
        return Err(error::integrity(format!("card {} not found", card_id)));
    };
    Ok(Card {
        id,
        name,
        brand,
        card_type: CardType::parse(&card_type)?,
        account_id,
        close_day,
        due_day,
    })
}

pub fn create_card(
    conn: &Connection,
    name: &str,
    brand: &str,
    card_type: CardType,
    account_id: i64,
    close_day: Option<u32>,
    due_day: Option<u32>,
) -> Result<i64> {
    if name.trim().is_empty() {
        return Err(error::validation("card name must not be empty"));
    }
    if card_type == CardType::Credit {
        let (close, due) = match (close_day, due_day) {
            (Some(c), Some(d)) => (c, d),
            _ => {
                return Err(error::validation(
                    "credit cards require a close day and a due day",
                ))
            }
        };
        if !(1..=31).contains(&close) || !(1..=31).contains(&due) || close >= due {
            return Err(error::validation(
                "card days must satisfy 1 <= close_day < due_day <= 31",
            ));
        }
    }
    crate::engine::transactions::account_type(conn, account_id)?;
    conn.execute(
        "INSERT INTO cards(name, brand, card_type, account_id, close_day, due_day)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![name, brand, card_type.as_str(), account_id, close_day, due_day],
    )
    .with_context(|| format!("Create card '{}'", name))?;
    Ok(conn.last_insert_rowid())
}

fn credit_days(card: &Card) -> Result<(u32, u32)> {
    match (card.card_type, card.close_day, card.due_day) {
        (CardType::Credit, Some(c), Some(d)) => Ok((c, d)),
        _ => Err(error::validation(format!(
            "card '{}' is not a credit card",
            card.name
        ))),
    }
}

/// Fetch (creating on demand) the invoice row for a period. Returns
/// (invoice_id, status, total_amount).
fn ensure_invoice(conn: &Connection, card: &Card, period: &str) -> Result<(i64, String, Decimal)> {
    let (_, due_day) = credit_days(card)?;
    let existing: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT id, status, total_amount FROM card_invoices WHERE card_id=?1 AND invoice_period=?2",
            params![card.id, period],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    if let Some((id, status, total)) = existing {
        return Ok((id, status, parse_decimal(&total)?));
    }
    let due_date = cycle::due_date_for(period, due_day)?;
    conn.execute(
        "INSERT INTO card_invoices(card_id, invoice_period, due_date) VALUES(?1, ?2, ?3)",
        params![card.id, period, due_date.to_string()],
    )?;
    Ok((conn.last_insert_rowid(), "OPEN".to_string(), Decimal::ZERO))
}

/// Post a purchase onto the card's invoice for the date's cycle, creating
/// the invoice if needed. Rejects charges against an already paid period.
pub fn register_charge(
    conn: &mut Connection,
    card_id: i64,
    date: NaiveDate,
    description: &str,
    amount: Decimal,
    category_id: Option<i64>,
    notes: Option<&str>,
) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(error::validation("amount must be positive"));
    }
    let card = fetch_card(conn, card_id)?;
    let (close_day, _) = credit_days(&card)?;
    let period = cycle::invoice_period_for(date, close_day);

    let tx = conn.transaction()?;
    let (invoice_id, status, total) = ensure_invoice(&tx, &card, &period)?;
    if status == "PAID" {
        return Err(error::conflict(format!(
            "invoice {} of card '{}' is already paid",
            period, card.name
        )));
    }
    tx.execute(
        "INSERT INTO card_charges(card_id, date, description, amount, category_id, invoice_period, notes)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            card.id,
            date.to_string(),
            description,
            amount.to_string(),
            category_id,
            period,
            notes
        ],
    )?;
    let charge_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE card_invoices SET total_amount=?1 WHERE id=?2",
        params![(total + amount).to_string(), invoice_id],
    )?;
    tx.commit()?;
    Ok(charge_id)
}

/// Remove an unpaid charge and decrement its invoice total. Paid invoices
/// keep their history.
pub fn delete_charge(conn: &mut Connection, charge_id: i64) -> Result<()> {
    let row: Option<(i64, String, String)> = conn
        .query_row(
            "SELECT card_id, invoice_period, amount FROM card_charges WHERE id=?1",
            params![charge_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )
        .optional()?;
    let Some((card_id, period, amount)) = row else {
        return Err(error::integrity(format!("charge {} not found", charge_id)));
    };
    let amount = parse_decimal(&amount)?;

    let tx = conn.transaction()?;
    let (status, total): (String, String) = tx
        .query_row(
            "SELECT status, total_amount FROM card_invoices WHERE card_id=?1 AND invoice_period=?2",
            params![card_id, period],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .with_context(|| format!("invoice {} not found", period))?;
    if status == "PAID" {
        return Err(error::conflict(format!(
            "charge {} belongs to the already paid invoice {}",
            charge_id, period
        )));
    }
    let total = parse_decimal(&total)?;
    tx.execute("DELETE FROM card_charges WHERE id=?1", params![charge_id])?;
    tx.execute(
        "UPDATE card_invoices SET total_amount=?1 WHERE card_id=?2 AND invoice_period=?3",
        params![(total - amount).to_string(), card_id, period],
    )?;
    tx.commit()?;
    Ok(())
}

/// Convert pending scheduled card purchases whose cycle has closed by
/// `today` into real invoice charges. Runs at read time; no timers.
/// A purchase whose period was paid ahead of its close day rolls forward
/// to the first open period instead of failing the read.
pub fn sync_credit_commitments(conn: &mut Connection, today: NaiveDate) -> Result<usize> {
    let pending: Vec<(i64, i64, String, String, String, Option<i64>, Option<String>)> = {
        let mut stmt = conn.prepare(
            "SELECT id, card_id, date, description, amount, category_id, notes
             FROM transactions
             WHERE source_type='credit_commitment' AND charge_status='Pending' AND card_id IS NOT NULL",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok((
                r.get(0)?,
                r.get(1)?,
                r.get(2)?,
                r.get(3)?,
                r.get(4)?,
                r.get(5)?,
                r.get(6)?,
            ))
        })?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    let mut converted = 0usize;
    for (id, card_id, date, description, amount, category_id, notes) in pending {
        let card = fetch_card(conn, card_id)?;
        let (close_day, _) = credit_days(&card)?;
        let date = crate::utils::parse_date(&date)?;
        let mut period = cycle::invoice_period_for(date, close_day);
        let (py, pm) = cycle::parse_period(&period)?;
        let close_date = cycle::clamped_date(py, pm, close_day)?;
        if today < close_date {
            continue;
        }
        // pending rows store the scheduled outflow as a negative amount
        let magnitude = -parse_decimal(&amount)?;

        let tx = conn.transaction()?;
        let (invoice_id, total) = loop {
            let (invoice_id, status, total) = ensure_invoice(&tx, &card, &period)?;
            if status != "PAID" {
                break (invoice_id, total);
            }
            let (y, m) = cycle::parse_period(&period)?;
            let (ny, nm) = cycle::next_month(y, m);
            period = format!("{:04}-{:02}", ny, nm);
        };
        tx.execute(
            "INSERT INTO card_charges(card_id, date, description, amount, category_id, invoice_period, notes)
             VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                card.id,
                date.to_string(),
                description,
                magnitude.to_string(),
                category_id,
                period,
                notes
            ],
        )?;
        tx.execute(
            "UPDATE card_invoices SET total_amount=?1 WHERE id=?2",
            params![(total + magnitude).to_string(), invoice_id],
        )?;
        tx.execute(
            "UPDATE transactions SET charge_status='Paid' WHERE id=?1",
            params![id],
        )?;
        tx.commit()?;
        converted += 1;
    }
    Ok(converted)
}

/// Settle an invoice: one cash-outflow expense at a bank account, then
/// `OPEN -> PAID`. Paying twice is a conflict.
pub fn pay_invoice(
    conn: &mut Connection,
    invoice_id: i64,
    payment_date: NaiveDate,
    source_account_id: i64,
) -> Result<i64> {
    sync_credit_commitments(conn, payment_date)?;

    let src_type = crate::engine::transactions::account_type(conn, source_account_id)?;
    if src_type != crate::models::AccountType::Bank {
        return Err(error::validation(
            "invoice payment requires a bank source account",
        ));
    }

    let tx = conn.transaction()?;
    let row: Option<(i64, String, String, String)> = tx
        .query_row(
            "SELECT card_id, invoice_period, total_amount, status FROM card_invoices WHERE id=?1",
            params![invoice_id],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?)),
        )
        .optional()?;
    let Some((card_id, period, total, status)) = row else {
        return Err(error::integrity(format!("invoice {} not found", invoice_id)));
    };
    if status == "PAID" {
        return Err(error::conflict(format!("invoice {} is already paid", period)));
    }
    let total = parse_decimal(&total)?;
    let card_name: String = tx.query_row(
        "SELECT name FROM cards WHERE id=?1",
        params![card_id],
        |r| r.get(0),
    )?;

    tx.execute(
        "INSERT INTO transactions(date, description, amount, account_id, kind, card_id, source_type)
         VALUES(?1, ?2, ?3, ?4, 'Expense', ?5, 'invoice_payment')",
        params![
            payment_date.to_string(),
            format!("PGTO FATURA {} ({})", card_name, period),
            (-total).to_string(),
            source_account_id,
            card_id
        ],
    )?;
    let payment_tx_id = tx.last_insert_rowid();
    tx.execute(
        "UPDATE card_invoices SET status='PAID', paid_amount=?1 WHERE id=?2",
        params![total.to_string(), invoice_id],
    )?;
    tx.commit()?;
    Ok(payment_tx_id)
}

pub fn list_invoices(conn: &mut Connection, card_id: i64, today: NaiveDate) -> Result<Vec<CardInvoice>> {
    sync_credit_commitments(conn, today)?;
    let mut stmt = conn.prepare(
        "SELECT id, card_id, invoice_period, due_date, total_amount, paid_amount, status
         FROM card_invoices WHERE card_id=?1 ORDER BY invoice_period",
    )?;
    let rows = stmt.query_map(params![card_id], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, i64>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, String>(5)?,
            r.get::<_, String>(6)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (id, card_id, invoice_period, due_date, total, paid, status) = row?;
        out.push(CardInvoice {
            id,
            card_id,
            invoice_period,
            due_date: crate::utils::parse_date(&due_date)?,
            total_amount: parse_decimal(&total)?,
            paid_amount: parse_decimal(&paid)?,
            status,
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    fn fixture() -> (Connection, i64) {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO accounts(name, type) VALUES('Nubank', 'Bank');
             INSERT INTO categories(name, kind) VALUES('Mercado', 'Expense');",
        )
        .unwrap();
        let card_id =
            create_card(&conn, "Nubank Roxo", "Mastercard", CardType::Credit, 1, Some(20), Some(28))
                .unwrap();
        (conn, card_id)
    }

    #[test]
    fn card_days_validated() {
        let conn = db::open_in_memory().unwrap();
        conn.execute("INSERT INTO accounts(name, type) VALUES('Nubank', 'Bank')", [])
            .unwrap();
        assert!(create_card(&conn, "X", "Visa", CardType::Credit, 1, Some(20), Some(20)).is_err());
        assert!(create_card(&conn, "X", "Visa", CardType::Credit, 1, Some(25), Some(10)).is_err());
        assert!(create_card(&conn, "X", "Visa", CardType::Credit, 1, None, Some(10)).is_err());
        assert!(create_card(&conn, "X", "Visa", CardType::Credit, 1, Some(0), Some(10)).is_err());
        assert!(create_card(&conn, "X", "Visa", CardType::Debit, 1, None, None).is_ok());
    }

    #[test]
    fn charge_after_close_rolls_to_next_period() {
        let (mut conn, card_id) = fixture();
        register_charge(&mut conn, card_id, d(2025, 3, 20), "mercado", dec!(100), Some(1), None)
            .unwrap();
        register_charge(&mut conn, card_id, d(2025, 3, 22), "farmácia", dec!(40), Some(1), None)
            .unwrap();
        let invoices = list_invoices(&mut conn, card_id, d(2025, 3, 22)).unwrap();
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].invoice_period, "2025-03");
        assert_eq!(invoices[0].total_amount, dec!(100));
        assert_eq!(invoices[1].invoice_period, "2025-04");
        assert_eq!(invoices[1].total_amount, dec!(40));
        assert_eq!(invoices[1].due_date, d(2025, 4, 28));
    }

    #[test]
    fn invoice_total_tracks_charges_and_deletion() {
        let (mut conn, card_id) = fixture();
        let a = register_charge(&mut conn, card_id, d(2025, 3, 5), "a", dec!(30), None, None).unwrap();
        register_charge(&mut conn, card_id, d(2025, 3, 6), "b", dec!(70), None, None).unwrap();
        let invoices = list_invoices(&mut conn, card_id, d(2025, 3, 6)).unwrap();
        assert_eq!(invoices[0].total_amount, dec!(100));
        delete_charge(&mut conn, a).unwrap();
        let invoices = list_invoices(&mut conn, card_id, d(2025, 3, 6)).unwrap();
        assert_eq!(invoices[0].total_amount, dec!(70));
    }

    #[test]
    fn pay_invoice_posts_single_expense_and_flips_status() {
        let (mut conn, card_id) = fixture();
        register_charge(&mut conn, card_id, d(2025, 3, 5), "a", dec!(30), None, None).unwrap();
        register_charge(&mut conn, card_id, d(2025, 3, 6), "b", dec!(70), None, None).unwrap();
        let invoice_id = list_invoices(&mut conn, card_id, d(2025, 3, 6)).unwrap()[0].id;
        pay_invoice(&mut conn, invoice_id, d(2025, 3, 28), 1).unwrap();

        let invoices = list_invoices(&mut conn, card_id, d(2025, 3, 28)).unwrap();
        assert_eq!(invoices[0].status, "PAID");
        assert_eq!(invoices[0].paid_amount, dec!(100));

        let (n, desc, amount): (i64, String, String) = conn
            .query_row(
                "SELECT COUNT(*), MAX(description), MAX(amount) FROM transactions WHERE source_type='invoice_payment'",
                [],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(desc, "PGTO FATURA Nubank Roxo (2025-03)");
        assert_eq!(amount, "-100");
    }

    #[test]
    fn paying_twice_is_a_conflict() {
        let (mut conn, card_id) = fixture();
        register_charge(&mut conn, card_id, d(2025, 3, 5), "a", dec!(30), None, None).unwrap();
        let invoice_id = list_invoices(&mut conn, card_id, d(2025, 3, 5)).unwrap()[0].id;
        pay_invoice(&mut conn, invoice_id, d(2025, 3, 28), 1).unwrap();
        let err = pay_invoice(&mut conn, invoice_id, d(2025, 3, 29), 1).unwrap_err();
        assert!(crate::error::is_conflict(&err), "{err:#}");
    }

    #[test]
    fn early_paid_invoice_rolls_scheduled_purchase_forward() {
        let (mut conn, card_id) = fixture();
        // occurrence 2025-03-28 lands after close day 20, so it bills in 2025-04
        crate::engine::commitments::schedule_credit_series(
            &mut conn,
            d(2025, 3, 1),
            card_id,
            Some(1),
            "assinatura",
            dec!(90),
            1,
            None,
        )
        .unwrap();
        register_charge(&mut conn, card_id, d(2025, 3, 25), "mercado", dec!(60), Some(1), None)
            .unwrap();

        // the 2025-04 invoice is paid before its Apr 20 close
        let invoice_id = list_invoices(&mut conn, card_id, d(2025, 4, 10)).unwrap()[0].id;
        pay_invoice(&mut conn, invoice_id, d(2025, 4, 10), 1).unwrap();

        // crossing the close day must keep reads working and move the
        // purchase to the next open period
        let invoices = list_invoices(&mut conn, card_id, d(2025, 4, 21)).unwrap();
        assert_eq!(invoices.len(), 2);
        assert_eq!(invoices[0].invoice_period, "2025-04");
        assert_eq!(invoices[0].status, "PAID");
        assert_eq!(invoices[0].total_amount, dec!(60));
        assert_eq!(invoices[1].invoice_period, "2025-05");
        assert_eq!(invoices[1].status, "OPEN");
        assert_eq!(invoices[1].total_amount, dec!(90));
    }

    #[test]
    fn conversion_happens_exactly_once_across_reads() {
        let (mut conn, card_id) = fixture();
        crate::engine::commitments::schedule_credit_series(
            &mut conn,
            d(2025, 3, 1),
            card_id,
            Some(1),
            "assinatura",
            dec!(90),
            1,
            None,
        )
        .unwrap();
        list_invoices(&mut conn, card_id, d(2025, 4, 20)).unwrap();
        list_invoices(&mut conn, card_id, d(2025, 4, 22)).unwrap();

        let charges: i64 = conn
            .query_row("SELECT COUNT(*) FROM card_charges", [], |r| r.get(0))
            .unwrap();
        assert_eq!(charges, 1);
        let pending: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM transactions WHERE source_type='credit_commitment' AND charge_status='Pending'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(pending, 0);
    }

    #[test]
    fn delete_charge_on_paid_invoice_rejected() {
        let (mut conn, card_id) = fixture();
        let charge = register_charge(&mut conn, card_id, d(2025, 3, 5), "a", dec!(30), None, None)
            .unwrap();
        let invoice_id = list_invoices(&mut conn, card_id, d(2025, 3, 5)).unwrap()[0].id;
        pay_invoice(&mut conn, invoice_id, d(2025, 3, 28), 1).unwrap();
        assert!(crate::error::is_conflict(&delete_charge(&mut conn, charge).unwrap_err()));
    }
}
