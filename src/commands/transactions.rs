// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::classify::LedgerMode;
use crate::engine::{commitments, transactions};
use crate::models::{CategoryKind, Method, View};
use crate::utils::{id_for_account, id_for_card, maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => add(conn, sub),
        Some(("list", sub)) => list(conn, sub),
        Some(("rm", sub)) => rm(conn, sub),
        Some(("settle", sub)) => settle(conn, sub),
        _ => Ok(()),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn add(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let description = sub.get_one::<String>("desc").unwrap().clone();
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let account_id = id_for_account(conn, sub.get_one::<String>("account").unwrap())?;
    let method = Method::parse(sub.get_one::<String>("method").unwrap())?;

    let destination_account_id = sub
        .get_one::<String>("to")
        .map(|name| id_for_account(conn, name))
        .transpose()?;

    // the category's kind decides the ledger kind; --to forces a transfer
    let (kind, category_id) = if destination_account_id.is_some() {
        (CategoryKind::Transfer, None)
    } else {
        let name = sub
            .get_one::<String>("category")
            .ok_or_else(|| crate::error::validation("category is required for non-transfers"))?;
        let (id, kind): (i64, String) = conn
            .query_row(
                "SELECT id, kind FROM categories WHERE name=?1",
                params![name],
                |r| Ok((r.get(0)?, r.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| crate::error::validation(format!("category '{}' not found", name)))?;
        (CategoryKind::parse(&kind)?, Some(id))
    };

    let card_id = sub
        .get_one::<String>("card")
        .map(|name| id_for_card(conn, name))
        .transpose()?;

    let entry = transactions::NewEntry {
        date,
        description,
        amount,
        account_id,
        category_id,
        kind,
        method,
        destination_account_id,
        card_id,
        due_day: sub.get_one::<u32>("due-day").copied(),
        repeat_months: sub.get_one::<u32>("repeat").copied(),
        notes: sub.get_one::<String>("notes").cloned(),
    };
    let posted = transactions::post_entry(conn, today(), &entry)?;
    match posted.mode {
        LedgerMode::Normal => println!("Posted entry #{}", posted.ids[0]),
        LedgerMode::Transfer => println!("Posted transfer legs #{} / #{}", posted.ids[0], posted.ids[1]),
        LedgerMode::CreditCardCharge => println!("Registered card charge #{}", posted.ids[0]),
        LedgerMode::FutureSchedule | LedgerMode::FutureCreditSchedule => {
            println!("Scheduled {} occurrence(s), series #{}", posted.ids.len(), posted.ids[0])
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct TxListRow {
    id: i64,
    date: String,
    description: String,
    amount: String,
    account: String,
    category: Option<String>,
    kind: String,
    status: Option<String>,
}

fn list(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let from = sub
        .get_one::<String>("from")
        .map(|s| parse_date(s))
        .transpose()?
        .map(|d| d.to_string())
        .unwrap_or_else(|| "0000-01-01".to_string());
    let to = sub
        .get_one::<String>("to")
        .map(|s| parse_date(s))
        .transpose()?
        .map(|d| d.to_string())
        .unwrap_or_else(|| "9999-12-31".to_string());
    let view = View::parse(sub.get_one::<String>("view").unwrap())?;
    let account = sub
        .get_one::<String>("account")
        .map(|name| id_for_account(conn, name))
        .transpose()?;

    let predicate = match view {
        View::Cash => {
            "(t.charge_status IS NULL OR t.charge_status='Paid') AND t.source_type <> 'credit_commitment'"
        }
        View::Accrual => {
            "(t.charge_status IS NULL OR t.charge_status IN ('Paid','Pending'))"
        }
        View::Commitment => {
            "t.source_type IN ('commitment','credit_commitment') AND t.charge_status='Pending'"
        }
    };
    let mut sql = format!(
        "SELECT t.id, t.date, t.description, t.amount, a.name, c.name, t.kind, t.charge_status
         FROM transactions t
         JOIN accounts a ON a.id=t.account_id
         LEFT JOIN categories c ON c.id=t.category_id
         WHERE {} AND t.date>=?1 AND t.date<=?2",
        predicate
    );
    if account.is_some() {
        sql.push_str(" AND t.account_id=?3");
    }
    sql.push_str(" ORDER BY t.date, t.id");

    let mut stmt = conn.prepare(&sql)?;
    let map_row = |r: &rusqlite::Row<'_>| {
        Ok(TxListRow {
            id: r.get(0)?,
            date: r.get(1)?,
            description: r.get(2)?,
            amount: r.get(3)?,
            account: r.get(4)?,
            category: r.get(5)?,
            kind: r.get(6)?,
            status: r.get(7)?,
        })
    };
    let rows: Vec<TxListRow> = match account {
        Some(acct) => stmt
            .query_map(params![from, to, acct], map_row)?
            .collect::<std::result::Result<_, _>>()?,
        None => stmt
            .query_map(params![from, to], map_row)?
            .collect::<std::result::Result<_, _>>()?,
    };

    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|r| {
            vec![
                r.id.to_string(),
                r.date,
                r.description,
                r.amount,
                r.account,
                r.category.unwrap_or_default(),
                r.kind,
                r.status.unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["ID", "Date", "Description", "Amount", "Account", "Category", "Kind", "Status"],
            data
        )
    );
    Ok(())
}

fn rm(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let source_type: Option<String> = conn
        .query_row(
            "SELECT source_type FROM transactions WHERE id=?1",
            params![id],
            |r| r.get(0),
        )
        .optional()?;
    let Some(source_type) = source_type else {
        return Err(crate::error::integrity(format!("transaction {} not found", id)));
    };
    let n = if source_type == "commitment" || source_type == "credit_commitment" {
        let scope = commitments::DeleteScope::parse(sub.get_one::<String>("scope").unwrap())?;
        commitments::delete_scope(conn, id, scope)?
    } else {
        transactions::delete_transaction(conn, id)?
    };
    println!("Removed {} entry(ies)", n);
    Ok(())
}

fn settle(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let id = *sub.get_one::<i64>("id").unwrap();
    let date = parse_date(sub.get_one::<String>("date").unwrap())?;
    let account_id = id_for_account(conn, sub.get_one::<String>("account").unwrap())?;
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let notes = sub.get_one::<String>("notes").map(|s| s.as_str());
    commitments::settle(conn, id, date, account_id, amount, notes)?;
    println!("Settled occurrence #{} on {}", id, date);
    Ok(())
}
