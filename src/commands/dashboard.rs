// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::reports;
use crate::models::View;
use crate::utils::{id_for_account, maybe_print_json, parse_date, pretty_table};
use anyhow::Result;
use chrono::{Datelike, NaiveDate};
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("kpis", sub)) => kpis(conn, sub),
        Some(("monthly", sub)) => monthly(conn, sub),
        Some(("by-category", sub)) => by_category(conn, sub),
        Some(("balances", sub)) => balances(conn, sub),
        Some(("commitments", sub)) => commitments(conn, sub),
        _ => Ok(()),
    }
}

/// Default range: the current calendar month.
fn period(sub: &clap::ArgMatches) -> Result<(NaiveDate, NaiveDate)> {
    let today = chrono::Local::now().date_naive();
    let from = match sub.get_one::<String>("from") {
        Some(s) => parse_date(s)?,
        None => NaiveDate::from_ymd_opt(today.year(), today.month(), 1).unwrap_or(today),
    };
    let to = match sub.get_one::<String>("to") {
        Some(s) => parse_date(s)?,
        None => crate::engine::cycle::clamped_date(today.year(), today.month(), 31)?,
    };
    Ok((from, to))
}

fn filters(conn: &Connection, sub: &clap::ArgMatches) -> Result<(Option<i64>, View)> {
    let account = sub
        .get_one::<String>("account")
        .map(|name| id_for_account(conn, name))
        .transpose()?;
    let view = View::parse(sub.get_one::<String>("view").unwrap())?;
    Ok((account, view))
}

fn kpis(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (from, to) = period(sub)?;
    let (account, view) = filters(conn, sub)?;
    let k = reports::kpis(conn, from, to, account, view)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &k)? {
        return Ok(());
    }
    let rows = vec![
        vec!["Receitas".to_string(), k.receitas],
        vec!["Despesas".to_string(), k.despesas],
        vec!["Saldo".to_string(), k.saldo],
    ];
    println!("{}", pretty_table(&["KPI", "Value"], rows));
    Ok(())
}

fn monthly(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (from, to) = period(sub)?;
    let (account, view) = filters(conn, sub)?;
    let points = reports::monthly_trend(conn, from, to, account, view)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &points)? {
        return Ok(());
    }
    let data = points
        .into_iter()
        .map(|p| vec![p.month, p.receitas, p.despesas, p.saldo])
        .collect();
    println!(
        "{}",
        pretty_table(&["Month", "Receitas", "Despesas", "Saldo"], data)
    );
    Ok(())
}

fn by_category(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let (from, to) = period(sub)?;
    let (account, view) = filters(conn, sub)?;
    let totals = reports::expenses_by_category(conn, from, to, account, view)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &totals)? {
        return Ok(());
    }
    let data = totals.into_iter().map(|t| vec![t.category, t.total]).collect();
    println!("{}", pretty_table(&["Category", "Total"], data));
    Ok(())
}

fn balances(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let rows = reports::account_balances(conn)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|b| vec![b.account, b.account_type, b.balance])
        .collect();
    println!("{}", pretty_table(&["Account", "Type", "Balance"], data));
    Ok(())
}

fn commitments(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let today = chrono::Local::now().date_naive();
    let aging = reports::commitments_aging(conn, today)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &aging)? {
        return Ok(());
    }
    let rows = vec![
        vec![
            "A vencer".to_string(),
            aging.upcoming.count.to_string(),
            aging.upcoming.total,
        ],
        vec![
            "Vencidos".to_string(),
            aging.overdue.count.to_string(),
            aging.overdue.total,
        ],
    ];
    println!("{}", pretty_table(&["Bucket", "Count", "Total"], rows));
    Ok(())
}
