// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! CSV import with named columns, per-row error reporting and a preview
//! mode that never writes.

use crate::engine::invest;
use crate::models::{AssetClass, Method, TradeSide};
use crate::utils::{id_for_account, id_for_category, parse_date, parse_decimal};
use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("transactions", sub)) => import_transactions(conn, sub),
        Some(("assets", sub)) => import_assets(conn, sub),
        Some(("trades", sub)) => import_trades(conn, sub),
        _ => Ok(()),
    }
}

struct Columns {
    headers: StringRecord,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        let trimmed: StringRecord = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        Self { headers: trimmed }
    }

    fn required<'r>(&self, rec: &'r StringRecord, name: &str) -> Result<&'r str> {
        self.optional(rec, name)
            .ok_or_else(|| crate::error::validation(format!("column '{}' is missing", name)))
    }

    fn optional<'r>(&self, rec: &'r StringRecord, name: &str) -> Option<&'r str> {
        let idx = self.headers.iter().position(|h| h == name)?;
        rec.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty())
    }
}

fn report(kind: &str, imported: usize, errors: &[String], preview: bool) {
    if preview {
        println!("Preview: {} valid {} row(s), nothing written", imported, kind);
    } else {
        println!("Imported {} {} row(s)", imported, kind);
    }
    for e in errors {
        println!("  {}", e);
    }
    if !errors.is_empty() {
        println!("{} row(s) skipped", errors.len());
    }
}

fn import_transactions(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("file").unwrap().trim();
    let preview = sub.get_flag("preview");
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let cols = Columns::new(rdr.headers()?);

    let tx = conn.transaction()?;
    let mut imported = 0usize;
    let mut errors = Vec::new();
    for (lineno, result) in rdr.records().enumerate() {
        let row = lineno + 2; // header is line 1
        let parsed = result
            .map_err(anyhow::Error::from)
            .and_then(|rec| parse_tx_row(&tx, &cols, &rec));
        match parsed {
            Ok((date, desc, amount, account_id, category_id, kind, method, notes)) => {
                if !preview {
                    tx.execute(
                        "INSERT INTO transactions(date, description, amount, account_id, category_id, kind, method, source_type, notes)
                         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, 'normal', ?8)",
                        params![date, desc, amount.to_string(), account_id, category_id, kind, method, notes],
                    )?;
                }
                imported += 1;
            }
            Err(e) => errors.push(format!("row {}: {:#}", row, e)),
        }
    }
    // preview rolls back on drop
    if !preview {
        tx.commit()?;
    }
    report("transaction", imported, &errors, preview);
    Ok(())
}

type TxRow = (
    String,
    String,
    Decimal,
    i64,
    Option<i64>,
    String,
    Option<String>,
    Option<String>,
);

fn parse_tx_row(conn: &Connection, cols: &Columns, rec: &StringRecord) -> Result<TxRow> {
    let date = parse_date(cols.required(rec, "date")?)?;
    let desc = cols.required(rec, "description")?.to_string();
    let amount = parse_decimal(cols.required(rec, "amount")?)?;
    let account_id = id_for_account(conn, cols.required(rec, "account")?)?;
    let (category_id, kind) = match cols.optional(rec, "category") {
        Some(name) => {
            let id = id_for_category(conn, name)?;
            let kind: String = conn.query_row(
                "SELECT kind FROM categories WHERE id=?1",
                params![id],
                |r| r.get(0),
            )?;
            (Some(id), kind)
        }
        None => {
            let kind = if amount >= Decimal::ZERO { "Income" } else { "Expense" };
            (None, kind.to_string())
        }
    };
    let method = cols
        .optional(rec, "method")
        .map(Method::parse)
        .transpose()?
        .map(|m| m.as_str().to_string());
    let notes = cols.optional(rec, "notes").map(|s| s.to_string());
    Ok((
        date.to_string(),
        desc,
        amount,
        account_id,
        category_id,
        kind,
        method,
        notes,
    ))
}

fn import_assets(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("file").unwrap().trim();
    let preview = sub.get_flag("preview");
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let cols = Columns::new(rdr.headers()?);

    let tx = conn.transaction()?;
    let mut imported = 0usize;
    let mut errors = Vec::new();
    for (lineno, result) in rdr.records().enumerate() {
        let row = lineno + 2;
        let parsed = result.map_err(anyhow::Error::from).and_then(|rec| {
            let symbol = cols.required(&rec, "symbol")?.to_uppercase();
            let name = cols.required(&rec, "name")?.to_string();
            let class = AssetClass::parse(cols.required(&rec, "asset_class")?)?;
            let sector = cols.optional(&rec, "sector").map(|s| s.to_string());
            let currency = cols.optional(&rec, "currency").map(|s| s.to_uppercase());
            let broker = cols
                .optional(&rec, "broker_account")
                .map(|n| id_for_account(&tx, n))
                .transpose()?;
            Ok((symbol, name, class, sector, currency, broker))
        });
        match parsed {
            Ok((symbol, name, class, sector, currency, broker)) => {
                if !preview {
                    invest::add_asset(
                        &tx,
                        &symbol,
                        &name,
                        class,
                        sector.as_deref(),
                        currency.as_deref(),
                        broker,
                    )?;
                }
                imported += 1;
            }
            Err(e) => errors.push(format!("row {}: {:#}", row, e)),
        }
    }
    if !preview {
        tx.commit()?;
    }
    report("asset", imported, &errors, preview);
    Ok(())
}

fn import_trades(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let path = sub.get_one::<String>("file").unwrap().trim();
    let preview = sub.get_flag("preview");
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("Open CSV {}", path))?;
    let cols = Columns::new(rdr.headers()?);

    // trades post through the engine so class rules and cash legs apply;
    // preview validates fields only
    let mut imported = 0usize;
    let mut errors = Vec::new();
    let mut inputs = Vec::new();
    for (lineno, result) in rdr.records().enumerate() {
        let row = lineno + 2;
        let parsed = result.map_err(anyhow::Error::from).and_then(|rec| {
            Ok(invest::TradeInput {
                symbol: cols.required(&rec, "symbol")?.to_uppercase(),
                date: parse_date(cols.required(&rec, "date")?)?,
                side: TradeSide::parse(cols.required(&rec, "side")?)?,
                quantity: parse_decimal(cols.required(&rec, "quantity")?)?,
                price: parse_decimal(cols.required(&rec, "price")?)?,
                exchange_rate: cols
                    .optional(&rec, "exchange_rate")
                    .map(parse_decimal)
                    .transpose()?,
                fees: cols
                    .optional(&rec, "fees")
                    .map(parse_decimal)
                    .transpose()?
                    .unwrap_or(Decimal::ZERO),
                tax_pct: cols.optional(&rec, "tax_pct").map(parse_decimal).transpose()?,
                taxes: cols
                    .optional(&rec, "taxes")
                    .map(parse_decimal)
                    .transpose()?
                    .unwrap_or(Decimal::ZERO),
                note: cols.optional(&rec, "note").map(|s| s.to_string()),
            })
        });
        match parsed {
            Ok(input) => inputs.push((row, input)),
            Err(e) => errors.push(format!("row {}: {:#}", row, e)),
        }
    }
    for (row, input) in inputs {
        if preview {
            imported += 1;
            continue;
        }
        match invest::post_trade(conn, &input) {
            Ok(_) => imported += 1,
            Err(e) => errors.push(format!("row {}: {:#}", row, e)),
        }
    }
    report("trade", imported, &errors, preview);
    Ok(())
}
