// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::invest;
use crate::engine::quotes::{self, HttpQuoteProvider};
use crate::models::{AssetClass, TradeSide};
use crate::utils::{id_for_account, maybe_print_json, parse_date, parse_decimal, pretty_table};
use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add-asset", sub)) => add_asset(conn, sub),
        Some(("list-assets", sub)) => list_assets(conn, sub),
        Some(("trade", sub)) => trade(conn, sub),
        Some(("rm-trade", sub)) => {
            let id = *sub.get_one::<i64>("id").unwrap();
            invest::delete_trade_with_cash_reversal(conn, id)?;
            println!("Removed trade #{} and reversed its cash leg", id);
            Ok(())
        }
        Some(("income", sub)) => income(conn, sub),
        Some(("price", sub)) => price_cmd(conn, sub),
        Some(("portfolio", sub)) => portfolio(conn, sub),
        Some(("summary", sub)) => summary(conn, sub),
        Some(("refresh", sub)) => refresh(conn, sub),
        _ => Ok(()),
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn add_asset(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let symbol = sub.get_one::<String>("symbol").unwrap();
    let name = sub.get_one::<String>("name").unwrap();
    let class = AssetClass::parse(sub.get_one::<String>("class").unwrap())?;
    let broker = sub
        .get_one::<String>("broker")
        .map(|n| id_for_account(conn, n))
        .transpose()?;
    invest::add_asset(
        conn,
        symbol,
        name,
        class,
        sub.get_one::<String>("sector").map(|s| s.as_str()),
        sub.get_one::<String>("currency").map(|s| s.as_str()),
        broker,
    )?;
    println!("Added asset '{}' ({})", symbol.to_uppercase(), class.as_str());
    Ok(())
}

fn list_assets(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT a.symbol, a.name, a.asset_class, a.sector, a.currency, b.name
         FROM assets a LEFT JOIN accounts b ON b.id=a.broker_account_id
         ORDER BY a.symbol",
    )?;
    #[derive(serde::Serialize)]
    struct AssetRow {
        symbol: String,
        name: String,
        asset_class: String,
        sector: String,
        currency: String,
        broker: Option<String>,
    }
    let rows: Vec<AssetRow> = stmt
        .query_map([], |r| {
            Ok(AssetRow {
                symbol: r.get(0)?,
                name: r.get(1)?,
                asset_class: r.get(2)?,
                sector: r.get(3)?,
                currency: r.get(4)?,
                broker: r.get(5)?,
            })
        })?
        .collect::<std::result::Result<_, _>>()?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|r| {
            vec![
                r.symbol,
                r.name,
                r.asset_class,
                r.sector,
                r.currency,
                r.broker.unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Symbol", "Name", "Class", "Sector", "CCY", "Broker"], data)
    );
    Ok(())
}

fn trade(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let input = invest::TradeInput {
        symbol: sub.get_one::<String>("symbol").unwrap().to_uppercase(),
        date: match sub.get_one::<String>("date") {
            Some(s) => parse_date(s)?,
            None => today(),
        },
        side: TradeSide::parse(sub.get_one::<String>("side").unwrap())?,
        quantity: parse_decimal(sub.get_one::<String>("qty").unwrap())?,
        price: parse_decimal(sub.get_one::<String>("price").unwrap())?,
        exchange_rate: sub
            .get_one::<String>("fx")
            .map(|s| parse_decimal(s))
            .transpose()?,
        fees: parse_decimal(sub.get_one::<String>("fees").unwrap())?,
        tax_pct: sub
            .get_one::<String>("tax-pct")
            .map(|s| parse_decimal(s))
            .transpose()?,
        taxes: parse_decimal(sub.get_one::<String>("taxes").unwrap())?,
        note: sub.get_one::<String>("note").cloned(),
    };
    let out = invest::post_trade(conn, &input)?;
    match out.realized_pnl {
        Some(pnl) => println!(
            "Recorded {} {} (trade #{}, realized {})",
            input.side.as_str(),
            input.symbol,
            out.trade_id,
            pnl
        ),
        None => println!(
            "Recorded {} {} (trade #{})",
            input.side.as_str(),
            input.symbol,
            out.trade_id
        ),
    }
    Ok(())
}

fn income(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let symbol = sub.get_one::<String>("symbol").unwrap().to_uppercase();
    let income_type = sub.get_one::<String>("type").unwrap().to_uppercase();
    let date = match sub.get_one::<String>("date") {
        Some(s) => parse_date(s)?,
        None => today(),
    };
    let amount = parse_decimal(sub.get_one::<String>("amount").unwrap())?;
    let note = sub.get_one::<String>("note").map(|s| s.as_str());
    invest::post_income(conn, &symbol, date, &income_type, amount, note)?;
    println!("Recorded {} of {} for {}", income_type, amount, symbol);
    Ok(())
}

fn price_cmd(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("set", sub)) => {
            let symbol = sub.get_one::<String>("symbol").unwrap().to_uppercase();
            let date = parse_date(sub.get_one::<String>("date").unwrap())?;
            let price = parse_decimal(sub.get_one::<String>("price").unwrap())?;
            invest::set_price(conn, &symbol, date, price, Some("manual"))?;
            println!("Stored price {} for {} at {}", price, symbol, date);
            Ok(())
        }
        Some(("list", _)) => {
            let mut stmt = conn.prepare(
                "SELECT a.symbol, p.date, p.price, p.source
                 FROM prices p JOIN assets a ON a.id=p.asset_id
                 ORDER BY p.date DESC LIMIT 50",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, Option<String>>(3)?,
                ))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (sym, date, px, src) = row?;
                data.push(vec![sym, date, px, src.unwrap_or_default()]);
            }
            println!("{}", pretty_table(&["Symbol", "Date", "Price", "Source"], data));
            Ok(())
        }
        _ => Ok(()),
    }
}

fn class_filter(sub: &clap::ArgMatches) -> Result<Option<AssetClass>> {
    sub.get_one::<String>("class")
        .map(|s| AssetClass::parse(s))
        .transpose()
}

fn portfolio(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let rows = invest::portfolio_view(conn, class_filter(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
        return Ok(());
    }
    let data = rows
        .into_iter()
        .map(|p| {
            vec![
                p.symbol,
                p.asset_class,
                p.quantity,
                p.avg_cost,
                p.cost_basis,
                p.last_price.unwrap_or_default(),
                p.market_value.unwrap_or_default(),
                p.unrealized.unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(
            &["Symbol", "Class", "Qty", "Avg Cost", "Basis", "Last", "Market", "Unrealized"],
            data
        )
    );
    Ok(())
}

fn summary(conn: &Connection, sub: &clap::ArgMatches) -> Result<()> {
    let s = invest::summary(conn, class_filter(sub)?)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &s)? {
        return Ok(());
    }
    let rows = vec![
        vec!["Assets".to_string(), s.assets.to_string()],
        vec!["Invested".to_string(), s.total_invested],
        vec!["Market".to_string(), s.total_market],
        vec!["Unrealized".to_string(), s.total_unrealized],
        vec!["Realized".to_string(), s.total_realized],
        vec!["Income".to_string(), s.total_income],
        vec!["Total return".to_string(), s.total_return],
        vec!["Total return %".to_string(), s.total_return_pct],
        vec!["Broker cash".to_string(), s.broker_balance],
    ];
    println!("{}", pretty_table(&["Metric", "Value"], rows));
    Ok(())
}

fn refresh(conn: &mut Connection, sub: &clap::ArgMatches) -> Result<()> {
    let workers = *sub.get_one::<usize>("workers").unwrap();
    let timeout_s = *sub.get_one::<u64>("timeout").unwrap();
    let groups: Vec<String> = sub
        .get_many::<String>("group")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();
    let provider = HttpQuoteProvider::new(timeout_s)?;
    let report = quotes::refresh_prices(conn, &provider, workers, &groups)?;
    if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &report)? {
        return Ok(());
    }
    let data = report
        .items
        .iter()
        .map(|i| {
            vec![
                i.symbol.clone(),
                if i.ok { "ok" } else { "fail" }.to_string(),
                i.price.clone().unwrap_or_default(),
                i.source.clone().unwrap_or_default(),
                format!("{:.2}s", i.elapsed_s),
                i.error.clone().unwrap_or_default(),
            ]
        })
        .collect();
    println!(
        "{}",
        pretty_table(&["Symbol", "Status", "Price", "Source", "Elapsed", "Error"], data)
    );
    println!(
        "Saved {}/{} quotes ({} failed)",
        report.saved, report.total, report.failed
    );
    Ok(())
}
