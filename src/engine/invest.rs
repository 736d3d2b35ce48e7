// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Investment accounting: trade validation by asset class, average-cost
//! positions, realized/unrealized P&L, and the broker cash legs every
//! trade or income event moves.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error;
use crate::models::{AccountType, Asset, AssetClass, TradeSide, INCOME_TYPES};
use crate::utils::{fmt_amount, parse_decimal};

const QTY_EPSILON: &str = "0.00000001";

pub fn fetch_asset(conn: &Connection, symbol: &str) -> Result<Asset> {
    let row: Option<(i64, String, String, String, String, String, Option<i64>)> = conn
        .query_row(
            "SELECT id, symbol, name, asset_class, sector, currency, broker_account_id
             FROM assets WHERE symbol=?1",
            params![symbol],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    let Some((id, symbol, name, asset_class, sector, currency, broker_account_id)) = row else {
        return Err(error::integrity(format!("asset '{}' not found", symbol)));
    };
    Ok(Asset {
        id,
        symbol,
        name,
        asset_class: AssetClass::parse(&asset_class)?,
        sector,
        currency,
        broker_account_id,
    })
}

pub fn add_asset(
    conn: &Connection,
    symbol: &str,
    name: &str,
    asset_class: AssetClass,
    sector: Option<&str>,
    currency: Option<&str>,
    broker_account_id: Option<i64>,
) -> Result<i64> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(error::validation("asset symbol must not be empty"));
    }
    let currency = currency.unwrap_or(if asset_class.is_us_listed() { "USD" } else { "BRL" });
    if let Some(acct) = broker_account_id {
        let t = crate::engine::transactions::account_type(conn, acct)?;
        if t != AccountType::Brokerage {
            return Err(error::validation(
                "asset broker account must be a brokerage account",
            ));
        }
    }
    conn.execute(
        "INSERT INTO assets(symbol, name, asset_class, sector, currency, broker_account_id)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            symbol,
            name,
            asset_class.as_str(),
            sector.unwrap_or("Não definido"),
            currency,
            broker_account_id
        ],
    )
    .with_context(|| format!("Create asset '{}'", symbol))?;
    Ok(conn.last_insert_rowid())
}

/// Held quantity, cost basis (in BRL) and realized P&L, replayed from the
/// full trade history in date order.
pub fn position_for(conn: &Connection, asset_id: i64) -> Result<(Decimal, Decimal, Decimal)> {
    let mut stmt = conn.prepare(
        "SELECT side, quantity, price, exchange_rate, fees, taxes
         FROM trades WHERE asset_id=?1 ORDER BY date, id",
    )?;
    let rows = stmt.query_map(params![asset_id], |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
            r.get::<_, String>(4)?,
            r.get::<_, String>(5)?,
        ))
    })?;

    let mut qty = Decimal::ZERO;
    let mut basis = Decimal::ZERO;
    let mut realized = Decimal::ZERO;
    for row in rows {
        let (side, q, p, fx, fees, taxes) = row?;
        let q = parse_decimal(&q)?;
        let p = parse_decimal(&p)?;
        let fx = parse_decimal(&fx)?;
        let costs = (parse_decimal(&fees)? + parse_decimal(&taxes)?) * fx;
        let gross = q * p * fx;
        match TradeSide::parse(&side)? {
            TradeSide::Buy => {
                qty += q;
                basis += gross + costs;
            }
            TradeSide::Sell => {
                if qty.is_zero() {
                    return Err(error::integrity(format!(
                        "sell without position for asset {}",
                        asset_id
                    )));
                }
                let avg = basis / qty;
                realized += (gross - costs) - q * avg;
                basis -= q * avg;
                qty -= q;
            }
        }
    }
    Ok((qty, basis, realized))
}

fn ensure_invest_category(conn: &Connection) -> Result<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO categories(name, kind) VALUES('Investimentos', 'Transfer')",
        [],
    )?;
    crate::utils::id_for_category(conn, "Investimentos")
}

/// Settled cash balance of an account, excluding rows that have no cash
/// effect yet (pending schedules and unconverted card commitments).
pub fn cash_balance(conn: &Connection, account_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare(
        "SELECT amount FROM transactions
         WHERE account_id=?1
           AND (charge_status IS NULL OR charge_status='Paid')
           AND source_type <> 'credit_commitment'",
    )?;
    let rows = stmt.query_map(params![account_id], |r| r.get::<_, String>(0))?;
    let mut sum = Decimal::ZERO;
    for a in rows {
        sum += parse_decimal(&a?)?;
    }
    Ok(sum)
}

#[derive(Debug, Clone)]
pub struct TradeInput {
    pub symbol: String,
    pub date: NaiveDate,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub exchange_rate: Option<Decimal>,
    pub fees: Decimal,
    /// IR/IOF percentage, fixed income redemptions only.
    pub tax_pct: Option<Decimal>,
    pub taxes: Decimal,
    pub note: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TradeOutcome {
    pub trade_id: i64,
    pub cash_tx_id: i64,
    pub realized_pnl: Option<String>,
}

/// Validate and persist one trade plus its broker cash leg, atomically.
pub fn post_trade(conn: &mut Connection, input: &TradeInput) -> Result<TradeOutcome> {
    let asset = fetch_asset(conn, &input.symbol)?;
    let broker = asset.broker_account_id.ok_or_else(|| {
        error::validation(format!(
            "asset '{}' has no linked broker account",
            asset.symbol
        ))
    })?;

    let mut quantity = input.quantity;
    let mut price = input.price;
    let mut taxes = input.taxes;
    if taxes < Decimal::ZERO || input.fees < Decimal::ZERO {
        return Err(error::validation("fees and taxes must not be negative"));
    }

    if asset.asset_class.is_fixed_income() {
        // quantity carries no meaning for fixed income: one unit, price = value
        quantity = Decimal::ONE;
        if price <= Decimal::ZERO {
            return Err(error::validation("applied/redeemed value must be positive"));
        }
        match (input.side, input.tax_pct) {
            (TradeSide::Sell, Some(pct)) => {
                if pct < Decimal::ZERO || pct > Decimal::from(100) {
                    return Err(error::validation("IR/IOF percentage must be in [0, 100]"));
                }
                taxes += price * pct / Decimal::from(100);
            }
            (TradeSide::Sell, None) => {}
            (TradeSide::Buy, Some(pct)) if !pct.is_zero() => {
                return Err(error::validation(
                    "IR/IOF percentage only applies to redemptions",
                ));
            }
            (TradeSide::Buy, _) => {}
        }
    } else {
        if quantity <= Decimal::ZERO || price <= Decimal::ZERO {
            return Err(error::validation("quantity and price must be positive"));
        }
        if input.tax_pct.is_some() {
            return Err(error::validation(
                "IR/IOF percentage only applies to fixed income redemptions",
            ));
        }
        if asset.asset_class.requires_integer_quantity() && !quantity.fract().is_zero() {
            return Err(error::validation(format!(
                "{} requires a whole quantity",
                asset.asset_class.as_str()
            )));
        }
    }

    let usd = asset.asset_class.is_us_listed() || asset.currency == "USD";
    let fx = match input.exchange_rate {
        Some(r) if r > Decimal::ZERO => r,
        Some(_) => return Err(error::validation("exchange rate must be positive")),
        None if usd => {
            return Err(error::validation(format!(
                "asset '{}' is USD-denominated and requires an exchange rate",
                asset.symbol
            )))
        }
        None => Decimal::ONE,
    };

    let gross = quantity * price * fx;
    let costs = (input.fees + taxes) * fx;
    let (held, basis, _) = position_for(conn, asset.id)?;

    let (cash_amount, description, realized) = match input.side {
        TradeSide::Buy => {
            let cost = gross + costs;
            let available = cash_balance(conn, broker)?;
            if available < cost {
                return Err(error::validation(format!(
                    "insufficient broker cash: have {}, need {}",
                    available.round_dp(2),
                    cost.round_dp(2)
                )));
            }
            (-cost, format!("INV BUY {}", asset.symbol), None)
        }
        TradeSide::Sell => {
            if quantity > held {
                return Err(error::conflict(format!(
                    "cannot sell {} of '{}': only {} held",
                    quantity, asset.symbol, held
                )));
            }
            let avg = basis / held;
            let proceeds = gross - costs;
            let pnl = proceeds - quantity * avg;
            (proceeds, format!("INV SELL {}", asset.symbol), Some(pnl))
        }
    };

    let category_id = ensure_invest_category(conn)?;
    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO trades(asset_id, date, side, quantity, price, exchange_rate, fees, taxes, note)
         VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            asset.id,
            input.date.to_string(),
            input.side.as_str(),
            quantity.to_string(),
            price.to_string(),
            fx.to_string(),
            input.fees.to_string(),
            taxes.to_string(),
            input.note
        ],
    )?;
    let trade_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO transactions(date, description, amount, account_id, category_id, kind, source_type)
         VALUES(?1, ?2, ?3, ?4, ?5, 'Transfer', 'invest')",
        params![
            input.date.to_string(),
            description,
            cash_amount.to_string(),
            broker,
            category_id
        ],
    )?;
    let cash_tx_id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(TradeOutcome {
        trade_id,
        cash_tx_id,
        realized_pnl: realized.map(|p| fmt_amount(&p)),
    })
}

/// Record a dividend/interest event and credit the broker account.
pub fn post_income(
    conn: &mut Connection,
    symbol: &str,
    date: NaiveDate,
    income_type: &str,
    amount: Decimal,
    note: Option<&str>,
) -> Result<i64> {
    if amount <= Decimal::ZERO {
        return Err(error::validation("income amount must be positive"));
    }
    if !INCOME_TYPES.contains(&income_type) {
        return Err(error::validation(format!(
            "invalid income type '{}', expected one of {}",
            income_type,
            INCOME_TYPES.join("|")
        )));
    }
    let asset = fetch_asset(conn, symbol)?;
    let broker = asset.broker_account_id.ok_or_else(|| {
        error::validation(format!(
            "asset '{}' has no linked broker account",
            asset.symbol
        ))
    })?;
    let category_id = ensure_invest_category(conn)?;

    let tx = conn.transaction()?;
    tx.execute(
        "INSERT INTO income_events(asset_id, date, type, amount, note) VALUES(?1, ?2, ?3, ?4, ?5)",
        params![asset.id, date.to_string(), income_type, amount.to_string(), note],
    )?;
    let income_id = tx.last_insert_rowid();
    tx.execute(
        "INSERT INTO transactions(date, description, amount, account_id, category_id, kind, source_type)
         VALUES(?1, ?2, ?3, ?4, ?5, 'Income', 'invest')",
        params![
            date.to_string(),
            format!("PROVENTO {} ({})", asset.symbol, income_type),
            amount.to_string(),
            broker,
            category_id
        ],
    )?;
    tx.commit()?;
    Ok(income_id)
}

/// Remove a trade and the cash leg it moved, in one transaction.
pub fn delete_trade_with_cash_reversal(conn: &mut Connection, trade_id: i64) -> Result<()> {
    let row: Option<(i64, String, String, String, String, String, String)> = conn
        .query_row(
            "SELECT asset_id, date, side, quantity, price, exchange_rate, fees
             FROM trades WHERE id=?1",
            params![trade_id],
            |r| {
                Ok((
                    r.get(0)?,
                    r.get(1)?,
                    r.get(2)?,
                    r.get(3)?,
                    r.get(4)?,
                    r.get(5)?,
                    r.get(6)?,
                ))
            },
        )
        .optional()?;
    let Some((asset_id, date, side, ..)) = row else {
        return Err(error::integrity(format!("trade {} not found", trade_id)));
    };
    let symbol: String = conn.query_row(
        "SELECT symbol FROM assets WHERE id=?1",
        params![asset_id],
        |r| r.get(0),
    )?;
    let side = TradeSide::parse(&side)?;
    let leg_desc = match side {
        TradeSide::Buy => format!("INV BUY {}", symbol),
        TradeSide::Sell => format!("INV SELL {}", symbol),
    };

    let tx = conn.transaction()?;
    tx.execute("DELETE FROM trades WHERE id=?1", params![trade_id])?;
    tx.execute(
        "DELETE FROM transactions WHERE id=(
             SELECT id FROM transactions
             WHERE source_type='invest' AND description=?1 AND date=?2
             ORDER BY id DESC LIMIT 1)",
        params![leg_desc, date],
    )?;
    tx.commit()?;
    Ok(())
}

/// Price upsert; the latest date wins at valuation time.
pub fn set_price(
    conn: &Connection,
    symbol: &str,
    date: NaiveDate,
    price: Decimal,
    source: Option<&str>,
) -> Result<()> {
    if price <= Decimal::ZERO {
        return Err(error::validation("price must be positive"));
    }
    let asset = fetch_asset(conn, symbol)?;
    conn.execute(
        "INSERT INTO prices(asset_id, date, price, source) VALUES(?1, ?2, ?3, ?4)
         ON CONFLICT(asset_id, date) DO UPDATE SET price=excluded.price, source=excluded.source",
        params![asset.id, date.to_string(), price.to_string(), source],
    )?;
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct PositionRow {
    pub symbol: String,
    pub name: String,
    pub asset_class: String,
    pub quantity: String,
    pub avg_cost: String,
    pub cost_basis: String,
    pub last_price: Option<String>,
    pub market_value: Option<String>,
    pub unrealized: Option<String>,
}

/// Open positions with their latest valuation, optionally filtered by class.
pub fn portfolio_view(conn: &Connection, class: Option<AssetClass>) -> Result<Vec<PositionRow>> {
    let mut stmt = conn.prepare("SELECT id, symbol, name, asset_class FROM assets ORDER BY symbol")?;
    let assets = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, String>(3)?,
        ))
    })?;

    let eps: Decimal = parse_decimal(QTY_EPSILON)?;
    let mut out = Vec::new();
    for a in assets {
        let (id, symbol, name, class_str) = a?;
        let asset_class = AssetClass::parse(&class_str)?;
        if let Some(filter) = class {
            if asset_class != filter {
                continue;
            }
        }
        let (qty, basis, _) = position_for(conn, id)?;
        if qty < eps {
            continue;
        }
        let avg = basis / qty;
        let last = latest_price(conn, id)?;
        let (market, unreal) = match last {
            Some(p) => {
                let mv = qty * p;
                (Some(mv), Some(mv - basis))
            }
            None => (None, None),
        };
        out.push(PositionRow {
            symbol,
            name,
            asset_class: class_str,
            quantity: qty.normalize().to_string(),
            avg_cost: avg.round_dp(4).to_string(),
            cost_basis: fmt_amount(&basis),
            last_price: last.map(|p| p.round_dp(4).to_string()),
            market_value: market.map(|v| fmt_amount(&v)),
            unrealized: unreal.map(|v| fmt_amount(&v)),
        });
    }
    Ok(out)
}

fn latest_price(conn: &Connection, asset_id: i64) -> Result<Option<Decimal>> {
    let p: Option<String> = conn
        .query_row(
            "SELECT price FROM prices WHERE asset_id=?1 ORDER BY date DESC LIMIT 1",
            params![asset_id],
            |r| r.get(0),
        )
        .optional()?;
    match p {
        Some(s) => Ok(Some(parse_decimal(&s)?)),
        None => Ok(None),
    }
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub assets: usize,
    pub total_invested: String,
    pub total_market: String,
    pub total_unrealized: String,
    pub total_realized: String,
    pub total_income: String,
    pub total_return: String,
    pub total_return_pct: String,
    pub broker_balance: String,
}

pub fn summary(conn: &Connection, class: Option<AssetClass>) -> Result<Summary> {
    let mut stmt = conn.prepare("SELECT id, asset_class FROM assets")?;
    let assets = stmt.query_map([], |r| {
        Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?))
    })?;

    let eps: Decimal = parse_decimal(QTY_EPSILON)?;
    let mut count = 0usize;
    let mut invested = Decimal::ZERO;
    let mut market = Decimal::ZERO;
    let mut unrealized = Decimal::ZERO;
    let mut realized = Decimal::ZERO;
    let mut income = Decimal::ZERO;
    for a in assets {
        let (id, class_str) = a?;
        if let Some(filter) = class {
            if AssetClass::parse(&class_str)? != filter {
                continue;
            }
        }
        let (qty, basis, pnl) = position_for(conn, id)?;
        realized += pnl;
        income += income_total(conn, id)?;
        if qty < eps {
            continue;
        }
        count += 1;
        invested += basis;
        if let Some(p) = latest_price(conn, id)? {
            let mv = qty * p;
            market += mv;
            unrealized += mv - basis;
        }
    }
    let total_return = unrealized + realized + income;
    let pct = if invested > Decimal::ZERO {
        total_return / invested * Decimal::from(100)
    } else {
        Decimal::ZERO
    };

    // cash sitting at the brokers, regardless of any class filter
    let mut broker_balance = Decimal::ZERO;
    {
        let mut stmt = conn.prepare("SELECT id FROM accounts WHERE type='Brokerage'")?;
        let ids = stmt.query_map([], |r| r.get::<_, i64>(0))?;
        for id in ids {
            broker_balance += cash_balance(conn, id?)?;
        }
    }

    Ok(Summary {
        assets: count,
        total_invested: fmt_amount(&invested),
        total_market: fmt_amount(&market),
        total_unrealized: fmt_amount(&unrealized),
        total_realized: fmt_amount(&realized),
        total_income: fmt_amount(&income),
        total_return: fmt_amount(&total_return),
        total_return_pct: fmt_amount(&pct),
        broker_balance: fmt_amount(&broker_balance),
    })
}

fn income_total(conn: &Connection, asset_id: i64) -> Result<Decimal> {
    let mut stmt = conn.prepare("SELECT amount FROM income_events WHERE asset_id=?1")?;
    let rows = stmt.query_map(params![asset_id], |r| r.get::<_, String>(0))?;
    let mut sum = Decimal::ZERO;
    for a in rows {
        sum += parse_decimal(&a?)?;
    }
    Ok(sum)
}
