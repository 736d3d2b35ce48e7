// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Dashboard aggregation. Every figure is derived from one row set per
//! view; account balances deliberately ignore dashboard filters.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params_from_iter, Connection};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::engine::invest::cash_balance;
use crate::models::View;
use crate::utils::{fmt_amount, parse_decimal};

struct Row {
    date: String,
    amount: Decimal,
    kind: String,
    category_id: Option<i64>,
}

const SETTLED: &str =
    "(charge_status IS NULL OR charge_status='Paid') AND source_type <> 'credit_commitment'";
const PENDING: &str =
    "source_type IN ('commitment','credit_commitment') AND charge_status='Pending'";

fn tx_rows(
    conn: &Connection,
    predicate: &str,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
) -> Result<Vec<Row>> {
    let mut sql = format!(
        "SELECT date, amount, kind, category_id FROM transactions
         WHERE {} AND date>=?1 AND date<=?2",
        predicate
    );
    let mut args: Vec<String> = vec![from.to_string(), to.to_string()];
    if let Some(acct) = account {
        sql.push_str(" AND account_id=?3");
        args.push(acct.to_string());
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, Option<i64>>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (date, amount, kind, category_id) = row?;
        out.push(Row {
            date,
            amount: parse_decimal(&amount)?,
            kind,
            category_id,
        });
    }
    Ok(out)
}

/// Charges sitting on unpaid invoices, attributed to the card's account at
/// their purchase dates. Stored positive; reported as expense outflows.
fn unpaid_charge_rows(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
) -> Result<Vec<Row>> {
    let mut sql = "SELECT ch.date, ch.amount, ch.category_id FROM card_charges ch
         JOIN card_invoices iv ON iv.card_id=ch.card_id AND iv.invoice_period=ch.invoice_period
         JOIN cards c ON c.id=ch.card_id
         WHERE iv.status='OPEN' AND ch.date>=?1 AND ch.date<=?2"
        .to_string();
    let mut args: Vec<String> = vec![from.to_string(), to.to_string()];
    if let Some(acct) = account {
        sql.push_str(" AND c.account_id=?3");
        args.push(acct.to_string());
    }
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(args.iter()), |r| {
        Ok((
            r.get::<_, String>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, Option<i64>>(2)?,
        ))
    })?;
    let mut out = Vec::new();
    for row in rows {
        let (date, amount, category_id) = row?;
        out.push(Row {
            date,
            amount: -parse_decimal(&amount)?,
            kind: "Expense".to_string(),
            category_id,
        });
    }
    Ok(out)
}

fn rows_for_view(
    conn: &Connection,
    view: View,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
) -> Result<Vec<Row>> {
    match view {
        View::Cash => tx_rows(conn, SETTLED, from, to, account),
        View::Accrual => {
            let mut rows = tx_rows(conn, SETTLED, from, to, account)?;
            rows.extend(tx_rows(conn, PENDING, from, to, account)?);
            rows.extend(unpaid_charge_rows(conn, from, to, account)?);
            Ok(rows)
        }
        View::Commitment => tx_rows(conn, PENDING, from, to, account),
    }
}

#[derive(Debug, Serialize)]
pub struct Kpis {
    pub receitas: String,
    pub despesas: String,
    pub saldo: String,
}

/// Income/expense/net totals for the period. Transfer legs cancel out by
/// construction and are excluded outright.
pub fn kpis(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
    view: View,
) -> Result<Kpis> {
    let rows = rows_for_view(conn, view, from, to, account)?;
    let mut receitas = Decimal::ZERO;
    let mut despesas = Decimal::ZERO;
    for r in rows.iter().filter(|r| r.kind != "Transfer") {
        if r.amount > Decimal::ZERO {
            receitas += r.amount;
        } else {
            despesas -= r.amount;
        }
    }
    Ok(Kpis {
        receitas: fmt_amount(&receitas),
        despesas: fmt_amount(&despesas),
        saldo: fmt_amount(&(receitas - despesas)),
    })
}

#[derive(Debug, Serialize)]
pub struct MonthlyPoint {
    pub month: String,
    pub receitas: String,
    pub despesas: String,
    pub saldo: String,
}

pub fn monthly_trend(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
    view: View,
) -> Result<Vec<MonthlyPoint>> {
    let rows = rows_for_view(conn, view, from, to, account)?;
    let mut by_month: std::collections::BTreeMap<String, (Decimal, Decimal)> =
        std::collections::BTreeMap::new();
    for r in rows.iter().filter(|r| r.kind != "Transfer") {
        let month = r.date.chars().take(7).collect::<String>();
        let entry = by_month.entry(month).or_default();
        if r.amount > Decimal::ZERO {
            entry.0 += r.amount;
        } else {
            entry.1 -= r.amount;
        }
    }
    Ok(by_month
        .into_iter()
        .map(|(month, (rec, desp))| MonthlyPoint {
            month,
            receitas: fmt_amount(&rec),
            despesas: fmt_amount(&desp),
            saldo: fmt_amount(&(rec - desp)),
        })
        .collect())
}

#[derive(Debug, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: String,
}

pub fn expenses_by_category(
    conn: &Connection,
    from: NaiveDate,
    to: NaiveDate,
    account: Option<i64>,
    view: View,
) -> Result<Vec<CategoryTotal>> {
    let rows = rows_for_view(conn, view, from, to, account)?;
    let mut by_cat: std::collections::HashMap<Option<i64>, Decimal> =
        std::collections::HashMap::new();
    for r in rows
        .iter()
        .filter(|r| r.kind == "Expense" && r.amount < Decimal::ZERO)
    {
        *by_cat.entry(r.category_id).or_default() -= r.amount;
    }
    let mut out = Vec::new();
    for (cat, total) in by_cat {
        let name = match cat {
            Some(id) => conn
                .query_row(
                    "SELECT name FROM categories WHERE id=?1",
                    rusqlite::params![id],
                    |r| r.get(0),
                )
                .unwrap_or_else(|_| "Sem categoria".to_string()),
            None => "Sem categoria".to_string(),
        };
        out.push(CategoryTotal {
            category: name,
            total: fmt_amount(&total),
        });
    }
    out.sort_by(|a, b| {
        let ta: Decimal = a.total.parse().unwrap_or_default();
        let tb: Decimal = b.total.parse().unwrap_or_default();
        tb.cmp(&ta)
    });
    Ok(out)
}

#[derive(Debug, Serialize)]
pub struct AccountBalance {
    pub account: String,
    pub account_type: String,
    pub balance: String,
    pub show_on_dashboard: bool,
}

/// Per-account balances on the unfiltered cash view. Dashboard date and
/// account filters never distort this panel.
pub fn account_balances(conn: &Connection) -> Result<Vec<AccountBalance>> {
    let mut stmt =
        conn.prepare("SELECT id, name, type, show_on_dashboard FROM accounts ORDER BY name")?;
    let accounts = stmt.query_map([], |r| {
        Ok((
            r.get::<_, i64>(0)?,
            r.get::<_, String>(1)?,
            r.get::<_, String>(2)?,
            r.get::<_, bool>(3)?,
        ))
    })?;
    let mut out = Vec::new();
    for a in accounts {
        let (id, name, account_type, pinned) = a?;
        let balance = cash_balance(conn, id)?;
        if !pinned && balance.is_zero() {
            continue;
        }
        out.push(AccountBalance {
            account: name,
            account_type,
            balance: fmt_amount(&balance),
            show_on_dashboard: pinned,
        });
    }
    Ok(out)
}

#[derive(Debug, Serialize)]
pub struct AgingBucket {
    pub count: usize,
    pub total: String,
}

#[derive(Debug, Serialize)]
pub struct CommitmentsAging {
    /// Not yet due ("a vencer").
    pub upcoming: AgingBucket,
    /// Past due and unsettled ("vencidos").
    pub overdue: AgingBucket,
}

pub fn commitments_aging(conn: &Connection, today: NaiveDate) -> Result<CommitmentsAging> {
    let far_past = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or(today);
    let far_future = NaiveDate::from_ymd_opt(9999, 12, 31).unwrap_or(today);
    let rows = tx_rows(conn, PENDING, far_past, far_future, None)?;
    let mut upcoming = (0usize, Decimal::ZERO);
    let mut overdue = (0usize, Decimal::ZERO);
    let pivot = today.to_string();
    for r in rows {
        let bucket = if r.date >= pivot {
            &mut upcoming
        } else {
            &mut overdue
        };
        bucket.0 += 1;
        bucket.1 += -r.amount;
    }
    Ok(CommitmentsAging {
        upcoming: AgingBucket {
            count: upcoming.0,
            total: fmt_amount(&upcoming.1),
        },
        overdue: AgingBucket {
            count: overdue.0,
            total: fmt_amount(&overdue.1),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::engine::{cards, commitments, transactions};
    use crate::models::{CardType, CategoryKind, Method};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    fn fixture() -> Connection {
        let conn = db::open_in_memory().unwrap();
        conn.execute_batch(
            "INSERT INTO accounts(name, type, show_on_dashboard) VALUES('Nubank', 'Bank', 1);
             INSERT INTO accounts(name, type) VALUES('XP', 'Brokerage');
             INSERT INTO categories(name, kind) VALUES('Mercado', 'Expense');
             INSERT INTO categories(name, kind) VALUES('Salário', 'Income');",
        )
        .unwrap();
        conn
    }

    fn post(conn: &mut Connection, kind: CategoryKind, amount: Decimal, cat: Option<i64>) {
        transactions::post_entry(
            conn,
            d(2025, 3, 1),
            &transactions::NewEntry {
                date: d(2025, 3, 10),
                description: "x".into(),
                amount,
                account_id: 1,
                category_id: cat,
                kind,
                method: Method::Pix,
                destination_account_id: None,
                card_id: None,
                due_day: None,
                repeat_months: None,
                notes: None,
            },
        )
        .unwrap();
    }

    #[test]
    fn kpis_exclude_transfers() {
        let mut conn = fixture();
        post(&mut conn, CategoryKind::Income, dec!(3000), Some(2));
        post(&mut conn, CategoryKind::Expense, dec!(800), Some(1));
        transactions::post_entry(
            &mut conn,
            d(2025, 3, 1),
            &transactions::NewEntry {
                date: d(2025, 3, 15),
                description: "aporte".into(),
                amount: dec!(500),
                account_id: 1,
                category_id: None,
                kind: CategoryKind::Transfer,
                method: Method::Pix,
                destination_account_id: Some(2),
                card_id: None,
                due_day: None,
                repeat_months: None,
                notes: None,
            },
        )
        .unwrap();

        let k = kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Cash).unwrap();
        assert_eq!(k.receitas, "3000.00");
        assert_eq!(k.despesas, "800.00");
        assert_eq!(k.saldo, "2200.00");
    }

    #[test]
    fn accrual_adds_pending_items_cash_does_not() {
        let mut conn = fixture();
        post(&mut conn, CategoryKind::Income, dec!(1000), Some(2));
        commitments::schedule_series(
            &mut conn,
            d(2025, 3, 1),
            1,
            Some(1),
            CategoryKind::Expense,
            "aluguel",
            dec!(400),
            15,
            1,
            None,
        )
        .unwrap();
        let card = cards::create_card(&conn, "Roxo", "Master", CardType::Credit, 1, Some(20), Some(28))
            .unwrap();
        cards::register_charge(&mut conn, card, d(2025, 3, 5), "mercado", dec!(250), Some(1), None)
            .unwrap();

        let cash = kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Cash).unwrap();
        assert_eq!(cash.despesas, "0.00");
        let accrual = kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Accrual).unwrap();
        assert_eq!(accrual.despesas, "650.00");
        let commit = kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Commitment).unwrap();
        assert_eq!(commit.despesas, "400.00");
    }

    #[test]
    fn balances_ignore_filters_and_pin_dashboard_accounts() {
        let mut conn = fixture();
        post(&mut conn, CategoryKind::Income, dec!(100), Some(2));
        let balances = account_balances(&conn).unwrap();
        // Nubank pinned with 100, XP unpinned at zero is hidden
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].account, "Nubank");
        assert_eq!(balances[0].balance, "100.00");
    }

    #[test]
    fn pinned_account_shows_even_at_zero() {
        let conn = fixture();
        let balances = account_balances(&conn).unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].balance, "0.00");
    }

    #[test]
    fn aging_splits_on_today() {
        let mut conn = fixture();
        commitments::schedule_series(
            &mut conn,
            d(2025, 1, 1),
            1,
            Some(1),
            CategoryKind::Expense,
            "parcela",
            dec!(100),
            10,
            3,
            None,
        )
        .unwrap();
        let aging = commitments_aging(&conn, d(2025, 2, 15)).unwrap();
        assert_eq!(aging.overdue.count, 2); // Jan 10 and Feb 10
        assert_eq!(aging.overdue.total, "200.00");
        assert_eq!(aging.upcoming.count, 1);
        assert_eq!(aging.upcoming.total, "100.00");
    }

    #[test]
    fn monthly_trend_buckets_by_month() {
        let mut conn = fixture();
        post(&mut conn, CategoryKind::Income, dec!(1000), Some(2));
        transactions::post_entry(
            &mut conn,
            d(2025, 3, 1),
            &transactions::NewEntry {
                date: d(2025, 4, 2),
                description: "y".into(),
                amount: dec!(300),
                account_id: 1,
                category_id: Some(1),
                kind: CategoryKind::Expense,
                method: Method::Pix,
                destination_account_id: None,
                card_id: None,
                due_day: None,
                repeat_months: None,
                notes: None,
            },
        )
        .unwrap();
        let points =
            monthly_trend(&conn, d(2025, 3, 1), d(2025, 4, 30), None, View::Cash).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].month, "2025-03");
        assert_eq!(points[0].saldo, "1000.00");
        assert_eq!(points[1].month, "2025-04");
        assert_eq!(points[1].saldo, "-300.00");
    }
}
