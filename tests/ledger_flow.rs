// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use caixa::db;
use caixa::engine::{cards, commitments, invest, reports, transactions};
use caixa::models::{CardType, CategoryKind, Method, View};
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, dd: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, dd).unwrap()
}

fn setup() -> Connection {
    let conn = db::open_in_memory().unwrap();
    conn.execute_batch(
        "INSERT INTO accounts(name, type, show_on_dashboard) VALUES('Nubank', 'Bank', 1);
         INSERT INTO accounts(name, type, show_on_dashboard) VALUES('XP', 'Brokerage', 1);
         INSERT INTO categories(name, kind) VALUES('Salário', 'Income');
         INSERT INTO categories(name, kind) VALUES('Mercado', 'Expense');
         INSERT INTO categories(name, kind) VALUES('Moradia', 'Expense');",
    )
    .unwrap();
    conn
}

fn entry(
    date: NaiveDate,
    desc: &str,
    amount: rust_decimal::Decimal,
    account_id: i64,
    category_id: Option<i64>,
    kind: CategoryKind,
    method: Method,
) -> transactions::NewEntry {
    transactions::NewEntry {
        date,
        description: desc.into(),
        amount,
        account_id,
        category_id,
        kind,
        method,
        destination_account_id: None,
        card_id: None,
        due_day: None,
        repeat_months: None,
        notes: None,
    }
}

#[test]
fn month_of_activity_keeps_every_view_consistent() {
    let mut conn = setup();
    let today = d(2025, 3, 1);

    // salary in, groceries out, savings moved to the broker
    transactions::post_entry(
        &mut conn,
        today,
        &entry(d(2025, 3, 5), "salário", dec!(8000), 1, Some(1), CategoryKind::Income, Method::Pix),
    )
    .unwrap();
    transactions::post_entry(
        &mut conn,
        today,
        &entry(d(2025, 3, 8), "feira", dec!(320), 1, Some(2), CategoryKind::Expense, Method::Debit),
    )
    .unwrap();
    let mut transfer = entry(
        d(2025, 3, 10),
        "aporte mensal",
        dec!(2000),
        1,
        None,
        CategoryKind::Transfer,
        Method::Pix,
    );
    transfer.destination_account_id = Some(2);
    transactions::post_entry(&mut conn, today, &transfer).unwrap();

    // a card purchase sits on the open invoice, invisible to the cash view
    let card =
        cards::create_card(&conn, "Roxo", "Mastercard", CardType::Credit, 1, Some(20), Some(28))
            .unwrap();
    cards::register_charge(&mut conn, card, d(2025, 3, 12), "farmácia", dec!(180), Some(2), None)
        .unwrap();

    let cash = reports::kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Cash).unwrap();
    assert_eq!(cash.receitas, "8000.00");
    assert_eq!(cash.despesas, "320.00");
    assert_eq!(cash.saldo, "7680.00");

    let accrual = reports::kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Accrual).unwrap();
    assert_eq!(accrual.despesas, "500.00");

    // paying the invoice moves the charge into the cash view
    let invoice_id = cards::list_invoices(&mut conn, card, d(2025, 3, 28)).unwrap()[0].id;
    cards::pay_invoice(&mut conn, invoice_id, d(2025, 3, 28), 1).unwrap();
    let cash = reports::kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Cash).unwrap();
    assert_eq!(cash.despesas, "500.00");
    let accrual = reports::kpis(&conn, d(2025, 3, 1), d(2025, 3, 31), None, View::Accrual).unwrap();
    assert_eq!(accrual.despesas, "500.00");

    // balances: transfer legs cancel across accounts, payment left the bank
    let balances = reports::account_balances(&conn).unwrap();
    let nubank = balances.iter().find(|b| b.account == "Nubank").unwrap();
    let xp = balances.iter().find(|b| b.account == "XP").unwrap();
    assert_eq!(nubank.balance, "5500.00"); // 8000 - 320 - 2000 - 180
    assert_eq!(xp.balance, "2000.00");
}

#[test]
fn scheduled_card_purchases_convert_only_after_cycle_close() {
    let mut conn = setup();
    let card =
        cards::create_card(&conn, "Roxo", "Mastercard", CardType::Credit, 1, Some(20), Some(28))
            .unwrap();
    let ids = commitments::schedule_credit_series(
        &mut conn,
        d(2025, 3, 1),
        card,
        Some(2),
        "assinatura anual",
        dec!(90),
        2,
        None,
    )
    .unwrap();
    assert_eq!(ids.len(), 2); // Mar 28 and Apr 28

    // before the April cycle closes nothing reaches an invoice
    let invoices = cards::list_invoices(&mut conn, card, d(2025, 3, 25)).unwrap();
    assert!(invoices.is_empty());

    // Mar 28 falls after close day 20, so it belongs to the 2025-04 cycle,
    // which closes on Apr 20
    let invoices = cards::list_invoices(&mut conn, card, d(2025, 4, 20)).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].invoice_period, "2025-04");
    assert_eq!(invoices[0].total_amount, dec!(90));

    // deleting the still-pending second occurrence touches no invoice
    commitments::delete_scope(&mut conn, ids[1], commitments::DeleteScope::Single).unwrap();
    let invoices = cards::list_invoices(&mut conn, card, d(2025, 4, 20)).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].total_amount, dec!(90));
}

#[test]
fn commitment_series_settles_into_cash_and_ages_correctly() {
    let mut conn = setup();
    let ids = commitments::schedule_series(
        &mut conn,
        d(2025, 1, 2),
        1,
        Some(3),
        CategoryKind::Expense,
        "aluguel",
        dec!(1500),
        10,
        12,
        None,
    )
    .unwrap();
    assert_eq!(ids.len(), 12);

    // nothing is cash yet
    let cash = reports::kpis(&conn, d(2025, 1, 1), d(2025, 12, 31), None, View::Cash).unwrap();
    assert_eq!(cash.despesas, "0.00");
    let commit =
        reports::kpis(&conn, d(2025, 1, 1), d(2025, 12, 31), None, View::Commitment).unwrap();
    assert_eq!(commit.despesas, "18000.00");

    commitments::settle(&mut conn, ids[0], d(2025, 1, 11), 1, dec!(1500), None).unwrap();
    let cash = reports::kpis(&conn, d(2025, 1, 1), d(2025, 12, 31), None, View::Cash).unwrap();
    assert_eq!(cash.despesas, "1500.00");

    // mid-February: the February occurrence is overdue, ten remain upcoming
    let aging = reports::commitments_aging(&conn, d(2025, 2, 15)).unwrap();
    assert_eq!(aging.overdue.count, 1);
    assert_eq!(aging.overdue.total, "1500.00");
    assert_eq!(aging.upcoming.count, 10);
}

#[test]
fn invoice_total_equals_sum_of_unpaid_charges_until_single_payment() {
    let mut conn = setup();
    let card =
        cards::create_card(&conn, "Roxo", "Mastercard", CardType::Credit, 1, Some(10), Some(18))
            .unwrap();
    for (day, value) in [(1u32, dec!(55.5)), (5, dec!(200)), (9, dec!(44.5))] {
        cards::register_charge(&mut conn, card, d(2025, 6, day), "compra", value, Some(2), None)
            .unwrap();
    }
    let invoices = cards::list_invoices(&mut conn, card, d(2025, 6, 9)).unwrap();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].total_amount, dec!(300));
    assert_eq!(invoices[0].due_date, d(2025, 6, 18));

    cards::pay_invoice(&mut conn, invoices[0].id, d(2025, 6, 18), 1).unwrap();
    let payments: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM transactions WHERE source_type='invoice_payment'",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(payments, 1);
    assert_eq!(invest::cash_balance(&conn, 1).unwrap(), dec!(-300));
}

#[test]
fn transfer_pair_nets_to_zero_across_the_ledger() {
    let mut conn = setup();
    let mut transfer = entry(
        d(2025, 5, 2),
        "resgate",
        dec!(750.25),
        2,
        None,
        CategoryKind::Transfer,
        Method::Ted,
    );
    transfer.destination_account_id = Some(1);
    transactions::post_entry(&mut conn, d(2025, 5, 2), &transfer).unwrap();

    let total: String = conn
        .query_row(
            "SELECT COALESCE(SUM(CAST(amount AS REAL)), 0) FROM transactions WHERE kind='Transfer'",
            [],
            |r| r.get::<_, f64>(0).map(|v| format!("{v}")),
        )
        .unwrap();
    assert_eq!(total, "0");
    assert_eq!(invest::cash_balance(&conn, 1).unwrap(), dec!(750.25));
    assert_eq!(invest::cash_balance(&conn, 2).unwrap(), dec!(-750.25));
}
