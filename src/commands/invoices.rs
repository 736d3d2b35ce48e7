// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::cards;
use crate::utils::{fmt_amount, id_for_account, id_for_card, maybe_print_json, parse_date, pretty_table};
use anyhow::Result;
use rusqlite::Connection;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct InvoiceRow {
    id: i64,
    period: String,
    due_date: String,
    total: String,
    paid: String,
    status: String,
}

pub fn handle(conn: &mut Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("list", sub)) => {
            let card_id = id_for_card(conn, sub.get_one::<String>("card").unwrap())?;
            let today = chrono::Local::now().date_naive();
            let invoices = cards::list_invoices(conn, card_id, today)?;
            let rows: Vec<InvoiceRow> = invoices
                .into_iter()
                .map(|iv| InvoiceRow {
                    id: iv.id,
                    period: iv.invoice_period,
                    due_date: iv.due_date.to_string(),
                    total: fmt_amount(&iv.total_amount),
                    paid: fmt_amount(&iv.paid_amount),
                    status: iv.status,
                })
                .collect();
            if maybe_print_json(sub.get_flag("json"), sub.get_flag("jsonl"), &rows)? {
                return Ok(());
            }
            let data = rows
                .into_iter()
                .map(|r| vec![r.id.to_string(), r.period, r.due_date, r.total, r.paid, r.status])
                .collect();
            println!(
                "{}",
                pretty_table(&["ID", "Period", "Due", "Total", "Paid", "Status"], data)
            );
            Ok(())
        }
        Some(("pay", sub)) => {
            let invoice_id = *sub.get_one::<i64>("id").unwrap();
            let date = parse_date(sub.get_one::<String>("date").unwrap())?;
            let account_id = id_for_account(conn, sub.get_one::<String>("account").unwrap())?;
            let tx_id = cards::pay_invoice(conn, invoice_id, date, account_id)?;
            println!("Paid invoice #{} (payment entry #{})", invoice_id, tx_id);
            Ok(())
        }
        Some(("rm-charge", sub)) => {
            let charge_id = *sub.get_one::<i64>("id").unwrap();
            cards::delete_charge(conn, charge_id)?;
            println!("Removed charge #{}", charge_id);
            Ok(())
        }
        _ => Ok(()),
    }
}
