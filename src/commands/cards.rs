// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::engine::cards;
use crate::models::CardType;
use crate::utils::{id_for_account, pretty_table};
use anyhow::Result;
use rusqlite::Connection;

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let brand = sub.get_one::<String>("brand").unwrap();
            let card_type = CardType::parse(sub.get_one::<String>("type").unwrap())?;
            let account_id = id_for_account(conn, sub.get_one::<String>("account").unwrap())?;
            let close_day = sub.get_one::<u32>("close-day").copied();
            let due_day = sub.get_one::<u32>("due-day").copied();
            cards::create_card(conn, name, brand, card_type, account_id, close_day, due_day)?;
            println!("Added {} card '{}'", card_type.as_str().to_lowercase(), name);
        }
        Some(("list", _)) => {
            let mut stmt = conn.prepare(
                "SELECT c.name, c.brand, c.card_type, a.name, c.close_day, c.due_day
                 FROM cards c JOIN accounts a ON a.id=c.account_id ORDER BY c.name",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, String>(3)?,
                    r.get::<_, Option<u32>>(4)?,
                    r.get::<_, Option<u32>>(5)?,
                ))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (n, b, t, acct, close, due) = row?;
                let fmt_day = |d: Option<u32>| d.map(|v| v.to_string()).unwrap_or_default();
                data.push(vec![n, b, t, acct, fmt_day(close), fmt_day(due)]);
            }
            println!(
                "{}",
                pretty_table(&["Name", "Brand", "Type", "Account", "Close", "Due"], data)
            );
        }
        _ => {}
    }
    Ok(())
}
