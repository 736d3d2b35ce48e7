// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use crate::models::AccountType;
use crate::utils::pretty_table;
use anyhow::Result;
use rusqlite::{params, Connection};

pub fn handle(conn: &Connection, m: &clap::ArgMatches) -> Result<()> {
    match m.subcommand() {
        Some(("add", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            let typ = AccountType::parse(sub.get_one::<String>("type").unwrap())?;
            let ccy = sub.get_one::<String>("currency").unwrap().to_uppercase();
            let pinned = sub.get_flag("dashboard");
            conn.execute(
                "INSERT INTO accounts(name, type, currency, show_on_dashboard) VALUES (?1, ?2, ?3, ?4)",
                params![name, typ.as_str(), ccy, pinned],
            )?;
            println!("Added account '{}' ({}, {})", name, typ.as_str(), ccy);
        }
        Some(("list", _)) => {
            let mut stmt = conn.prepare(
                "SELECT name, type, currency, show_on_dashboard, created_at FROM accounts ORDER BY name",
            )?;
            let rows = stmt.query_map([], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    r.get::<_, bool>(3)?,
                    r.get::<_, String>(4)?,
                ))
            })?;
            let mut data = Vec::new();
            for row in rows {
                let (n, t, c, pin, cr) = row?;
                data.push(vec![n, t, c, if pin { "yes" } else { "" }.to_string(), cr]);
            }
            println!(
                "{}",
                pretty_table(&["Name", "Type", "Currency", "Dashboard", "Created"], data)
            );
        }
        Some(("rm", sub)) => {
            let name = sub.get_one::<String>("name").unwrap();
            conn.execute("DELETE FROM accounts WHERE name=?1", params![name])?;
            println!("Removed account '{}'", name);
        }
        _ => {}
    }
    Ok(())
}
