// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Bulk price refresh. A `QuoteProvider` fetches one price per asset;
//! the engine fans requests out over worker threads and isolates every
//! failure into the per-asset report.

use anyhow::{anyhow, Result};
use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Mutex;
use std::time::Instant;

use crate::error;
use crate::models::AssetClass;
use crate::utils::http_client;

#[derive(Debug, Clone)]
pub struct Quote {
    pub price: Decimal,
    pub date: NaiveDate,
    pub source: String,
}

pub trait QuoteProvider: Sync {
    fn fetch(&self, symbol: &str, asset_class: AssetClass, currency: &str) -> Result<Quote>;
}

#[derive(Debug, Serialize)]
pub struct ItemReport {
    pub symbol: String,
    pub ok: bool,
    pub price: Option<String>,
    pub px_date: Option<String>,
    pub source: Option<String>,
    pub elapsed_s: f64,
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RefreshReport {
    pub total: usize,
    pub saved: usize,
    pub failed: usize,
    pub items: Vec<ItemReport>,
}

/// Refresh quotes for every asset whose group is in `groups` (all groups
/// when empty). One provider failure never aborts the batch.
pub fn refresh_prices(
    conn: &mut Connection,
    provider: &dyn QuoteProvider,
    max_workers: usize,
    groups: &[String],
) -> Result<RefreshReport> {
    let assets: Vec<(i64, String, String, String)> = {
        let mut stmt = conn
            .prepare("SELECT id, symbol, asset_class, currency FROM assets ORDER BY symbol")?;
        let rows = stmt.query_map([], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })?;
        rows.collect::<std::result::Result<_, _>>()?
    };

    let mut eligible = Vec::new();
    for (id, symbol, class_str, currency) in assets {
        let class = AssetClass::parse(&class_str)?;
        if !groups.is_empty() && !groups.iter().any(|g| g == class.quote_group()) {
            continue;
        }
        eligible.push((id, symbol, class, currency));
    }

    let workers = max_workers.clamp(1, 16).min(eligible.len().max(1));
    let queue = Mutex::new(eligible.into_iter());
    let (tx_res, rx_res) = mpsc::channel::<(i64, ItemReport, Option<Quote>)>();

    std::thread::scope(|s| {
        for _ in 0..workers {
            let tx_res = tx_res.clone();
            let queue = &queue;
            s.spawn(move || loop {
                let next = {
                    let mut guard = match queue.lock() {
                        Ok(g) => g,
                        Err(_) => return,
                    };
                    guard.next()
                };
                let Some((id, symbol, class, currency)) = next else {
                    return;
                };
                let started = Instant::now();
                let outcome = provider.fetch(&symbol, class, &currency);
                let elapsed_s = started.elapsed().as_secs_f64();
                let (report, quote) = match outcome {
                    Ok(q) => (
                        ItemReport {
                            symbol,
                            ok: true,
                            price: Some(q.price.to_string()),
                            px_date: Some(q.date.to_string()),
                            source: Some(q.source.clone()),
                            elapsed_s,
                            error: None,
                        },
                        Some(q),
                    ),
                    Err(e) => (
                        ItemReport {
                            symbol,
                            ok: false,
                            price: None,
                            px_date: None,
                            source: None,
                            elapsed_s,
                            error: Some(error::dependency(format!("{e:#}")).to_string()),
                        },
                        None,
                    ),
                };
                if tx_res.send((id, report, quote)).is_err() {
                    return;
                }
            });
        }
        drop(tx_res);
    });

    let mut items = Vec::new();
    let mut saves = Vec::new();
    while let Ok((id, report, quote)) = rx_res.recv() {
        if let Some(q) = quote {
            saves.push((id, q));
        }
        items.push(report);
    }
    items.sort_by(|a, b| a.symbol.cmp(&b.symbol));

    let saved = saves.len();
    let total = items.len();
    let db_tx = conn.transaction()?;
    {
        let mut insert = db_tx.prepare_cached(
            "INSERT INTO prices(asset_id, date, price, source) VALUES(?1, ?2, ?3, ?4)
             ON CONFLICT(asset_id, date) DO UPDATE SET price=excluded.price, source=excluded.source",
        )?;
        for (id, q) in saves {
            insert.execute(params![id, q.date.to_string(), q.price.to_string(), q.source])?;
        }
    }
    db_tx.commit()?;

    Ok(RefreshReport {
        total,
        saved,
        failed: total - saved,
        items,
    })
}

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct YahooResponse {
    quoteResponse: YahooQuoteResponse,
}
#[derive(Debug, Deserialize)]
struct YahooQuoteResponse {
    result: Vec<YahooQuote>,
}
#[derive(Debug, Deserialize)]
struct YahooQuote {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
    symbol: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BrapiResponse {
    results: Vec<BrapiQuote>,
}
#[derive(Debug, Deserialize)]
struct BrapiQuote {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

/// Live provider: brapi.dev for B3-listed symbols, Yahoo v7 otherwise.
pub struct HttpQuoteProvider {
    client: reqwest::blocking::Client,
}

impl HttpQuoteProvider {
    pub fn new(timeout_s: u64) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout_s)?,
        })
    }

    fn fetch_brapi(&self, symbol: &str) -> Result<Quote> {
        let b3_symbol = symbol.strip_suffix(".SA").unwrap_or(symbol);
        let url = format!("https://brapi.dev/api/quote/{}", b3_symbol);
        let resp = self.client.get(url).send()?.error_for_status()?;
        let body: BrapiResponse = resp.json()?;
        let px = body
            .results
            .first()
            .and_then(|q| q.regular_market_price)
            .ok_or_else(|| anyhow!("brapi returned no price for {}", symbol))?;
        let price = Decimal::from_f64_retain(px)
            .ok_or_else(|| anyhow!("brapi price {} is not representable", px))?;
        Ok(Quote {
            price,
            date: Utc::now().date_naive(),
            source: "brapi".to_string(),
        })
    }

    fn fetch_yahoo(&self, symbol: &str) -> Result<Quote> {
        let url = format!(
            "https://query1.finance.yahoo.com/v7/finance/quote?symbols={}",
            symbol
        );
        let resp = self.client.get(url).send()?.error_for_status()?;
        let body: YahooResponse = resp.json()?;
        let q = body
            .quoteResponse
            .result
            .into_iter()
            .find(|q| q.symbol.as_deref() == Some(symbol))
            .ok_or_else(|| anyhow!("yahoo returned no quote for {}", symbol))?;
        let px = q
            .regular_market_price
            .ok_or_else(|| anyhow!("yahoo quote for {} has no price", symbol))?;
        let price = Decimal::from_f64_retain(px)
            .ok_or_else(|| anyhow!("yahoo price {} is not representable", px))?;
        Ok(Quote {
            price,
            date: Utc::now().date_naive(),
            source: "yahoo".to_string(),
        })
    }
}

impl QuoteProvider for HttpQuoteProvider {
    fn fetch(&self, symbol: &str, asset_class: AssetClass, _currency: &str) -> Result<Quote> {
        match asset_class {
            AssetClass::AcoesBr | AssetClass::Fiis | AssetClass::EtfsBr | AssetClass::Bdrs => {
                self.fetch_brapi(symbol)
            }
            _ => self.fetch_yahoo(symbol),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::engine::invest::add_asset;
    use rust_decimal_macros::dec;

    struct FakeProvider;
    impl QuoteProvider for FakeProvider {
        fn fetch(&self, symbol: &str, _class: AssetClass, _ccy: &str) -> Result<Quote> {
            if symbol == "FAIL11" {
                return Err(anyhow!("socket timed out"));
            }
            Ok(Quote {
                price: dec!(42.5),
                date: NaiveDate::from_ymd_opt(2025, 3, 20).unwrap(),
                source: "fake".to_string(),
            })
        }
    }

    fn fixture() -> Connection {
        let conn = db::open_in_memory().unwrap();
        conn.execute("INSERT INTO accounts(name, type) VALUES('XP', 'Brokerage')", [])
            .unwrap();
        add_asset(&conn, "PETR4", "Petrobras PN", AssetClass::AcoesBr, None, None, Some(1)).unwrap();
        add_asset(&conn, "HGLG11", "CSHG Logística", AssetClass::Fiis, None, None, Some(1)).unwrap();
        add_asset(&conn, "FAIL11", "Quebrado", AssetClass::Fiis, None, None, Some(1)).unwrap();
        conn
    }

    #[test]
    fn failures_are_isolated_per_asset() {
        let mut conn = fixture();
        let report = refresh_prices(&mut conn, &FakeProvider, 4, &[]).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.saved, 2);
        assert_eq!(report.failed, 1);
        let bad = report.items.iter().find(|i| i.symbol == "FAIL11").unwrap();
        assert!(!bad.ok);
        assert!(bad.error.as_deref().unwrap().contains("socket timed out"));

        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn group_filter_limits_eligible_assets() {
        let mut conn = fixture();
        let report =
            refresh_prices(&mut conn, &FakeProvider, 2, &["Ações BR".to_string()]).unwrap();
        assert_eq!(report.total, 1);
        assert_eq!(report.items[0].symbol, "PETR4");
    }

    #[test]
    fn refresh_upserts_same_day_price() {
        let mut conn = fixture();
        refresh_prices(&mut conn, &FakeProvider, 1, &["Ações BR".to_string()]).unwrap();
        refresh_prices(&mut conn, &FakeProvider, 1, &["Ações BR".to_string()]).unwrap();
        let n: i64 = conn
            .query_row("SELECT COUNT(*) FROM prices WHERE asset_id=1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 1);
    }
}
