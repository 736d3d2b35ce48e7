// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use clap::{Arg, ArgAction, Command};

fn json_flags(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("json")
            .long("json")
            .action(ArgAction::SetTrue)
            .help("Print the result as pretty JSON"),
    )
    .arg(
        Arg::new("jsonl")
            .long("jsonl")
            .action(ArgAction::SetTrue)
            .help("Print the result as JSON lines"),
    )
}

fn period_args(cmd: Command) -> Command {
    cmd.arg(Arg::new("from").long("from").help("Start date YYYY-MM-DD"))
        .arg(Arg::new("to").long("to").help("End date YYYY-MM-DD"))
        .arg(Arg::new("account").long("account").help("Restrict to one account"))
        .arg(
            Arg::new("view")
                .long("view")
                .default_value("cash")
                .help("Reporting basis: cash | accrual | commitment"),
        )
}

pub fn build_cli() -> Command {
    Command::new("caixa")
        .about("Personal finance ledger: accounts, cards, commitments and investments")
        .version(clap::crate_version!())
        .subcommand_required(false)
        .subcommand(Command::new("init").about("Create the database and schema"))
        .subcommand(
            Command::new("account")
                .about("Manage accounts")
                .subcommand(
                    Command::new("add")
                        .about("Add an account")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .default_value("Bank")
                                .help("Bank | Brokerage | Cash"),
                        )
                        .arg(Arg::new("currency").long("currency").default_value("BRL"))
                        .arg(
                            Arg::new("dashboard")
                                .long("dashboard")
                                .action(ArgAction::SetTrue)
                                .help("Pin the account to the dashboard balance panel"),
                        ),
                )
                .subcommand(Command::new("list").about("List accounts"))
                .subcommand(
                    Command::new("rm")
                        .about("Remove an account")
                        .arg(Arg::new("name").required(true)),
                ),
        )
        .subcommand(
            Command::new("category")
                .about("Manage categories")
                .subcommand(
                    Command::new("add")
                        .about("Add a category")
                        .arg(Arg::new("name").required(true))
                        .arg(
                            Arg::new("kind")
                                .long("kind")
                                .default_value("Expense")
                                .help("Expense | Income | Transfer"),
                        ),
                )
                .subcommand(Command::new("list").about("List categories"))
                .subcommand(
                    Command::new("rm")
                        .about("Remove a category")
                        .arg(Arg::new("name").required(true)),
                ),
        )
        .subcommand(
            Command::new("card")
                .about("Manage cards")
                .subcommand(
                    Command::new("add")
                        .about("Add a card")
                        .arg(Arg::new("name").required(true))
                        .arg(Arg::new("brand").long("brand").default_value("Visa"))
                        .arg(
                            Arg::new("type")
                                .long("type")
                                .default_value("Credit")
                                .help("Credit | Debit"),
                        )
                        .arg(
                            Arg::new("account")
                                .long("account")
                                .required(true)
                                .help("Linked bank account"),
                        )
                        .arg(
                            Arg::new("close-day")
                                .long("close-day")
                                .value_parser(clap::value_parser!(u32))
                                .help("Invoice close day (credit cards)"),
                        )
                        .arg(
                            Arg::new("due-day")
                                .long("due-day")
                                .value_parser(clap::value_parser!(u32))
                                .help("Invoice due day (credit cards)"),
                        ),
                )
                .subcommand(Command::new("list").about("List cards")),
        )
        .subcommand(
            Command::new("tx")
                .about("Post and manage ledger entries")
                .subcommand(
                    Command::new("add")
                        .about("Post an entry: expense, income, transfer, card charge or schedule")
                        .arg(Arg::new("date").long("date").help("YYYY-MM-DD, default today"))
                        .arg(Arg::new("desc").long("desc").required(true))
                        .arg(Arg::new("amount").long("amount").required(true).help("Positive amount"))
                        .arg(Arg::new("account").long("account").required(true))
                        .arg(
                            Arg::new("category")
                                .long("category")
                                .help("Category; its kind decides income vs expense"),
                        )
                        .arg(
                            Arg::new("method")
                                .long("method")
                                .default_value("PIX")
                                .help("PIX | TED | Debit | Credit | Cash | Futuro"),
                        )
                        .arg(
                            Arg::new("to")
                                .long("to")
                                .help("Destination account; makes the entry a transfer"),
                        )
                        .arg(Arg::new("card").long("card").help("Card name for Credit/Debit/Futuro"))
                        .arg(
                            Arg::new("due-day")
                                .long("due-day")
                                .value_parser(clap::value_parser!(u32))
                                .help("Day of month for scheduled entries"),
                        )
                        .arg(
                            Arg::new("repeat")
                                .long("repeat")
                                .value_parser(clap::value_parser!(u32))
                                .help("Monthly occurrences for scheduled entries (1-120)"),
                        )
                        .arg(Arg::new("notes").long("notes")),
                )
                .subcommand(json_flags(period_args(
                    Command::new("list").about("List entries"),
                )))
                .subcommand(
                    Command::new("rm")
                        .about("Delete an entry")
                        .arg(Arg::new("id").required(true).value_parser(clap::value_parser!(i64)))
                        .arg(
                            Arg::new("scope")
                                .long("scope")
                                .default_value("single")
                                .help("Scheduled series scope: single | future"),
                        ),
                )
                .subcommand(
                    Command::new("settle")
                        .about("Settle a pending scheduled occurrence")
                        .arg(Arg::new("id").required(true).value_parser(clap::value_parser!(i64)))
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(Arg::new("account").long("account").required(true))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("notes").long("notes")),
                ),
        )
        .subcommand(
            Command::new("invoice")
                .about("Credit-card invoices")
                .subcommand(json_flags(
                    Command::new("list")
                        .about("List a card's invoices")
                        .arg(Arg::new("card").long("card").required(true)),
                ))
                .subcommand(
                    Command::new("pay")
                        .about("Pay an invoice from a bank account")
                        .arg(Arg::new("id").required(true).value_parser(clap::value_parser!(i64)))
                        .arg(Arg::new("date").long("date").required(true))
                        .arg(Arg::new("account").long("account").required(true)),
                )
                .subcommand(
                    Command::new("rm-charge")
                        .about("Delete an unpaid charge")
                        .arg(Arg::new("id").required(true).value_parser(clap::value_parser!(i64))),
                ),
        )
        .subcommand(
            Command::new("invest")
                .about("Investment portfolio")
                .subcommand(
                    Command::new("add-asset")
                        .about("Register an asset")
                        .arg(Arg::new("symbol").required(true))
                        .arg(Arg::new("name").long("name").required(true))
                        .arg(
                            Arg::new("class")
                                .long("class")
                                .required(true)
                                .help("ACAO_BR | FII | ETF_BR | BDR | STOCK_US | ETF_US | CRYPTO | RENDA_FIXA | TESOURO_DIRETO | FUNDOS | COE | OUTROS"),
                        )
                        .arg(Arg::new("sector").long("sector"))
                        .arg(Arg::new("currency").long("currency"))
                        .arg(Arg::new("broker").long("broker").help("Brokerage account holding the asset")),
                )
                .subcommand(json_flags(Command::new("list-assets").about("List assets")))
                .subcommand(
                    Command::new("trade")
                        .about("Record a buy/sell (aplicação/resgate)")
                        .arg(Arg::new("symbol").required(true))
                        .arg(Arg::new("side").long("side").required(true).help("BUY | SELL | COMPRA | VENDA | APLICACAO | RESGATE"))
                        .arg(Arg::new("date").long("date").help("YYYY-MM-DD, default today"))
                        .arg(Arg::new("qty").long("qty").default_value("1"))
                        .arg(Arg::new("price").long("price").required(true).help("Unit price, or full value for fixed income"))
                        .arg(Arg::new("fx").long("fx").help("BRL per unit of the asset currency"))
                        .arg(Arg::new("fees").long("fees").default_value("0"))
                        .arg(Arg::new("taxes").long("taxes").default_value("0"))
                        .arg(Arg::new("tax-pct").long("tax-pct").help("IR/IOF percentage, fixed income redemptions only"))
                        .arg(Arg::new("note").long("note")),
                )
                .subcommand(
                    Command::new("rm-trade")
                        .about("Delete a trade and reverse its cash leg")
                        .arg(Arg::new("id").required(true).value_parser(clap::value_parser!(i64))),
                )
                .subcommand(
                    Command::new("income")
                        .about("Record a dividend/interest payout")
                        .arg(Arg::new("symbol").required(true))
                        .arg(Arg::new("type").long("type").required(true).help("DIVIDEND | JCP | INTEREST | COUPON | RF_YIELD | FII_RENT"))
                        .arg(Arg::new("date").long("date").help("YYYY-MM-DD, default today"))
                        .arg(Arg::new("amount").long("amount").required(true))
                        .arg(Arg::new("note").long("note")),
                )
                .subcommand(
                    Command::new("price")
                        .about("Asset prices")
                        .subcommand(
                            Command::new("set")
                                .about("Record a manual price")
                                .arg(Arg::new("symbol").required(true))
                                .arg(Arg::new("date").long("date").required(true))
                                .arg(Arg::new("price").long("price").required(true)),
                        )
                        .subcommand(Command::new("list").about("Latest stored prices")),
                )
                .subcommand(json_flags(
                    Command::new("portfolio")
                        .about("Open positions and valuation")
                        .arg(Arg::new("class").long("class").help("Filter by asset class")),
                ))
                .subcommand(json_flags(
                    Command::new("summary")
                        .about("Aggregated portfolio figures")
                        .arg(Arg::new("class").long("class").help("Filter by asset class")),
                ))
                .subcommand(json_flags(
                    Command::new("refresh")
                        .about("Fetch live quotes for every eligible asset")
                        .arg(
                            Arg::new("workers")
                                .long("workers")
                                .value_parser(clap::value_parser!(usize))
                                .default_value("4"),
                        )
                        .arg(
                            Arg::new("timeout")
                                .long("timeout")
                                .value_parser(clap::value_parser!(u64))
                                .default_value("15")
                                .help("Per-request timeout in seconds"),
                        )
                        .arg(
                            Arg::new("group")
                                .long("group")
                                .action(ArgAction::Append)
                                .help("Limit to a quote group (FIIs, Ações BR, Stocks, Cripto, Outros); repeatable"),
                        ),
                )),
        )
        .subcommand(
            Command::new("dashboard")
                .about("Aggregated views of the ledger")
                .subcommand(json_flags(period_args(Command::new("kpis").about("Income/expense/net totals"))))
                .subcommand(json_flags(period_args(Command::new("monthly").about("Monthly saldo trend"))))
                .subcommand(json_flags(period_args(
                    Command::new("by-category").about("Expense breakdown by category"),
                )))
                .subcommand(json_flags(Command::new("balances").about("Per-account balances (cash view)")))
                .subcommand(json_flags(Command::new("commitments").about("Commitment aging"))),
        )
        .subcommand(
            Command::new("import")
                .about("CSV import")
                .subcommand(
                    Command::new("transactions")
                        .about("Import entries: date,description,amount,account[,category,method,notes]")
                        .arg(Arg::new("file").required(true))
                        .arg(Arg::new("preview").long("preview").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("assets")
                        .about("Import assets: symbol,name,asset_class[,sector,currency,broker_account]")
                        .arg(Arg::new("file").required(true))
                        .arg(Arg::new("preview").long("preview").action(ArgAction::SetTrue)),
                )
                .subcommand(
                    Command::new("trades")
                        .about("Import trades: date,symbol,side,quantity,price[,fees,taxes,note]")
                        .arg(Arg::new("file").required(true))
                        .arg(Arg::new("preview").long("preview").action(ArgAction::SetTrue)),
                ),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn tx_add_parses_schedule_flags() {
        let m = build_cli()
            .try_get_matches_from([
                "caixa", "tx", "add", "--desc", "aluguel", "--amount", "1200", "--account",
                "Nubank", "--category", "Moradia", "--method", "Futuro", "--due-day", "5",
                "--repeat", "12",
            ])
            .unwrap();
        let (_, tx) = m.subcommand().unwrap();
        let (_, add) = tx.subcommand().unwrap();
        assert_eq!(add.get_one::<u32>("repeat"), Some(&12));
        assert_eq!(add.get_one::<u32>("due-day"), Some(&5));
    }

    #[test]
    fn invest_refresh_parses_timeout_and_workers() {
        let m = build_cli()
            .try_get_matches_from(["caixa", "invest", "refresh", "--timeout", "5", "--workers", "2"])
            .unwrap();
        let (_, invest) = m.subcommand().unwrap();
        let (_, refresh) = invest.subcommand().unwrap();
        assert_eq!(refresh.get_one::<u64>("timeout"), Some(&5));
        assert_eq!(refresh.get_one::<usize>("workers"), Some(&2));

        let m = build_cli()
            .try_get_matches_from(["caixa", "invest", "refresh"])
            .unwrap();
        let (_, invest) = m.subcommand().unwrap();
        let (_, refresh) = invest.subcommand().unwrap();
        assert_eq!(refresh.get_one::<u64>("timeout"), Some(&15));
    }
}
