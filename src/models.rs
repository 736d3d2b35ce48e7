// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Account classification. Deposit-like money lives in Bank/Cash, broker
/// cash in Brokerage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountType {
    Bank,
    Brokerage,
    Cash,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Bank => "Bank",
            AccountType::Brokerage => "Brokerage",
            AccountType::Cash => "Cash",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "Bank" | "bank" | "Banco" => Ok(AccountType::Bank),
            "Brokerage" | "brokerage" | "Corretora" => Ok(AccountType::Brokerage),
            "Cash" | "cash" | "Dinheiro" => Ok(AccountType::Cash),
            other => Err(anyhow!("Unknown account type '{}'", other)),
        }
    }
}

/// Category kind. A transaction's effective kind is always its category's
/// kind, never user-entered free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CategoryKind {
    Expense,
    Income,
    Transfer,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Expense => "Expense",
            CategoryKind::Income => "Income",
            CategoryKind::Transfer => "Transfer",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "Expense" | "expense" | "Despesa" => Ok(CategoryKind::Expense),
            "Income" | "income" | "Receita" => Ok(CategoryKind::Income),
            "Transfer" | "transfer" | "Transferencia" => Ok(CategoryKind::Transfer),
            other => Err(anyhow!("Unknown category kind '{}'", other)),
        }
    }
}

/// Payment channel. `Futuro` marks a scheduled future commitment rather
/// than a realized cash movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Pix,
    Ted,
    Debit,
    Credit,
    Cash,
    Futuro,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Pix => "PIX",
            Method::Ted => "TED",
            Method::Debit => "Debit",
            Method::Credit => "Credit",
            Method::Cash => "Cash",
            Method::Futuro => "Futuro",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pix" => Ok(Method::Pix),
            "ted" => Ok(Method::Ted),
            "debit" | "debito" | "débito" => Ok(Method::Debit),
            "credit" | "credito" | "crédito" => Ok(Method::Credit),
            "cash" | "dinheiro" => Ok(Method::Cash),
            "futuro" | "agendado" => Ok(Method::Futuro),
            other => Err(anyhow!("Unknown payment method '{}'", other)),
        }
    }
}

/// Reporting basis for dashboards and listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum View {
    /// Only settled/realized cash effects.
    Cash,
    /// Cash plus incurred-but-unsettled items (pending commitments, unpaid
    /// card charges) at their incurred dates.
    Accrual,
    /// Only scheduled-but-unsettled items.
    Commitment,
}

impl View {
    pub fn as_str(&self) -> &'static str {
        match self {
            View::Cash => "cash",
            View::Accrual => "accrual",
            View::Commitment => "commitment",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "cash" | "caixa" => Ok(View::Cash),
            "accrual" | "competencia" => Ok(View::Accrual),
            "commitment" | "futuro" => Ok(View::Commitment),
            other => Err(anyhow!(
                "Invalid view '{}'. Use 'cash', 'accrual' or 'commitment'",
                other
            )),
        }
    }
}

/// Settlement state of a scheduled commitment occurrence. Realized cash
/// transactions carry no status at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChargeStatus {
    Pending,
    Paid,
}

impl ChargeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChargeStatus::Pending => "Pending",
            ChargeStatus::Paid => "Paid",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim() {
            "Pending" => Ok(ChargeStatus::Pending),
            "Paid" => Ok(ChargeStatus::Paid),
            other => Err(anyhow!("Unknown charge status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CardType {
    Credit,
    Debit,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Credit => "Credit",
            CardType::Debit => "Debit",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "credit" | "credito" | "crédito" => Ok(CardType::Credit),
            "debit" | "debito" | "débito" => Ok(CardType::Debit),
            other => Err(anyhow!("Unknown card type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }

    /// Accepts the synonyms imported books arrive with.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "BUY" | "COMPRA" | "APLICACAO" | "APLICAÇÃO" | "C" => Ok(TradeSide::Buy),
            "SELL" | "VENDA" | "RESGATE" | "V" => Ok(TradeSide::Sell),
            other => Err(anyhow!("Unknown trade side '{}'", other)),
        }
    }
}

/// Asset class drives tax, currency and quantity rules for trades.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetClass {
    AcoesBr,
    Fiis,
    EtfsBr,
    Bdrs,
    StocksUs,
    EtfsUs,
    Crypto,
    RendaFixa,
    TesouroDireto,
    Fundos,
    Coe,
    Outros,
}

pub const ASSET_CLASSES: [AssetClass; 12] = [
    AssetClass::AcoesBr,
    AssetClass::Fiis,
    AssetClass::EtfsBr,
    AssetClass::Bdrs,
    AssetClass::StocksUs,
    AssetClass::EtfsUs,
    AssetClass::Crypto,
    AssetClass::RendaFixa,
    AssetClass::TesouroDireto,
    AssetClass::Fundos,
    AssetClass::Coe,
    AssetClass::Outros,
];

impl AssetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::AcoesBr => "ACAO_BR",
            AssetClass::Fiis => "FII",
            AssetClass::EtfsBr => "ETF_BR",
            AssetClass::Bdrs => "BDR",
            AssetClass::StocksUs => "STOCK_US",
            AssetClass::EtfsUs => "ETF_US",
            AssetClass::Crypto => "CRYPTO",
            AssetClass::RendaFixa => "RENDA_FIXA",
            AssetClass::TesouroDireto => "TESOURO_DIRETO",
            AssetClass::Fundos => "FUNDOS",
            AssetClass::Coe => "COE",
            AssetClass::Outros => "OUTROS",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let norm = s.trim().to_uppercase().replace(' ', "_");
        match norm.as_str() {
            "ACAO_BR" | "ACOES_BR" | "AÇÕES_BR" => Ok(AssetClass::AcoesBr),
            "FII" | "FIIS" => Ok(AssetClass::Fiis),
            "ETF_BR" | "ETFS_BR" => Ok(AssetClass::EtfsBr),
            "BDR" | "BDRS" => Ok(AssetClass::Bdrs),
            "STOCK_US" | "STOCKS_US" => Ok(AssetClass::StocksUs),
            "ETF_US" | "ETFS_US" => Ok(AssetClass::EtfsUs),
            "CRYPTO" | "CRIPTO" => Ok(AssetClass::Crypto),
            "RENDA_FIXA" => Ok(AssetClass::RendaFixa),
            "TESOURO_DIRETO" => Ok(AssetClass::TesouroDireto),
            "FUNDOS" => Ok(AssetClass::Fundos),
            "COE" => Ok(AssetClass::Coe),
            "OUTROS" => Ok(AssetClass::Outros),
            other => Err(anyhow!("Unknown asset class '{}'", other)),
        }
    }

    /// Fixed-income classes trade as value applications: quantity pinned at
    /// 1, IR/IOF due on redemption only.
    pub fn is_fixed_income(&self) -> bool {
        matches!(
            self,
            AssetClass::RendaFixa | AssetClass::TesouroDireto | AssetClass::Coe | AssetClass::Fundos
        )
    }

    /// US-listed classes settle in USD and require a per-trade FX rate.
    pub fn is_us_listed(&self) -> bool {
        matches!(self, AssetClass::StocksUs | AssetClass::EtfsUs)
    }

    /// B3 equity-like classes only trade in whole units.
    pub fn requires_integer_quantity(&self) -> bool {
        matches!(self, AssetClass::AcoesBr | AssetClass::Fiis | AssetClass::Bdrs)
    }

    /// Bucket used by the bulk quote refresh filter.
    pub fn quote_group(&self) -> &'static str {
        match self {
            AssetClass::Fiis => "FIIs",
            AssetClass::AcoesBr | AssetClass::EtfsBr | AssetClass::Bdrs => "Ações BR",
            AssetClass::StocksUs | AssetClass::EtfsUs => "Stocks",
            AssetClass::Crypto => "Cripto",
            _ => "Outros",
        }
    }
}

pub const INCOME_TYPES: [&str; 6] = [
    "DIVIDEND", "JCP", "INTEREST", "COUPON", "RF_YIELD", "FII_RENT",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: i64,
    pub name: String,
    pub account_type: AccountType,
    pub currency: String,
    pub show_on_dashboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub kind: CategoryKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Card {
    pub id: i64,
    pub name: String,
    pub brand: String,
    pub card_type: CardType,
    /// Bank account debited on invoice payment (Credit) or immediately (Debit).
    pub account_id: i64,
    pub close_day: Option<u32>,
    pub due_day: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: i64,
    pub date: NaiveDate,
    pub description: String,
    /// Signed: income/credits positive, expenses/debits negative.
    pub amount: Decimal,
    pub account_id: i64,
    pub category_id: Option<i64>,
    pub kind: CategoryKind,
    pub source_account_id: Option<i64>,
    pub card_id: Option<i64>,
    pub method: Option<Method>,
    pub due_day: Option<u32>,
    pub series_id: Option<i64>,
    pub charge_status: Option<ChargeStatus>,
    pub source_type: String,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardInvoice {
    pub id: i64,
    pub card_id: i64,
    pub invoice_period: String, // YYYY-MM
    pub due_date: NaiveDate,
    pub total_amount: Decimal,
    pub paid_amount: Decimal,
    pub status: String, // OPEN | PAID
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: i64,
    pub symbol: String,
    pub name: String,
    pub asset_class: AssetClass,
    pub sector: String,
    pub currency: String,
    pub broker_account_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: i64,
    pub asset_id: i64,
    pub date: NaiveDate,
    pub side: TradeSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub exchange_rate: Decimal,
    pub fees: Decimal,
    pub taxes: Decimal,
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trade_side_accepts_portuguese_synonyms() {
        assert_eq!(TradeSide::parse("compra").unwrap(), TradeSide::Buy);
        assert_eq!(TradeSide::parse("RESGATE").unwrap(), TradeSide::Sell);
        assert_eq!(TradeSide::parse("v").unwrap(), TradeSide::Sell);
        assert!(TradeSide::parse("swap").is_err());
    }

    #[test]
    fn asset_class_rule_sets_do_not_overlap() {
        for cls in ASSET_CLASSES {
            if cls.is_fixed_income() {
                assert!(!cls.requires_integer_quantity());
                assert!(!cls.is_us_listed());
            }
        }
        assert!(AssetClass::TesouroDireto.is_fixed_income());
        assert!(AssetClass::AcoesBr.requires_integer_quantity());
        assert!(AssetClass::StocksUs.is_us_listed());
    }

    #[test]
    fn view_parse_accepts_both_vocabularies() {
        assert_eq!(View::parse("competencia").unwrap(), View::Accrual);
        assert_eq!(View::parse("CASH").unwrap(), View::Cash);
        assert!(View::parse("weekly").is_err());
    }
}
