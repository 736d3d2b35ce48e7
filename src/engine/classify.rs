// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Pure classification of a transaction request into a ledger mode.
//!
//! Decides, from user intent alone, how a posting must be persisted. No
//! database access happens here; existence checks belong to the posting
//! layer.

use anyhow::Result;

use crate::error;
use crate::models::{CategoryKind, Method};

/// How a classified request is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// One settled row on the target account.
    Normal,
    /// Two mirrored legs, atomically.
    Transfer,
    /// A charge against a credit card invoice; no cash movement yet.
    CreditCardCharge,
    /// A series of pending rows anchored at a day of month.
    FutureSchedule,
    /// A series of pending rows that convert into card charges as invoices open.
    FutureCreditSchedule,
}

/// Validated classification outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classified {
    pub mode: LedgerMode,
    pub kind: CategoryKind,
    pub method: Method,
    /// Number of monthly occurrences for schedule modes, otherwise 1.
    pub repeat_months: u32,
}

/// Raw user intent, before validation.
#[derive(Debug, Clone, Copy)]
pub struct Request {
    pub kind: CategoryKind,
    pub method: Method,
    pub has_destination: bool,
    pub card_id: Option<i64>,
    pub due_day: Option<u32>,
    pub repeat_months: Option<u32>,
}

const MAX_REPEAT_MONTHS: u32 = 120;

fn method_allowed(kind: CategoryKind, method: Method) -> bool {
    use Method::*;
    match kind {
        CategoryKind::Income => matches!(method, Pix | Ted | Cash),
        CategoryKind::Expense => matches!(method, Pix | Debit | Credit | Ted | Cash | Futuro),
        CategoryKind::Transfer => matches!(method, Pix | Ted | Cash),
    }
}

/// Classify a request into a ledger mode, rejecting inconsistent combinations.
pub fn classify(req: &Request) -> Result<Classified> {
    if !method_allowed(req.kind, req.method) {
        return Err(error::validation(format!(
            "method {} is not allowed for {} entries",
            req.method.as_str(),
            req.kind.as_str()
        )));
    }

    if req.kind == CategoryKind::Transfer {
        if !req.has_destination {
            return Err(error::validation("transfer requires a destination account"));
        }
        if req.card_id.is_some() || req.due_day.is_some() || req.repeat_months.is_some() {
            return Err(error::validation(
                "transfer does not accept card, due day or repetition",
            ));
        }
        return Ok(Classified {
            mode: LedgerMode::Transfer,
            kind: req.kind,
            method: req.method,
            repeat_months: 1,
        });
    }

    if req.has_destination {
        return Err(error::validation(
            "destination account is only valid for transfers",
        ));
    }

    match req.method {
        Method::Futuro => {
            let n = req.repeat_months.unwrap_or(1);
            if !(1..=MAX_REPEAT_MONTHS).contains(&n) {
                return Err(error::validation(format!(
                    "repetition must be between 1 and {} months",
                    MAX_REPEAT_MONTHS
                )));
            }
            if req.card_id.is_some() {
                if req.due_day.is_some() {
                    return Err(error::validation(
                        "scheduled card charges derive the due date from the card, not a due day",
                    ));
                }
                Ok(Classified {
                    mode: LedgerMode::FutureCreditSchedule,
                    kind: req.kind,
                    method: req.method,
                    repeat_months: n,
                })
            } else {
                let day = req
                    .due_day
                    .ok_or_else(|| error::validation("scheduled entries require a due day"))?;
                if !(1..=31).contains(&day) {
                    return Err(error::validation("due day must be between 1 and 31"));
                }
                Ok(Classified {
                    mode: LedgerMode::FutureSchedule,
                    kind: req.kind,
                    method: req.method,
                    repeat_months: n,
                })
            }
        }
        Method::Credit => {
            if req.card_id.is_none() {
                return Err(error::validation("credit entries require a card"));
            }
            if req.due_day.is_some() || req.repeat_months.is_some() {
                return Err(error::validation(
                    "credit charges do not accept due day or repetition",
                ));
            }
            Ok(Classified {
                mode: LedgerMode::CreditCardCharge,
                kind: req.kind,
                method: req.method,
                repeat_months: 1,
            })
        }
        _ => {
            if req.card_id.is_some() && req.method != Method::Debit {
                return Err(error::validation(format!(
                    "card is not accepted with method {}",
                    req.method.as_str()
                )));
            }
            if req.due_day.is_some() || req.repeat_months.is_some() {
                return Err(error::validation(
                    "due day and repetition are only valid for scheduled entries",
                ));
            }
            Ok(Classified {
                mode: LedgerMode::Normal,
                kind: req.kind,
                method: req.method,
                repeat_months: 1,
            })
        }
    }
}
