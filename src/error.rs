// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

//! Typed failure taxonomy for the ledger engine.
//!
//! Engine operations return `anyhow::Result` so call sites can add context,
//! but every deliberate rejection is one of these variants so callers (and
//! tests) can tell user-correctable input apart from state conflicts.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    /// Malformed or out-of-range input. Recoverable; nothing was written.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation raced or repeated against already-updated state
    /// (paying a PAID invoice, settling a settled commitment, overselling).
    /// Rejected before any mutation.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An external collaborator (quote provider) failed. Isolated per item
    /// during bulk refresh, never aborts a batch.
    #[error("dependency error: {0}")]
    Dependency(String),

    /// A referenced account/category/card/asset no longer exists. Fatal to
    /// the single operation.
    #[error("integrity error: {0}")]
    Integrity(String),
}

pub fn validation(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(EngineError::Validation(msg.into()))
}

pub fn conflict(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(EngineError::Conflict(msg.into()))
}

pub fn dependency(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(EngineError::Dependency(msg.into()))
}

pub fn integrity(msg: impl Into<String>) -> anyhow::Error {
    anyhow::Error::new(EngineError::Integrity(msg.into()))
}

pub fn is_validation(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Validation(_)))
}

pub fn is_conflict(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<EngineError>(), Some(EngineError::Conflict(_)))
}
