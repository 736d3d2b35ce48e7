// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod cards;
pub mod classify;
pub mod commitments;
pub mod cycle;
pub mod invest;
pub mod quotes;
pub mod reports;
pub mod transactions;
