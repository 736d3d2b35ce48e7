// Copyright (c) 2025 Caixa Contributors.
// All rights reserved.
//
// This source code is licensed under the license found in the
// LICENSE file in the root directory of this source tree.

pub mod accounts;
pub mod cards;
pub mod categories;
pub mod dashboard;
pub mod importer;
pub mod invest;
pub mod invoices;
pub mod transactions;
