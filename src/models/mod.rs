// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod calculation;
pub mod session;

pub use account::{Account, UserPreferences, VerifiedIdentity};
pub use calculation::{CalculationInputs, CalculationRecord, CalculationResults, CalculationStats};
pub use session::Session;
