// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod accounts;
pub mod google_oauth;
pub mod google_oidc;
pub mod grading;
pub mod sessions;

pub use accounts::AccountResolver;
pub use google_oauth::GoogleOAuthClient;
pub use google_oidc::{GoogleIdTokenVerifier, IdentityError};
pub use grading::GradeScale;
pub use sessions::{RenewalPolicy, SessionError, SessionManager, SessionPolicy};
