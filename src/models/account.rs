// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Account model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Identity provider name stored alongside the external id.
pub const PROVIDER_GOOGLE: &str = "google";

/// Account stored in Firestore.
///
/// Document ID is the provider key (see [`provider_key`]), which gives the
/// external id a uniqueness constraint for free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Internal account ID (uuid, immutable)
    pub id: String,
    /// Identity provider ("google")
    pub provider: String,
    /// Stable user id assigned by the provider (`sub` claim)
    pub provider_user_id: String,
    pub email: String,
    pub display_name: String,
    /// Profile picture URL
    pub picture_url: Option<String>,
    /// When the account was first created
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    /// Last successful identity verification
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub last_login_at: DateTime<Utc>,
    #[serde(default)]
    pub preferences: UserPreferences,
}

impl Account {
    pub fn provider_key(&self) -> String {
        provider_key(&self.provider, &self.provider_user_id)
    }
}

/// Document key for an external identity: `{provider}_{url-encoded id}`.
pub fn provider_key(provider: &str, provider_user_id: &str) -> String {
    format!("{}_{}", provider, urlencoding::encode(provider_user_id))
}

/// Calculator defaults, seeded on account creation and never touched by
/// re-authentication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserPreferences {
    /// "miles" or "kilometers"
    #[validate(custom(function = "validate_distance_unit"))]
    pub distance_unit: String,
    /// ISO 4217 currency code
    #[validate(length(equal = 3))]
    pub currency: String,
    /// Self-employment tax estimate (percent)
    #[validate(range(min = 0.0, max = 100.0))]
    pub default_tax_rate: f64,
    /// Price per gallon
    #[validate(range(min = 0.0))]
    pub default_fuel_price: f64,
    /// Miles per gallon
    #[validate(range(min = 0.0))]
    pub default_fuel_efficiency: f64,
    /// Vehicle wear cost per mile
    #[validate(range(min = 0.0))]
    pub default_depreciation_rate: f64,
}

fn validate_distance_unit(unit: &str) -> Result<(), ValidationError> {
    match unit {
        "miles" | "kilometers" => Ok(()),
        _ => Err(ValidationError::new("distance_unit")),
    }
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            distance_unit: "miles".to_string(),
            currency: "USD".to_string(),
            default_tax_rate: 15.3,
            default_fuel_price: 3.50,
            default_fuel_efficiency: 25.0,
            default_depreciation_rate: 0.10,
        }
    }
}

/// Identity tuple produced by a successful verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub provider: String,
    pub provider_user_id: String,
    pub email: String,
    pub display_name: String,
    pub picture_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_key_escapes_path_characters() {
        assert_eq!(provider_key("google", "1234"), "google_1234");
        assert_eq!(provider_key("google", "a/b c"), "google_a%2Fb%20c");
    }

    #[test]
    fn preferences_validation() {
        assert!(UserPreferences::default().validate().is_ok());

        let mut prefs = UserPreferences::default();
        prefs.distance_unit = "furlongs".to_string();
        assert!(prefs.validate().is_err());

        let mut prefs = UserPreferences::default();
        prefs.default_tax_rate = 150.0;
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn preferences_default_when_missing() {
        let json = serde_json::json!({
            "id": "acc-1",
            "provider": "google",
            "provider_user_id": "g-1",
            "email": "a@x.com",
            "display_name": "A",
            "picture_url": null,
            "created_at": 1_700_000_000_000i64,
            "last_login_at": 1_700_000_000_000i64,
        });

        let account: Account = serde_json::from_value(json).unwrap();
        assert_eq!(account.preferences, UserPreferences::default());
        assert_eq!(account.created_at.timestamp(), 1_700_000_000);
    }
}
