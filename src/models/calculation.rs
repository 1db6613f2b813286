// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calculation records for storage and API.
//!
//! Derived values are computed by the client and stored verbatim; nothing
//! here recomputes or range-checks them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Values the driver entered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculationInputs {
    pub distance_miles: f64,
    pub time_hours: f64,
    pub earnings: f64,
    pub fuel_price: f64,
    /// Miles per gallon
    pub fuel_efficiency: f64,
    /// Cost per mile
    pub depreciation_rate: f64,
    /// Percent
    pub tax_rate: f64,
}

/// Values derived from the inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculationResults {
    pub gross_hourly: f64,
    pub net_hourly: f64,
    pub fuel_cost: f64,
    pub depreciation_cost: f64,
    pub estimated_tax: f64,
    pub gross_per_mile: f64,
    pub net_per_mile: f64,
}

/// Stored calculation record in Firestore.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculationRecord {
    /// Record ID (uuid, also used as document ID)
    pub id: String,
    /// Owning account
    pub account_id: String,
    pub inputs: CalculationInputs,
    pub results: CalculationResults,
    /// 0-100
    pub score: i32,
    /// Letter-grade projection of `score`
    pub grade: String,
    pub notes: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub created_at: DateTime<Utc>,
}

/// Aggregates over an account's calculations, shown on the profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct CalculationStats {
    pub total_calculations: u32,
    pub favorite_count: u32,
    pub average_score: Option<f64>,
    pub best_score: Option<i32>,
    pub total_earnings: f64,
    pub total_distance_miles: f64,
    pub total_hours: f64,
    pub best_net_hourly: Option<f64>,
}

impl CalculationStats {
    /// Fold one record into the aggregate.
    pub fn update_from_record(&mut self, record: &CalculationRecord) {
        let previous = self.total_calculations as f64;
        self.total_calculations += 1;
        if record.is_favorite {
            self.favorite_count += 1;
        }

        let average = self.average_score.unwrap_or(0.0);
        self.average_score =
            Some((average * previous + record.score as f64) / self.total_calculations as f64);
        self.best_score = Some(self.best_score.map_or(record.score, |b| b.max(record.score)));
        self.best_net_hourly = Some(
            self.best_net_hourly
                .map_or(record.results.net_hourly, |b| b.max(record.results.net_hourly)),
        );

        self.total_earnings += record.inputs.earnings;
        self.total_distance_miles += record.inputs.distance_miles;
        self.total_hours += record.inputs.time_hours;
    }

    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a CalculationRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.update_from_record(record);
        }
        stats
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;
    use super::*;

    #[test]
    fn stats_from_records() {
        let mut a = record("acc", 80);
        a.is_favorite = true;
        let mut b = record("acc", 60);
        b.results.net_hourly = 30.0;

        let stats = CalculationStats::from_records([&a, &b]);

        assert_eq!(stats.total_calculations, 2);
        assert_eq!(stats.favorite_count, 1);
        assert_eq!(stats.average_score, Some(70.0));
        assert_eq!(stats.best_score, Some(80));
        assert_eq!(stats.best_net_hourly, Some(30.0));
        assert!((stats.total_earnings - 192.0).abs() < f64::EPSILON);
        assert!((stats.total_distance_miles - 84.0).abs() < f64::EPSILON);
    }

    #[test]
    fn stats_empty() {
        let stats = CalculationStats::from_records(std::iter::empty());
        assert_eq!(stats.total_calculations, 0);
        assert_eq!(stats.average_score, None);
        assert_eq!(stats.best_score, None);
    }
}
