use std::collections::BTreeMap;

use serde::Serialize;

use super::error::ProjectionError;

pub const DEFAULT_MAX_PERIODS: u32 = 10_000;
/// Largest period cap a caller may configure.
pub const MAX_PERIODS_LIMIT: u32 = 1_000_000;

/// Replacement rates for a single period. A `None` field falls back to the
/// run's default for that period only.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RateOverride {
    margin_rate: Option<f64>,
    tax_rate: Option<f64>,
}

impl RateOverride {
    pub fn new(margin_rate: Option<f64>, tax_rate: Option<f64>) -> Result<Self, ProjectionError> {
        if let Some(rate) = margin_rate {
            check_fraction("override margin rate", rate)?;
        }
        if let Some(tax) = tax_rate {
            check_fraction("override tax rate", tax)?;
        }
        Ok(Self {
            margin_rate,
            tax_rate,
        })
    }

    pub fn margin_rate(&self) -> Option<f64> {
        self.margin_rate
    }

    pub fn tax_rate(&self) -> Option<f64> {
        self.tax_rate
    }
}

/// Sparse overrides keyed by zero-based period index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverrideMap {
    entries: BTreeMap<u32, RateOverride>,
}

impl OverrideMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an override for `period_index`, replacing any earlier one.
    pub fn insert(&mut self, period_index: u32, rates: RateOverride) -> Option<RateOverride> {
        self.entries.insert(period_index, rates)
    }

    pub fn get(&self, period_index: u32) -> Option<&RateOverride> {
        self.entries.get(&period_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &RateOverride)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl FromIterator<(u32, RateOverride)> for OverrideMap {
    fn from_iter<I: IntoIterator<Item = (u32, RateOverride)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Validated inputs for one projection run. Rates are fractions, not percents.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    pub initial_capital: f64,
    pub margin_rate: f64,
    pub tax_rate: f64,
    pub target: f64,
    pub overrides: OverrideMap,
    pub max_periods: u32,
}

impl Inputs {
    pub fn new(
        initial_capital: f64,
        margin_rate: f64,
        tax_rate: f64,
        target: f64,
        overrides: OverrideMap,
    ) -> Result<Self, ProjectionError> {
        check_amount("initial capital", initial_capital)?;
        check_fraction("margin rate", margin_rate)?;
        check_fraction("tax rate", tax_rate)?;
        check_amount("target", target)?;
        Ok(Self {
            initial_capital,
            margin_rate,
            tax_rate,
            target,
            overrides,
            max_periods: DEFAULT_MAX_PERIODS,
        })
    }

    pub fn with_max_periods(mut self, max_periods: u32) -> Self {
        self.max_periods = max_periods;
        self
    }

    /// Effective `(margin_rate, tax_rate)` for a zero-based period index.
    pub fn rates_for(&self, period_index: u32) -> (f64, f64) {
        match self.overrides.get(period_index) {
            Some(o) => (
                o.margin_rate.unwrap_or(self.margin_rate),
                o.tax_rate.unwrap_or(self.tax_rate),
            ),
            None => (self.margin_rate, self.tax_rate),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerRow {
    pub period: u32,
    pub capital: f64,
    pub margin_rate: f64,
    pub gross_margin: f64,
    pub tax_rate: f64,
    pub net_margin: f64,
    pub cumulative_net_margin: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub rows: Vec<LedgerRow>,
    pub period_count: u32,
}

impl Projection {
    pub fn final_cumulative(&self) -> f64 {
        self.rows
            .last()
            .map(|row| row.cumulative_net_margin)
            .unwrap_or(0.0)
    }
}

fn check_fraction(field: &'static str, value: f64) -> Result<(), ProjectionError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(ProjectionError::RateOutOfRange { field, value });
    }
    Ok(())
}

fn check_amount(field: &'static str, value: f64) -> Result<(), ProjectionError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ProjectionError::NegativeAmount { field, value });
    }
    Ok(())
}
