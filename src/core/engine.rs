use super::error::ProjectionError;
use super::types::{Inputs, LedgerRow, Projection};

/// Runs the compounding projection until the cumulative net margin reaches
/// `inputs.target`.
///
/// The target check happens before every period, including the first, so a
/// target of zero produces an empty ledger. Net margin (not gross) is
/// reinvested into capital for the next period. A run that produces
/// `inputs.max_periods` rows without reaching the target fails with
/// [`ProjectionError::TargetUnreachable`].
pub fn project(inputs: &Inputs) -> Result<Projection, ProjectionError> {
    let mut rows = Vec::new();
    let mut capital = inputs.initial_capital;
    let mut cumulative = 0.0;
    let mut period: u32 = 0;

    while cumulative < inputs.target {
        if period >= inputs.max_periods {
            return Err(ProjectionError::TargetUnreachable {
                target: inputs.target,
                max_periods: inputs.max_periods,
                cumulative,
            });
        }

        let (margin_rate, tax_rate) = inputs.rates_for(period);
        let gross_margin = capital * margin_rate;
        let net_margin = gross_margin - gross_margin * tax_rate;
        cumulative += net_margin;

        rows.push(LedgerRow {
            period: period + 1,
            capital,
            margin_rate,
            gross_margin,
            tax_rate,
            net_margin,
            cumulative_net_margin: cumulative,
        });

        capital += net_margin;
        period += 1;
    }

    Ok(Projection {
        rows,
        period_count: period,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{OverrideMap, RateOverride};
    use proptest::prelude::{prop_assert, prop_assert_eq, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn sample_inputs() -> Inputs {
        Inputs::new(1_000.0, 0.10, 0.20, 200.0, OverrideMap::new()).expect("valid inputs")
    }

    #[test]
    fn reaches_target_in_three_periods() {
        let projection = project(&sample_inputs()).expect("reachable");
        assert_eq!(projection.period_count, 3);
        assert_eq!(projection.rows.len(), 3);

        let first = &projection.rows[0];
        assert_eq!(first.period, 1);
        assert_approx(first.capital, 1_000.0);
        assert_approx(first.gross_margin, 100.0);
        assert_approx(first.gross_margin * first.tax_rate, 20.0);
        assert_approx(first.net_margin, 80.0);
        assert_approx(first.cumulative_net_margin, 80.0);

        let second = &projection.rows[1];
        assert_approx(second.capital, 1_080.0);
        assert_approx(second.gross_margin, 108.0);
        assert_approx(second.net_margin, 86.4);
        assert_approx(second.cumulative_net_margin, 166.4);

        let third = &projection.rows[2];
        assert_approx(third.capital, 1_166.4);
        assert_approx(third.gross_margin, 116.64);
        assert_approx(third.net_margin, 93.312);
        assert_approx(third.cumulative_net_margin, 259.712);
    }

    #[test]
    fn override_applies_to_its_period_only() {
        let mut inputs = sample_inputs();
        inputs
            .overrides
            .insert(1, RateOverride::new(Some(0.05), None).expect("valid"));

        let projection = project(&inputs).expect("reachable");
        let second = &projection.rows[1];
        assert_approx(second.capital, 1_080.0);
        assert_approx(second.margin_rate, 0.05);
        assert_approx(second.tax_rate, 0.20);
        assert_approx(second.gross_margin, 54.0);
        assert_approx(second.net_margin, 43.2);
        assert_approx(second.cumulative_net_margin, 123.2);

        let third = &projection.rows[2];
        assert_approx(third.margin_rate, 0.10);
        assert_approx(third.capital, 1_123.2);
        assert_approx(third.net_margin, 89.856);
        assert_approx(third.cumulative_net_margin, 213.056);
        assert_eq!(projection.period_count, 3);

        let baseline = project(&sample_inputs()).expect("reachable");
        assert!(projection.final_cumulative() < baseline.final_cumulative());
    }

    #[test]
    fn override_tax_only_keeps_default_rate() {
        let mut inputs = sample_inputs();
        inputs
            .overrides
            .insert(0, RateOverride::new(None, Some(0.0)).expect("valid"));

        let projection = project(&inputs).expect("reachable");
        let first = &projection.rows[0];
        assert_approx(first.margin_rate, 0.10);
        assert_approx(first.tax_rate, 0.0);
        assert_approx(first.net_margin, 100.0);
        assert_approx(projection.rows[1].tax_rate, 0.20);
    }

    #[test]
    fn overrides_past_the_last_period_are_ignored() {
        let mut inputs = sample_inputs();
        inputs
            .overrides
            .insert(50, RateOverride::new(Some(0.0), Some(1.0)).expect("valid"));

        assert_eq!(
            project(&inputs).expect("reachable"),
            project(&sample_inputs()).expect("reachable")
        );
    }

    #[test]
    fn zero_target_returns_empty_ledger() {
        let inputs = Inputs::new(1_000.0, 0.10, 0.20, 0.0, OverrideMap::new()).expect("valid");
        let projection = project(&inputs).expect("trivially reached");
        assert!(projection.rows.is_empty());
        assert_eq!(projection.period_count, 0);
        assert_approx(projection.final_cumulative(), 0.0);
    }

    #[test]
    fn zero_growth_fails_at_period_cap() {
        let inputs = Inputs::new(1_000.0, 0.0, 0.20, 50.0, OverrideMap::new())
            .expect("valid")
            .with_max_periods(25);

        let err = project(&inputs).expect_err("cannot grow");
        assert_eq!(
            err,
            ProjectionError::TargetUnreachable {
                target: 50.0,
                max_periods: 25,
                cumulative: 0.0,
            }
        );
    }

    #[test]
    fn full_tax_fails_at_period_cap() {
        let inputs = Inputs::new(1_000.0, 0.10, 1.0, 1.0, OverrideMap::new())
            .expect("valid")
            .with_max_periods(10);
        assert!(matches!(
            project(&inputs),
            Err(ProjectionError::TargetUnreachable { max_periods: 10, .. })
        ));
    }

    #[test]
    fn override_can_rescue_zero_default_rate() {
        let mut inputs = Inputs::new(1_000.0, 0.0, 0.0, 100.0, OverrideMap::new())
            .expect("valid")
            .with_max_periods(10);
        inputs
            .overrides
            .insert(3, RateOverride::new(Some(0.2), None).expect("valid"));

        let projection = project(&inputs).expect("reached through override");
        assert_eq!(projection.period_count, 4);
        assert_approx(projection.rows[2].cumulative_net_margin, 0.0);
        assert_approx(projection.rows[3].net_margin, 200.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_positive_growth_terminates_with_monotonic_ledger(
            capital in 100u32..1_000_000,
            rate_bp in 100u32..5_000,
            tax_pct in 0u32..90,
            target_multiple_pct in 1u32..10_000,
        ) {
            let initial_capital = capital as f64;
            let target = initial_capital * target_multiple_pct as f64 / 100.0;
            let inputs = Inputs::new(
                initial_capital,
                rate_bp as f64 / 10_000.0,
                tax_pct as f64 / 100.0,
                target,
                OverrideMap::new(),
            )
            .expect("valid inputs");

            let projection = project(&inputs).expect("positive growth reaches target");
            prop_assert!(projection.period_count >= 1);
            prop_assert_eq!(projection.rows.len(), projection.period_count as usize);
            prop_assert!(projection.final_cumulative() >= target);

            for pair in projection.rows.windows(2) {
                let (this, next) = (&pair[0], &pair[1]);
                prop_assert!(next.cumulative_net_margin > this.cumulative_net_margin);
                prop_assert_eq!(next.period, this.period + 1);
                let expected_capital = this.capital + this.net_margin;
                prop_assert!((next.capital - expected_capital).abs() <= 1e-9 * expected_capital.max(1.0));
            }
            for row in &projection.rows {
                let expected_gross = row.capital * row.margin_rate;
                prop_assert!((row.gross_margin - expected_gross).abs() <= 1e-9 * expected_gross.max(1.0));
            }
            // Only the final row may meet the target.
            for row in &projection.rows[..projection.rows.len() - 1] {
                prop_assert!(row.cumulative_net_margin < target);
            }
        }
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_projection_is_deterministic_and_overrides_are_local(
            rate_bp in 100u32..3_000,
            tax_pct in 0u32..80,
            override_index in 0u32..6,
            override_rate_bp in 0u32..10_000,
        ) {
            let mut inputs = Inputs::new(
                5_000.0,
                rate_bp as f64 / 10_000.0,
                tax_pct as f64 / 100.0,
                20_000.0,
                OverrideMap::new(),
            )
            .expect("valid inputs");
            inputs.overrides.insert(
                override_index,
                RateOverride::new(Some(override_rate_bp as f64 / 10_000.0), None).expect("valid"),
            );

            let first = project(&inputs).expect("reachable");
            let second = project(&inputs).expect("reachable");
            prop_assert_eq!(&first, &second);

            for (idx, row) in first.rows.iter().enumerate() {
                let expected_rate = if idx as u32 == override_index {
                    override_rate_bp as f64 / 10_000.0
                } else {
                    rate_bp as f64 / 10_000.0
                };
                prop_assert_eq!(row.margin_rate, expected_rate);
                prop_assert_eq!(row.tax_rate, tax_pct as f64 / 100.0);
            }
        }
    }
}
