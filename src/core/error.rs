use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    #[error("{field} must be between 0 and 1, got {value}")]
    RateOutOfRange { field: &'static str, value: f64 },

    #[error("{field} must be a finite amount >= 0, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    #[error(
        "target {target} not reached within {max_periods} periods (cumulative net margin {cumulative})"
    )]
    TargetUnreachable {
        target: f64,
        max_periods: u32,
        cumulative: f64,
    },
}
