mod engine;
mod error;
mod types;

pub use engine::project;
pub use error::ProjectionError;
pub use types::{
    DEFAULT_MAX_PERIODS, Inputs, LedgerRow, MAX_PERIODS_LIMIT, OverrideMap, Projection,
    RateOverride,
};
