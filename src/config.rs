use std::net::{IpAddr, SocketAddr};

use clap::Args;

use crate::auth::Credentials;
use crate::core::{DEFAULT_MAX_PERIODS, MAX_PERIODS_LIMIT};

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    #[arg(long, env = "MARGIN_SIM_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,
    #[arg(long, env = "MARGIN_SIM_PORT", default_value_t = 8080)]
    pub port: u16,
    #[arg(long, env = "MARGIN_SIM_USERNAME", help = "Username accepted by the login form")]
    pub username: String,
    #[arg(
        long,
        env = "MARGIN_SIM_PASSWORD",
        hide_env_values = true,
        help = "Password accepted by the login form"
    )]
    pub password: String,
    #[arg(
        long,
        env = "MARGIN_SIM_MAX_PERIODS",
        default_value_t = DEFAULT_MAX_PERIODS,
        help = "Periods a simulation may run before the target is declared unreachable"
    )]
    pub max_periods: u32,
}

/// Server settings, fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub credentials: Credentials,
    pub max_periods: u32,
}

impl ServerConfig {
    pub fn from_args(args: ServeArgs) -> Result<Self, String> {
        if args.username.is_empty() || args.password.is_empty() {
            return Err("--username and --password must not be empty".to_string());
        }
        let max_periods = validate_max_periods(args.max_periods)?;
        Ok(Self {
            addr: SocketAddr::new(args.host, args.port),
            credentials: Credentials::new(args.username, args.password),
            max_periods,
        })
    }
}

/// Period cap shared by `serve` and `project`.
pub fn validate_max_periods(max_periods: u32) -> Result<u32, String> {
    if max_periods == 0 || max_periods > MAX_PERIODS_LIMIT {
        return Err(format!(
            "--max-periods must be between 1 and {MAX_PERIODS_LIMIT}, got {max_periods}"
        ));
    }
    Ok(max_periods)
}
