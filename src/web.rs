#![cfg(not(tarpaulin_include))]

use diabetes_dashboard::{Config, app};

/// Entry point for the dashboard web server.
///
/// Settings come from the environment (see `Config::from_env`); logging
/// follows `RUST_LOG` and defaults to `info`.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env()?;
    app::run(config).await
}
