//! Entry point for the payroll engine binary.
//!
//! Reads settings from the environment (see [`payroll_engine::config`]),
//! installs logging, loads the national tax rules plus any per-business
//! overrides from `PAYROLL_RULES_DIR`, and serves the HTTP API on
//! `PAYROLL_BIND_ADDR`.

use payroll_engine::{api, config::Settings, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;
    telemetry::init_tracing(&settings.log_level, settings.log_json);

    if let Err(err) = api::serve(settings).await {
        tracing::error!(error = %format!("{err:#}"), "payroll server stopped");
        return Err(err);
    }
    Ok(())
}
