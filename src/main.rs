//! Terminal console for an appliance's system services.
//!
//! Lists the services known to the service manager, keeps their running
//! state live from the push channel and starts, stops or restarts them over
//! the REST API. Choosing "configure" on a service prints its settings route
//! and exits.
//!
//! Settings come from the environment or a `.env` file: `APPLIANCE_URL`,
//! `APPLIANCE_PUSH_URL`, `APPLIANCE_PUSH_NAMESPACE`, `APPLIANCE_PUSH_TIMEOUT_SECS`,
//! `APPLIANCE_INSECURE_TLS`, `SERVICES_CONSOLE_LOG` and `RUST_LOG`.

use anyhow::Result;
use std::sync::Arc;

mod app;
mod config;
mod logging;

use app::{App, ViewExit, api::HttpServiceApi};
use config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    logging::init(&config.log_file)?;
    tracing::info!(base_url = %config.base_url, push_url = %config.push_url, "starting services console");

    let api = Arc::new(HttpServiceApi::new(config.base_url.clone(), config.insecure_tls)?);
    let mut app = App::new(api, config.push());

    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal).await;
    ratatui::restore();

    match result? {
        ViewExit::Quit => {}
        ViewExit::Navigate(route) => println!("{}", route.as_str()),
    }
    Ok(())
}
