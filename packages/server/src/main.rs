#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Standalone entry point for the ecosystem map server.
//!
//! Reads `ecosystem_map.toml` (or `$ECOSYSTEM_MAP_CONFIG`) and serves the
//! dashboard. `MERGIN_LOGIN` and `MERGIN_PASSWORD` must be set for the
//! download button to work.

use ecosystem_map_session::config::AppConfig;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = AppConfig::from_env().map_err(std::io::Error::other)?;

    ecosystem_map_server::run_server(config).await
}
