#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web server for the ecosystem services map.
//!
//! Serves a server-rendered dashboard at `/` (sidebar with download,
//! refresh, user filter and statistics), the Leaflet map itself at `/map`,
//! and a small JSON API under `/api`. One [`Session`] is shared by every
//! request, so the download state behaves like a single interactive
//! session.

mod handlers;
pub mod interactive;
pub mod page;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use ecosystem_map_session::Session;
use ecosystem_map_session::config::AppConfig;
use tokio::sync::Mutex;

use crate::page::Notice;

/// Shared application state.
pub struct AppState {
    /// The interactive session. Downloads hold the lock for their whole
    /// duration, so concurrent requests wait instead of racing.
    pub session: Mutex<Session>,
    /// Banners queued for the next page view.
    pub notices: Mutex<Vec<Notice>>,
}

impl AppState {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self {
            session: Mutex::new(session),
            notices: Mutex::new(Vec::new()),
        }
    }
}

/// Registers every route on `cfg`.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/map", web::get().to(handlers::map_page))
        .route("/download", web::post().to(handlers::download))
        .route("/refresh", web::post().to(handlers::refresh))
        .service(
            web::scope("/api")
                .route("/health", web::get().to(handlers::health))
                .route("/layers", web::get().to(handlers::layers))
                .route("/features", web::get().to(handlers::features)),
        );
}

/// Starts the ecosystem map server.
///
/// Builds a session backed by Mergin Maps and the GeoPackage loader and
/// serves it on `config.server`. The session starts out not downloaded;
/// the first page view offers the download button. This is a regular
/// async function, so the caller provides the runtime (e.g. via
/// `#[actix_web::main]`) and initializes logging.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let bind_addr = config.server.bind_addr.clone();
    let port = config.server.port;

    log::info!(
        "Serving project {} from {}",
        config.mergin.project,
        config.mergin.url
    );
    let state = web::Data::new(AppState::new(Session::with_default_backends(config)));

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
