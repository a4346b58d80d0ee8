#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Actix-Web API server for the hazard detection and alert engine.
//!
//! Serves the REST ingress for external feeds, capacity reports, and
//! subscriber projection pushes, plus the read-side queries (risk,
//! facilities, routes, allocation). All state lives in the [`Engine`];
//! the handlers are thin translations between the API types and the
//! engine facade.

mod handlers;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use hazard_watch_engine::{Engine, EngineConfig};

/// Shared application state.
pub struct AppState {
    /// The assembled hazard engine.
    pub engine: Engine,
}

/// Starts the hazard watch API server.
///
/// Builds the engine from `config` and serves until shutdown. This is a
/// regular async function — the caller provides the async runtime (e.g.
/// via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind
/// or encounters a runtime error.
///
/// # Panics
///
/// Panics if the engine fails to start (invalid configuration or an
/// unopenable alert log).
#[allow(clippy::future_not_send)]
pub async fn run_server(config: EngineConfig) -> std::io::Result<()> {
    log::info!("Starting hazard engine...");
    let engine = Engine::start(config).expect("Failed to start engine");

    let state = web::Data::new(AppState { engine });

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .service(
                web::scope("/api")
                    .route("/health", web::get().to(handlers::health))
                    .route("/feeds/{kind}", web::post().to(handlers::ingest_feed))
                    .route("/capacity/{facility_id}", web::post().to(handlers::update_capacity))
                    .route("/facilities", web::put().to(handlers::register_facilities))
                    .route("/facilities", web::get().to(handlers::facilities))
                    .route("/subscribers", web::put().to(handlers::refresh_subscribers))
                    .route("/risk", web::get().to(handlers::risk))
                    .route("/route", web::get().to(handlers::route))
                    .route("/allocation", web::post().to(handlers::plan_allocation)),
            )
    })
    .bind((bind_addr, port))?
    .run()
    .await
}
