mod api;
mod error;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use api::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;
use weavenodes::{ServiceConfig, StandardDispatcher};
use weaveruntime::WeaveRuntime;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting weave server");

    let config = ServiceConfig::from_env();
    let dispatcher = StandardDispatcher::from_config(&config);
    let runtime = WeaveRuntime::new(Arc::new(dispatcher));

    info!(models = ?config.models, "runtime initialized with standard nodes");

    let app_state = web::Data::new(AppState {
        runtime: Arc::new(runtime),
    });

    let bind_address = std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("Server starting on http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .configure(api::configure)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
