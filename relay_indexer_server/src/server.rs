use std::{sync::Arc, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use relay_indexer::{IndexerMetrics, SqliteDatabase};

use crate::{
    config::IndexerConfig,
    errors::ServerError,
    routes::{health, metrics, order_by_hash, publish_fill, publish_order, publish_spend},
    workers::{start_consumers, ChannelMonitor, Publishers},
};

/// Everything the request handlers need. Cloned into each HTTP worker.
#[derive(Clone)]
pub struct ServerState {
    pub db: SqliteDatabase,
    pub publishers: Publishers,
    pub metrics: Arc<IndexerMetrics>,
    pub monitor: ChannelMonitor,
}

impl ServerState {
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.db.clone()))
            .app_data(web::Data::new(self.publishers.clone()))
            .app_data(web::Data::from(Arc::clone(&self.metrics)))
            .app_data(web::Data::new(self.monitor.clone()))
            .service(health)
            .service(metrics)
            .service(order_by_hash)
            .service(publish_fill)
            .service(publish_spend)
            .service(publish_order);
    }
}

/// Opens the database, starts the consumers and runs the HTTP server until it is stopped. The consumers are shut
/// down gracefully once the server exits.
pub async fn run_server(config: IndexerConfig) -> Result<(), ServerError> {
    let db = open_database(&config).await?;
    let (publishers, consumers) = start_consumers(&db, &config)?;
    let state = ServerState { db, publishers, metrics: consumers.metrics(), monitor: consumers.monitor() };
    let srv = create_server_instance(&config, state);
    let result = match srv {
        Ok(srv) => srv.await.map_err(|e| ServerError::Unspecified(e.to_string())),
        Err(e) => Err(e),
    };
    info!("💻️ HTTP server has stopped");
    consumers.shutdown().await;
    result
}

async fn open_database(config: &IndexerConfig) -> Result<SqliteDatabase, ServerError> {
    let url = config.database_url.as_str();
    SqliteDatabase::create_if_missing(url).await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let db = SqliteDatabase::new_with_url(url, config.db_max_connections)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
    } else {
        warn!("💻️ Database migrations are disabled. Make sure the schema at {url} is up to date.");
    }
    Ok(db)
}

pub fn create_server_instance(config: &IndexerConfig, state: ServerState) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("relay::access_log"))
            .configure(|cfg| state.configure(cfg))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    info!("💻️ Listening on {}:{}", config.host, config.port);
    Ok(srv)
}
