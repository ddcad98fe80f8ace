use std::sync::Arc;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer, Responder, get};
use anyhow::Context;
use dotenvy::dotenv;

mod api;
mod auth;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod models;
mod routes;
mod service;
mod store;
mod utils;

use config::{Config, StoreBackend};
use db::init_db;

use crate::docs::ApiDoc;
use crate::service::attendance::AttendanceService;
use crate::service::notify::{self, NotificationDispatch, StoreNotifier};
use crate::service::tasks::TaskService;
use crate::service::ServiceContext;
use crate::store::Store;
use crate::store::memory::MemoryStore;
use crate::store::mysql::MySqlStore;
use crate::utils::clock::SystemClock;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi; // needed for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

#[get("/")]
async fn index() -> impl Responder {
    "sitecrew is running"
}

async fn build_store(config: &Config) -> anyhow::Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::Mysql => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL must be set for the mysql backend")?;
            let pool = init_db(url).await?;
            info!("Connected to MySQL");
            Ok(Arc::new(MySqlStore::new(pool, config.project_cache_ttl)))
        }
        StoreBackend::Memory => {
            let store = match &config.store_seed_file {
                Some(path) => MemoryStore::from_seed_file(path)?,
                None => {
                    warn!("In-memory store without seed file, every request will be rejected until data exists");
                    MemoryStore::new()
                }
            };
            Ok(Arc::new(store))
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "sitecrew.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_target(false) // removes module path
        .with_level(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .pretty()
        .init();

    info!(backend = %config.store_backend, "Server starting...");

    let store = build_store(&config).await?;

    let (notifications, receiver) = NotificationDispatch::channel();
    actix_web::rt::spawn(notify::run_worker(
        receiver,
        Arc::new(StoreNotifier::new(store.clone())),
    ));

    let ctx = ServiceContext {
        store,
        clock: Arc::new(SystemClock),
        notifications,
        settings: config.workflow_settings(),
    };
    let attendance = Data::new(AttendanceService::new(ctx.clone()));
    let tasks = Data::new(TaskService::new(ctx));

    // clone what the factory closure needs before moving config
    let server_addr = config.server_addr.clone();
    let config_data = Data::new(config.clone());

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(config_data.clone())
            .app_data(attendance.clone())
            .app_data(tasks.clone())
            .service(index)
            // protected workflow routes with rate limiting
            .configure(|cfg| routes::configure(cfg, config.clone()))
    })
    .bind(&server_addr)
    .with_context(|| format!("binding {server_addr}"))?
    .run()
    .await?;

    info!("Server stopped");
    Ok(())
}
