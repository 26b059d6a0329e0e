#![allow(dead_code)]

mod allowlist;
mod api_quota;
mod calendar;
mod db_core;
mod email;
mod error;
mod http_retry;
mod request_tracing;
mod routes;
mod scheduler;
mod server_config;

use std::{env, net::SocketAddr, time::Duration};

use axum::{extract::FromRef, Router};
use migration::{Migrator, MigratorTrait};
use mimalloc::MiMalloc;
use routes::AppRouter;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use tokio::{signal, task::JoinHandle};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub type HttpClient = reqwest::Client;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub http_client: HttpClient,
    pub conn: DatabaseConnection,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::Layer::default().with_ansi(false))
        .init();

    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL is not set in .env file");
    let mut db_options = ConnectOptions::new(db_url);
    db_options.sqlx_logging(false);

    let conn = Database::connect(db_options)
        .await
        .expect("Database connection failed");

    Migrator::up(&conn, None)
        .await
        .expect("Database migration failed");

    let http_client = reqwest::ClientBuilder::new().use_rustls_tls().build()?;

    let state = ServerState { http_client, conn };

    tracing::info!("Config: {}", *server_config::cfg);

    let router = AppRouter::create(state.clone());

    let mut scheduler = JobScheduler::new()
        .await
        .expect("Failed to create scheduler");

    {
        // sweep once at startup, then on the configured cadence
        let state_clone = state.clone();
        scheduler
            .add(Job::new_one_shot_async(
                Duration::from_secs(5),
                move |uuid, _l| {
                    let state = state_clone.clone();
                    Box::pin(async move {
                        tracing::info!("Running startup mail sweep {}", uuid);
                        match email::sweep_triage_labels(&state).await {
                            Ok(stats) => tracing::info!("Startup sweep done: {:?}", stats),
                            Err(e) => tracing::error!("Startup sweep failed: {:?}", e),
                        }
                    })
                },
            )?)
            .await?;

        let sweep_cron =
            env::var("MAIL_SWEEP_CRON").unwrap_or_else(|_| "0 */15 * * * *".to_string());
        let state_clone = state.clone();
        scheduler
            .add(Job::new_async(sweep_cron.as_str(), move |uuid, mut l| {
                let state = state_clone.clone();
                Box::pin(async move {
                    tracing::info!("Running mail sweep job {}", uuid);
                    match email::sweep_triage_labels(&state).await {
                        Ok(stats) => tracing::info!("Sweep job {} done: {:?}", uuid, stats),
                        Err(e) => tracing::error!("Sweep job {} failed: {:?}", uuid, e),
                    }

                    match l.next_tick_for_job(uuid).await {
                        Ok(Some(ts)) => tracing::info!("Next mail sweep at {:?}", ts),
                        _ => tracing::warn!("Could not get next tick for mail sweep job"),
                    }
                })
            })?)
            .await?;
    }

    scheduler.shutdown_on_ctrl_c();

    scheduler.set_shutdown_handler(Box::new(move || {
        Box::pin(async move {
            tracing::info!("Shutting down scheduler");
        })
    }));

    match scheduler.start().await {
        Ok(_) => tracing::info!("Scheduler started"),
        Err(e) => tracing::error!("Failed to start scheduler: {:?}", e),
    }

    let shutdown_handle = tokio::spawn(async move {
        signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");
        tracing::info!("Received Ctrl+C, shutting down");
        std::process::exit(0);
    });

    let server_handle = run_server(router);
    let _ = tokio::join!(server_handle, shutdown_handle);

    Ok(())
}

fn run_server(router: Router) -> JoinHandle<()> {
    tokio::spawn(async {
        let port = env::var("PORT").unwrap_or("8000".to_string());
        tracing::info!("Helios running on http://0.0.0.0:{}", port);

        let addr = SocketAddr::from(([0, 0, 0, 0], port.parse::<u16>().unwrap()));
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, router).await.unwrap();
    })
}
