use anyhow::Result;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

use config::{BusKind, Config};
use dbus_interface::{AttendanceService, BUS_NAME, OBJECT_PATH};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load()?;
    tracing::info!(
        terminal = %config.terminal_id,
        face_service = %config.face_service_url,
        collection = %config.collection_id,
        match_threshold = config.match_threshold,
        sharpness_threshold = config.sharpness_threshold,
        "configuration loaded"
    );

    let engine_config = config.clone();
    let engine = engine::spawn_engine(move || engine::build_engine(&engine_config))?;

    let service = AttendanceService::new(engine, &config);
    let builder = match config.bus {
        BusKind::System => zbus::connection::Builder::system()?,
        BusKind::Session => zbus::connection::Builder::session()?,
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
