//! ==============================================================================
//! main.rs - room sensor node entry point
//! ==============================================================================
//!
//! purpose:
//!     samples an MQ-135 and an MQ-9 gas sensor (through an MCP3008 adc on
//!     SPI) plus a DHT22, converts the readings into ppm / °C / %RH and posts
//!     them to the collection backend every few seconds.
//!
//! responsibilities:
//!     - load configuration and set up logging
//!     - acquire the peripheral handles once (SPI bus, DHT22)
//!     - run the sampling cycle on a single-slot scheduler
//!     - stop cleanly between cycles on Ctrl-C / SIGTERM
//!
//! relationships:
//!     - config.rs: node.toml schema and defaults
//!     - hal.rs: SPI + DHT22 handles (real on feature="hardware", mock otherwise)
//!     - adc.rs: raw channel reads
//!     - convert.rs: raw code → calibrated measurement
//!     - report.rs: HTTP delivery
//!     - cycle.rs: one full pass, error taxonomy and recovery delays
//!     - scheduler.rs: cadence and stop signal
//!
//! architecture:
//!
//!     ┌──────────────────────────── cycle ────────────────────────────┐
//!     │  DHT22 ──┐                                                    │
//!     │  ADC ch0 ├──► convert ──► log ──► POST /api/sensors           │
//!     │  ADC ch1 ┘                                                    │
//!     └───────────────────────────────┬───────────────────────────────┘
//!                                     │ delay (5s, or fault back-off)
//!                              scheduler loop ◄── stop (Ctrl-C / SIGTERM)
//!
//! ==============================================================================

mod adc;
mod config;
mod convert;
mod cycle;
mod domain;
mod hal;
mod report;
mod scheduler;

use anyhow::Result;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // step 1: load configuration
    let (config, notes) = config::NodeConfig::load_or_default();

    // step 2: logging, RUST_LOG wins over the config file
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("===========================================================");
    tracing::info!("  Room Sensor Node - DHT22 + MQ9 + MQ135");
    tracing::info!("===========================================================");
    for note in &notes {
        tracing::info!("[CONFIG] {}", note);
    }
    config.log_summary();

    // step 3: peripherals, held for the process lifetime
    let spi = hal::open_spi(&config.sensors)?;
    let dht = hal::open_dht22(&config.sensors)?;
    let reporter = report::Reporter::new(
        config.reporter.endpoint.clone(),
        Duration::from_secs(config.reporter.timeout_seconds),
    )?;

    let mut cycle = cycle::Cycle::new(
        adc::AdcReader::new(spi),
        dht,
        reporter,
        config.polling.clone(),
        config.logging.show_sensor_data,
    );

    // step 4: stop signal
    let (mut scheduler, stop) = scheduler::Scheduler::new(scheduler::TokioClock);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        tracing::info!("Stop requested, finishing current cycle");
        stop.stop();
    });

    // step 5: sampling loop
    tracing::info!(
        "[RUNTIME] Reading DHT22 + MQ9 + MQ135 and sending every {}s",
        config.polling.interval_seconds
    );
    let cycles = scheduler.run(&mut cycle).await;
    tracing::info!("Stopped by user after {} cycles", cycles);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = scheduler::stop_signal(tokio::signal::ctrl_c()) => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            tracing::warn!("SIGTERM handler unavailable: {}", e);
            scheduler::stop_signal(tokio::signal::ctrl_c()).await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    scheduler::stop_signal(tokio::signal::ctrl_c()).await;
}
