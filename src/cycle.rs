//! ==============================================================================
//! cycle.rs - one sample → convert → report pass
//! ==============================================================================
//!
//! order within a cycle:
//!
//!     1. DHT22 (blocking, internal retry)   ── fault ─► CycleError::Sensor
//!     2. ADC channel 0 (MQ-135)             ── fault ─► CycleError::Bus
//!     3. ADC channel 1 (MQ-9)               ── fault ─► CycleError::Bus
//!     4. convert (pure, cannot fail)
//!     5. log
//!     6. non-finite ppm check               ── fault ─► CycleError::Conversion
//!     7. POST                               ── fault ─► CycleError::Delivery
//!
//! a fault ends the cycle at that step; later steps do not run.
//! every outcome maps to the delay before the next cycle.
//!
//! ==============================================================================

use crate::adc::{AdcChannel, AdcReader};
use crate::config::PollingConfig;
use crate::convert;
use crate::domain::{Concentrations, DeliveryResult, Gas, Measurement, Ppm, SensorReadings};
use crate::hal::{BusError, HumiditySensor, SensorError, SpiTransport};
use crate::report::Reporter;
use crate::scheduler::PeriodicTask;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("sensor read failed: {0}")]
    Sensor(#[from] SensorError),
    #[error("bus read failed: {0}")]
    Bus(#[from] BusError),
    #[error("non-finite concentration for {}, not sending", gas_list(.gases))]
    Conversion { gases: Vec<Gas> },
    #[error("delivery failed: status {status:?}, response: {body}")]
    Delivery { status: Option<u16>, body: String },
}

impl CycleError {
    /// delay before the next cycle
    pub fn recovery(&self, polling: &PollingConfig) -> Duration {
        match self {
            CycleError::Sensor(_) => polling.sensor_retry(),
            CycleError::Bus(_) | CycleError::Conversion { .. } | CycleError::Delivery { .. } => {
                polling.interval()
            }
        }
    }
}

fn gas_list(gases: &[Gas]) -> String {
    gases.iter().map(|gas| gas.key()).collect::<Vec<_>>().join(", ")
}

/// where a finished measurement goes
pub trait Deliver {
    fn deliver(&self, measurement: &Measurement) -> impl Future<Output = DeliveryResult>;
}

impl Deliver for Reporter {
    async fn deliver(&self, measurement: &Measurement) -> DeliveryResult {
        Reporter::deliver(self, measurement).await
    }
}

pub struct Cycle<S, H, D> {
    adc: AdcReader<S>,
    // shared with the blocking pool for the duration of one read
    dht: Arc<Mutex<H>>,
    sink: D,
    polling: PollingConfig,
    show_sensor_data: bool,
}

impl<S, H, D> Cycle<S, H, D>
where
    S: SpiTransport,
    H: HumiditySensor + 'static,
    D: Deliver,
{
    pub fn new(
        adc: AdcReader<S>,
        dht: H,
        sink: D,
        polling: PollingConfig,
        show_sensor_data: bool,
    ) -> Self {
        Self {
            adc,
            dht: Arc::new(Mutex::new(dht)),
            sink,
            polling,
            show_sensor_data,
        }
    }

    pub async fn run(&mut self) -> Result<DeliveryResult, CycleError> {
        let (humidity, temperature) = self.read_dht22().await?;

        let mq135_raw = self.adc.read_raw_channel(AdcChannel::Mq135)?;
        let mq9_raw = self.adc.read_raw_channel(AdcChannel::Mq9)?;

        let measurement = convert::measurement(temperature, humidity, mq135_raw, mq9_raw);
        self.log_measurement(&measurement);

        // full-scale code: Rs = 0, log10(0) leaves no finite ppm, nothing is sent
        let gases = measurement.faults();
        if !gases.is_empty() {
            return Err(CycleError::Conversion { gases });
        }

        let result = self.sink.deliver(&measurement).await;
        if result.success {
            Ok(result)
        } else {
            Err(CycleError::Delivery {
                status: result.status,
                body: result.body.unwrap_or_default(),
            })
        }
    }

    async fn read_dht22(&self) -> Result<(f64, f64), SensorError> {
        let dht = Arc::clone(&self.dht);
        tokio::task::spawn_blocking(move || {
            let mut sensor = dht.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            sensor.read_humidity_temperature()
        })
        .await
        .map_err(|e| SensorError::Driver(format!("task join error: {}", e)))?
    }

    fn log_measurement(&self, m: &Measurement) {
        if !self.show_sensor_data {
            return;
        }

        tracing::info!(
            "[DHT22] Temp: {:.1}°C | Humidity: {:.1}%",
            m.temperature,
            m.humidity
        );
        log_gas("MQ135", &m.mq135);
        log_gas("MQ9", &m.mq9);
        match serde_json::to_string(&m.payload()) {
            Ok(json) => tracing::debug!("Payload to send: {}", json),
            Err(e) => tracing::debug!("Payload not serializable: {}", e),
        }
    }
}

fn log_gas<C: Concentrations>(name: &str, readings: &SensorReadings<C>) {
    for gas in readings.faults() {
        tracing::warn!(
            "[{}] {} concentration is not finite (Rs = {:.2} kOhm, Rs/Ro = {:.2})",
            name,
            gas.key(),
            readings.resistance,
            readings.ratio
        );
    }

    let gases = readings
        .ppm
        .entries()
        .into_iter()
        .map(|(gas, ppm)| format!("{}: {} ppm", gas.key(), Ppm(ppm)))
        .collect::<Vec<_>>()
        .join(" | ");
    tracing::info!(
        "[{}] Rs = {:.2} kOhm, Rs/Ro = {:.2} | {}",
        name,
        readings.resistance,
        readings.ratio,
        gases
    );
}

impl<S, H, D> PeriodicTask for Cycle<S, H, D>
where
    S: SpiTransport,
    H: HumiditySensor + 'static,
    D: Deliver,
{
    async fn run_once(&mut self) -> Duration {
        match self.run().await {
            Ok(result) => {
                tracing::info!("Data sent successfully (status {:?})", result.status);
                self.polling.interval()
            }
            Err(e) => {
                let delay = e.recovery(&self.polling);
                match &e {
                    CycleError::Sensor(_) => tracing::warn!("{}; retrying in {:?}", e, delay),
                    _ => tracing::error!("{}; next attempt in {:?}", e, delay),
                }
                delay
            }
        }
    }
}
