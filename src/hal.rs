//! ==============================================================================
//! hal.rs - Hardware Abstraction Layer
//! ==============================================================================
//!
//! purpose:
//!     owns the peripheral handles the node talks to: the SPI bus in front of
//!     the MCP3008 adc, and the DHT22 temperature/humidity sensor.
//!     abstracts away the difference between running on a real Raspberry Pi
//!     (using `rppal` and adafruit_dht) and a development machine (mocks).
//!
//! design:
//!     - handles are acquired once at startup and moved into their readers.
//!       there is no global peripheral state.
//!     - "Compile Anywhere": without the `hardware` feature the mock
//!       implementations are used so the node builds and runs on x86.
//!
//! relationships:
//!     - used by: adc.rs (SpiTransport), cycle.rs (HumiditySensor)
//!     - uses: rppal (on feature="hardware")
//!     - uses: python3/adafruit_dht via subprocess (on feature="hardware")
//!
//! ==============================================================================

use crate::config::SensorsConfig;
use serde::Deserialize;
use thiserror::Error;

/// fault on the spi bus
#[derive(Debug, Error)]
#[error("SPI transfer failed: {0}")]
pub struct BusError(pub String);

/// the dht22 gave no reading
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SensorError {
    #[error("DHT22 returned no reading after {attempts} attempts")]
    NoReading { attempts: u32 },
    #[error("DHT22 driver failed: {0}")]
    Driver(String),
}

/// full-duplex transfer of a fixed 3-byte frame
pub trait SpiTransport: Send {
    fn transfer(&mut self, tx: [u8; 3]) -> Result<[u8; 3], BusError>;
}

/// blocking temperature/humidity read with internal retry
pub trait HumiditySensor: Send {
    /// returns `(humidity %RH, temperature C)`
    fn read_humidity_temperature(&mut self) -> Result<(f64, f64), SensorError>;
}

impl<T: SpiTransport + ?Sized> SpiTransport for Box<T> {
    fn transfer(&mut self, tx: [u8; 3]) -> Result<[u8; 3], BusError> {
        (**self).transfer(tx)
    }
}

impl<T: HumiditySensor + ?Sized> HumiditySensor for Box<T> {
    fn read_humidity_temperature(&mut self) -> Result<(f64, f64), SensorError> {
        (**self).read_humidity_temperature()
    }
}

// ==============================================================================================
// DHT22 HELPER OUTPUT
// ==============================================================================================

#[derive(Debug, Deserialize)]
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
struct Dht22Line {
    humidity: Option<f64>,
    temperature: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// turns the helper's stdout into `(humidity, temperature)`.
/// the last non-empty line wins, driver chatter before it is ignored
#[cfg_attr(not(feature = "hardware"), allow(dead_code))]
fn parse_dht22_output(stdout: &str) -> Result<(f64, f64), SensorError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .ok_or_else(|| SensorError::Driver("DHT22 helper printed nothing".to_string()))?;

    let parsed: Dht22Line = serde_json::from_str(line)
        .map_err(|e| SensorError::Driver(format!("unreadable DHT22 output {:?}: {}", line, e)))?;

    match parsed {
        Dht22Line {
            humidity: Some(humidity),
            temperature: Some(temperature),
            ..
        } => Ok((humidity, temperature)),
        Dht22Line {
            error: Some(error), ..
        } => Err(SensorError::Driver(error)),
        _ => Err(SensorError::NoReading { attempts: 1 }),
    }
}

// ==============================================================================================
// MOCK IMPLEMENTATION (For WSL / Non-Hardware Build)
// ==============================================================================================

/// answers every frame with a fixed adc code per channel
#[cfg(not(feature = "hardware"))]
pub struct MockSpi {
    codes: [u16; 2],
}

#[cfg(not(feature = "hardware"))]
impl MockSpi {
    pub fn new(codes: [u16; 2]) -> Self {
        tracing::info!("Using MOCK SPI bus (No hardware access)");
        Self { codes }
    }
}

#[cfg(not(feature = "hardware"))]
impl SpiTransport for MockSpi {
    fn transfer(&mut self, tx: [u8; 3]) -> Result<[u8; 3], BusError> {
        let channel = usize::from((tx[1] >> 4) & 0x07);
        let code = self
            .codes
            .get(channel)
            .copied()
            .ok_or_else(|| BusError(format!("no mock value for channel {}", channel)))?;
        tracing::debug!("[MOCK SPI] Write: {:?} -> code {}", tx, code);
        Ok([0, ((code >> 8) & 0x03) as u8, (code & 0xFF) as u8])
    }
}

#[cfg(not(feature = "hardware"))]
pub struct MockDht22 {
    pub humidity: f64,
    pub temperature: f64,
}

#[cfg(not(feature = "hardware"))]
impl HumiditySensor for MockDht22 {
    fn read_humidity_temperature(&mut self) -> Result<(f64, f64), SensorError> {
        tracing::debug!("[MOCK DHT22] Reading");
        Ok((self.humidity, self.temperature))
    }
}

/// opens the spi bus once for the process lifetime
#[cfg(not(feature = "hardware"))]
pub fn open_spi(_sensors: &SensorsConfig) -> anyhow::Result<Box<dyn SpiTransport>> {
    Ok(Box::new(MockSpi::new([300, 200])))
}

#[cfg(not(feature = "hardware"))]
pub fn open_dht22(_sensors: &SensorsConfig) -> anyhow::Result<Box<dyn HumiditySensor>> {
    tracing::info!("Using MOCK DHT22 (No hardware access)");
    Ok(Box::new(MockDht22 {
        humidity: 45.0,
        temperature: 22.5,
    }))
}

// ==============================================================================================
// REAL IMPLEMENTATION (For Raspberry Pi)
// ==============================================================================================

#[cfg(feature = "hardware")]
pub struct PiSpi {
    spi: rppal::spi::Spi,
}

#[cfg(feature = "hardware")]
impl SpiTransport for PiSpi {
    fn transfer(&mut self, tx: [u8; 3]) -> Result<[u8; 3], BusError> {
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| BusError(e.to_string()))?;
        Ok(rx)
    }
}

#[cfg(feature = "hardware")]
pub fn open_spi(sensors: &SensorsConfig) -> anyhow::Result<Box<dyn SpiTransport>> {
    use anyhow::Context;
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

    tracing::info!("Using REAL HARDWARE SPI (rppal) at {} Hz", sensors.adc.clock_hz);
    let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, sensors.adc.clock_hz, Mode::Mode0)
        .context("Failed to open SPI0/CE0")?;
    Ok(Box::new(PiSpi { spi }))
}

/// DHT22 read through adafruit_dht in a python subprocess
///
/// dht22 bit-banging needs microsecond timing that userspace rust cannot
/// guarantee, so the timing-critical part stays in the python driver.
#[cfg(feature = "hardware")]
pub struct PiDht22 {
    pin: u8,
    attempts: u32,
    retry_delay: std::time::Duration,
}

/// reads the sensor once and prints a single json line:
/// `{"humidity": h, "temperature": t, "error": e}`, with nulls for missing values
#[cfg(feature = "hardware")]
const DHT22_HELPER: &str = r#"
import json
try:
    import adafruit_dht
    import board
    dht = adafruit_dht.DHT22(getattr(board, "D" + PIN))
    try:
        print(json.dumps({"humidity": dht.humidity, "temperature": dht.temperature}))
    finally:
        dht.exit()
except Exception as e:
    print(json.dumps({"humidity": None, "temperature": None, "error": str(e)}))
"#;

#[cfg(feature = "hardware")]
impl PiDht22 {
    fn read_once(&self) -> Result<(f64, f64), SensorError> {
        use std::process::Command;

        let output = Command::new("python3")
            .arg("-c")
            .arg(DHT22_HELPER.replace("PIN", &format!("\"{}\"", self.pin)))
            .output()
            .map_err(|e| SensorError::Driver(format!("cannot start python3: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SensorError::Driver(stderr.trim().to_string()));
        }
        parse_dht22_output(&String::from_utf8_lossy(&output.stdout))
    }
}

#[cfg(feature = "hardware")]
impl HumiditySensor for PiDht22 {
    fn read_humidity_temperature(&mut self) -> Result<(f64, f64), SensorError> {
        for attempt in 1..=self.attempts {
            match self.read_once() {
                Ok(reading) => return Ok(reading),
                Err(e) => {
                    tracing::debug!("[DHT22] attempt {}/{} failed: {}", attempt, self.attempts, e);
                    if attempt < self.attempts {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        Err(SensorError::NoReading {
            attempts: self.attempts,
        })
    }
}

#[cfg(feature = "hardware")]
pub fn open_dht22(sensors: &SensorsConfig) -> anyhow::Result<Box<dyn HumiditySensor>> {
    tracing::info!("Using REAL HARDWARE DHT22 on GPIO{}", sensors.dht22.gpio_pin);
    Ok(Box::new(PiDht22 {
        pin: sensors.dht22.gpio_pin,
        attempts: sensors.dht22.attempts.max(1),
        retry_delay: std::time::Duration::from_secs(sensors.dht22.retry_delay_seconds),
    }))
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn helper_reading_parses_humidity_first() {
        let out = "{\"humidity\": 48.25, \"temperature\": 21.4}\n";
        assert_eq!(parse_dht22_output(out), Ok((48.25, 21.4)));
    }

    #[test]
    fn driver_noise_before_the_json_line_is_ignored() {
        let out = concat!(
            "Unable to set line 4 to input\n",
            "{\"humidity\": 45.0, \"temperature\": -3.5}\n\n",
        );
        assert_eq!(parse_dht22_output(out), Ok((45.0, -3.5)));
    }

    #[test]
    fn missing_value_is_no_reading() {
        let out = r#"{"humidity": null, "temperature": 22.0}"#;
        assert_eq!(
            parse_dht22_output(out),
            Err(SensorError::NoReading { attempts: 1 })
        );
    }

    #[test]
    fn helper_error_is_a_driver_fault() {
        let out = concat!(
            r#"{"humidity": null, "temperature": null, "#,
            r#""error": "Checksum did not validate"}"#,
        );
        assert_eq!(
            parse_dht22_output(out),
            Err(SensorError::Driver("Checksum did not validate".to_string()))
        );
    }

    #[test]
    fn empty_or_garbage_output_is_a_driver_fault() {
        assert!(matches!(parse_dht22_output(""), Err(SensorError::Driver(_))));
        assert!(matches!(parse_dht22_output("  \n"), Err(SensorError::Driver(_))));
        assert!(matches!(parse_dht22_output("null"), Err(SensorError::Driver(_))));
        assert!(matches!(parse_dht22_output("22.5 45"), Err(SensorError::Driver(_))));
    }

    #[cfg(not(feature = "hardware"))]
    #[test]
    fn mock_spi_encodes_ten_bit_code() {
        let mut spi = MockSpi::new([0x2AB, 7]);
        assert_eq!(spi.transfer([1, 0x80, 0]).unwrap(), [0, 0x02, 0xAB]);
        assert_eq!(spi.transfer([1, 0x90, 0]).unwrap(), [0, 0, 7]);
        assert!(spi.transfer([1, 0xA0, 0]).is_err());
    }
}
