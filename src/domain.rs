//! ==============================================================================
//! domain.rs - value types for one sampling cycle
//! ==============================================================================
//!
//! purpose:
//!     the data that flows through a cycle: raw adc codes, calibration
//!     constants, the converted measurement and the delivery outcome.
//!     nothing here outlives a single cycle.
//!
//! relationships:
//!     - produced by: adc.rs (RawSample), convert.rs (Measurement)
//!     - consumed by: report.rs (payload + DeliveryResult), cycle.rs (logging)
//!
//! ==============================================================================

use serde::Serialize;
use std::fmt;

/// highest code a 10-bit adc can produce
pub const ADC_MAX: u16 = 1023;

/// a 10-bit adc code for one channel
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSample(u16);

impl RawSample {
    /// returns `None` for codes outside 0..=1023
    pub fn new(code: u16) -> Option<Self> {
        (code <= ADC_MAX).then_some(Self(code))
    }

    pub fn code(self) -> u16 {
        self.0
    }
}

// ==============================================================================
// calibration
// ==============================================================================

/// target gases reported by the node
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Gas {
    Co2,
    Nh3,
    Co,
    Ch4,
    Lpg,
}

impl Gas {
    /// key used in the json payload
    pub fn key(self) -> &'static str {
        match self {
            Gas::Co2 => "co2",
            Gas::Nh3 => "nh3",
            Gas::Co => "co",
            Gas::Ch4 => "ch4",
            Gas::Lpg => "lpg",
        }
    }
}

/// datasheet log-log fit: `log10(ppm) = slope * log10(Rs/Ro) + intercept`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GasCurve {
    pub slope: f64,
    pub intercept: f64,
}

/// fixed constants of one gas sensor type, `C` holds its gas curves
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CalibrationConstants<C> {
    /// load resistor RL in the voltage divider (kOhm)
    pub reference_resistance: f64,
    /// clean-air resistance Ro (kOhm)
    pub baseline_resistance: f64,
    pub curves: C,
}

impl<C: Copy> CalibrationConstants<C> {
    /// fails const evaluation on a non-positive resistance
    pub const fn new(reference_resistance: f64, baseline_resistance: f64, curves: C) -> Self {
        assert!(reference_resistance > 0.0, "reference resistance must be positive");
        assert!(baseline_resistance > 0.0, "baseline resistance must be positive");
        Self {
            reference_resistance,
            baseline_resistance,
            curves,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mq135Curves {
    pub co2: GasCurve,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mq9Curves {
    pub co: GasCurve,
    pub ch4: GasCurve,
    pub lpg: GasCurve,
}

// ==============================================================================
// measurement
// ==============================================================================

/// a fixed set of gas concentrations (ppm)
pub trait Concentrations {
    fn entries(&self) -> Vec<(Gas, f64)>;
}

/// MQ-135 concentrations, serialized as the `mq135` object
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Mq135Gases {
    pub co2: f64,
    /// derived from co2, not from a curve
    pub nh3: f64,
}

impl Concentrations for Mq135Gases {
    fn entries(&self) -> Vec<(Gas, f64)> {
        vec![(Gas::Co2, self.co2), (Gas::Nh3, self.nh3)]
    }
}

/// MQ-9 concentrations, serialized as the `mq9` object
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Mq9Gases {
    pub co: f64,
    pub ch4: f64,
    pub lpg: f64,
}

impl Concentrations for Mq9Gases {
    fn entries(&self) -> Vec<(Gas, f64)> {
        vec![(Gas::Co, self.co), (Gas::Ch4, self.ch4), (Gas::Lpg, self.lpg)]
    }
}

/// converted readings of one MQ sensor
#[derive(Clone, Debug, PartialEq)]
pub struct SensorReadings<C> {
    /// sensor resistance Rs (kOhm), diagnostics only
    pub resistance: f64,
    /// Rs/Ro, diagnostics only
    pub ratio: f64,
    pub ppm: C,
}

impl<C: Concentrations> SensorReadings<C> {
    /// gases whose concentration is infinite or NaN
    pub fn faults(&self) -> Vec<Gas> {
        self.ppm
            .entries()
            .into_iter()
            .filter(|(_, ppm)| !ppm.is_finite())
            .map(|(gas, _)| gas)
            .collect()
    }
}

/// everything measured in one cycle
#[derive(Clone, Debug, PartialEq)]
pub struct Measurement {
    /// celsius, one decimal
    pub temperature: f64,
    /// %RH, one decimal
    pub humidity: f64,
    pub mq135: SensorReadings<Mq135Gases>,
    pub mq9: SensorReadings<Mq9Gases>,
}

impl Measurement {
    pub fn payload(&self) -> Payload {
        Payload {
            temperature: self.temperature,
            humidity: self.humidity,
            mq9: self.mq9.ppm.clone(),
            mq135: self.mq135.ppm.clone(),
        }
    }

    /// every non-finite concentration, MQ-135 first
    pub fn faults(&self) -> Vec<Gas> {
        let mut gases = self.mq135.faults();
        gases.extend(self.mq9.faults());
        gases
    }
}

// ==============================================================================
// wire payload
// ==============================================================================
// shape expected by the collection backend

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Payload {
    pub temperature: f64,
    pub humidity: f64,
    pub mq9: Mq9Gases,
    pub mq135: Mq135Gases,
}

/// formats a ppm value, showing `FAULT` instead of inf/NaN
pub struct Ppm(pub f64);

impl fmt::Display for Ppm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() {
            write!(f, "{:.2}", self.0)
        } else {
            f.write_str("FAULT")
        }
    }
}

// ==============================================================================
// delivery
// ==============================================================================

/// outcome of one POST
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryResult {
    pub success: bool,
    /// `None` when the request never got a response
    pub status: Option<u16>,
    /// response body or transport error text, failures only
    pub body: Option<String>,
}

impl DeliveryResult {
    pub fn delivered(status: u16) -> Self {
        Self {
            success: true,
            status: Some(status),
            body: None,
        }
    }

    pub fn rejected(status: u16, body: String) -> Self {
        Self {
            success: false,
            status: Some(status),
            body: Some(body),
        }
    }

    pub fn unreachable(reason: String) -> Self {
        Self {
            success: false,
            status: None,
            body: Some(reason),
        }
    }
}
