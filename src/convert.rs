//! ==============================================================================
//! convert.rs - raw adc code to calibrated gas concentration
//! ==============================================================================
//!
//! purpose:
//!     the numeric core of the node. pure functions, no io, never fails.
//!
//! pipeline (per mq sensor, once per cycle):
//!
//!     raw code ──► voltage ──► Rs ──► Rs/Ro ──► ppm per gas curve
//!     (0..1023)    (0..5 V)   (kOhm)
//!
//! numeric rules:
//!     - all arithmetic is f64
//!     - voltage 0 means open circuit: Rs = +inf, and inf/NaN flow through
//!       to the ppm values untouched. cycle.rs reports them as faults.
//!     - rounding is half away from zero at the requested decimals
//!
//! ==============================================================================

use crate::domain::{
    CalibrationConstants, GasCurve, Measurement, Mq135Curves, Mq135Gases, Mq9Curves, Mq9Gases,
    RawSample, SensorReadings, ADC_MAX,
};

/// adc reference voltage
pub const VREF: f64 = 5.0;

/// load resistor on both mq boards (kOhm)
pub const LOAD_RESISTANCE: f64 = 10.0;

/// NH3 is approximated from the MQ-135 CO2 reading
pub const NH3_PER_CO2: f64 = 0.02;

pub const MQ135: CalibrationConstants<Mq135Curves> = CalibrationConstants::new(
    LOAD_RESISTANCE,
    98.6,
    Mq135Curves {
        co2: GasCurve {
            slope: -1.5,
            intercept: 3.46,
        },
    },
);

pub const MQ9: CalibrationConstants<Mq9Curves> = CalibrationConstants::new(
    LOAD_RESISTANCE,
    14.8,
    Mq9Curves {
        co: GasCurve {
            slope: -0.72,
            intercept: 0.34,
        },
        ch4: GasCurve {
            slope: -0.38,
            intercept: 0.48,
        },
        lpg: GasCurve {
            slope: -0.47,
            intercept: 0.38,
        },
    },
);

/// rounds half away from zero; non-finite values pass through
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

pub fn voltage(raw: RawSample) -> f64 {
    f64::from(raw.code()) * VREF / f64::from(ADC_MAX)
}

/// sensor resistance from the divider voltage, `+inf` at 0 V
pub fn resistance(voltage: f64, reference_resistance: f64) -> f64 {
    if voltage == 0.0 {
        return f64::INFINITY;
    }
    (VREF - voltage) * reference_resistance / voltage
}

pub fn ratio(resistance: f64, baseline_resistance: f64) -> f64 {
    resistance / baseline_resistance
}

pub fn ppm(ratio: f64, slope: f64, intercept: f64) -> f64 {
    round_to(10f64.powf(slope * ratio.log10() + intercept), 2)
}

pub fn curve_ppm(ratio: f64, curve: &GasCurve) -> f64 {
    ppm(ratio, curve.slope, curve.intercept)
}

pub fn derived_ppm(primary: f64, factor: f64) -> f64 {
    round_to(primary * factor, 2)
}

/// runs the divider stage for one sensor and hands Rs/Ro to `gases`,
/// which applies that sensor's curves to the same ratio
pub fn sensor_readings<C, G>(
    raw: RawSample,
    constants: &CalibrationConstants<C>,
    gases: impl FnOnce(f64, &C) -> G,
) -> SensorReadings<G> {
    let rs = resistance(voltage(raw), constants.reference_resistance);
    let ratio = ratio(rs, constants.baseline_resistance);

    SensorReadings {
        resistance: rs,
        ratio,
        ppm: gases(ratio, &constants.curves),
    }
}

pub fn mq135_readings(raw: RawSample) -> SensorReadings<Mq135Gases> {
    sensor_readings(raw, &MQ135, |ratio, curves| {
        let co2 = curve_ppm(ratio, &curves.co2);
        Mq135Gases {
            co2,
            nh3: derived_ppm(co2, NH3_PER_CO2),
        }
    })
}

pub fn mq9_readings(raw: RawSample) -> SensorReadings<Mq9Gases> {
    sensor_readings(raw, &MQ9, |ratio, curves| Mq9Gases {
        co: curve_ppm(ratio, &curves.co),
        ch4: curve_ppm(ratio, &curves.ch4),
        lpg: curve_ppm(ratio, &curves.lpg),
    })
}

/// builds the cycle's measurement from the dht22 pair and both adc channels
pub fn measurement(
    temperature: f64,
    humidity: f64,
    mq135_raw: RawSample,
    mq9_raw: RawSample,
) -> Measurement {
    Measurement {
        temperature: round_to(temperature, 1),
        humidity: round_to(humidity, 1),
        mq135: mq135_readings(mq135_raw),
        mq9: mq9_readings(mq9_raw),
    }
}
