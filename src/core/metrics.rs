// Derived measurements: VSWR and PA temperature

use serde::{Deserialize, Serialize};

/// Temperatures above this are treated as bad readings
pub const MAX_PLAUSIBLE_TEMP_C: f64 = 100.0;

/// Linear fit of PA temperature against ADC millivolts, from TM8110 readings
const TEMP_SLOPE: f64 = -0.463;
const TEMP_INTERCEPT: f64 = 244.81;

/// How forward/reverse readings are turned into VSWR
///
/// Radio firmware variants disagree, so the choice is made per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VswrFormula {
    /// Readings proportional to power: rho = sqrt(R/F), VSWR = (1+rho)/(1-rho)
    #[default]
    Reflection,
    /// Readings proportional to voltage: VSWR = (F+R)/(F-R)
    VoltageRatio,
}

impl VswrFormula {
    /// Compute VSWR, or `None` if the result is not a finite positive number
    pub fn vswr(&self, forward: f64, reverse: f64) -> Option<f64> {
        if !forward.is_finite() || !reverse.is_finite() || forward <= 0.0 || reverse < 0.0 {
            return None;
        }

        let vswr = match self {
            VswrFormula::Reflection => {
                let rho = (reverse / forward).sqrt();
                (1.0 + rho) / (1.0 - rho)
            }
            VswrFormula::VoltageRatio => (forward + reverse) / (forward - reverse),
        };

        (vswr.is_finite() && vswr > 0.0).then_some(vswr)
    }
}

/// PA temperature in degrees C from an ADC reading in millivolts
///
/// Rounded to one decimal place, halves away from zero.
pub fn calculate_degrees(adc_millivolts: f64) -> f64 {
    let degrees = TEMP_SLOPE * adc_millivolts + TEMP_INTERCEPT;
    (degrees * 10.0).round() / 10.0
}

/// Returns `true` for temperatures worth reporting
pub fn is_plausible_temperature(celsius: f64) -> bool {
    celsius.is_finite() && celsius <= MAX_PLAUSIBLE_TEMP_C
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_degrees_fit() {
        let cases = [
            (28.1, 468.0),
            (28.6, 467.0),
            (30.0, 464.0),
            (32.8, 458.0),
            (36.5, 450.0),
            (37.4, 448.0),
            (35.5, 452.0),
            (34.1, 455.0),
        ];
        for (degrees, millivolts) in cases {
            assert_eq!(calculate_degrees(millivolts), degrees, "{} mV", millivolts);
        }
    }

    #[test]
    fn test_calculate_degrees_matches_real_readings() {
        // Whole-degree values the radio itself reported for the same ADC readings
        let cases = [
            (28.0, 468.0),
            (29.0, 467.0),
            (30.0, 464.0),
            (33.0, 458.0),
            (37.0, 450.0),
            (37.0, 448.0),
            (36.0, 452.0),
            (34.0, 455.0),
        ];
        for (degrees, millivolts) in cases {
            assert_eq!(calculate_degrees(millivolts).round(), degrees);
        }
    }

    #[test]
    fn test_plausible_temperature() {
        assert!(is_plausible_temperature(35.0));
        assert!(is_plausible_temperature(100.0));
        assert!(!is_plausible_temperature(100.1));
        assert!(!is_plausible_temperature(f64::NAN));
        // 0 mV reads as ~245 C, which is a bad sample
        assert!(!is_plausible_temperature(calculate_degrees(0.0)));
    }

    #[test]
    fn test_vswr_reflection() {
        let vswr = VswrFormula::Reflection.vswr(100.0, 4.0).unwrap();
        // rho = 0.2
        assert!((vswr - 1.5).abs() < 1e-9);

        assert_eq!(VswrFormula::Reflection.vswr(100.0, 0.0), Some(1.0));
    }

    #[test]
    fn test_vswr_voltage_ratio() {
        let vswr = VswrFormula::VoltageRatio.vswr(300.0, 100.0).unwrap();
        assert!((vswr - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_vswr_rejects_bad_readings() {
        for formula in [VswrFormula::Reflection, VswrFormula::VoltageRatio] {
            assert_eq!(formula.vswr(0.0, 10.0), None);
            assert_eq!(formula.vswr(100.0, 100.0), None);
            assert_eq!(formula.vswr(100.0, 150.0), None);
            assert_eq!(formula.vswr(f64::NAN, 1.0), None);
            assert_eq!(formula.vswr(100.0, -1.0), None);
        }
    }
}
