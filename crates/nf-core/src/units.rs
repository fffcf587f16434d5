//! Physical units attached to parameter values.
//!
//! Only the handful of conversions the fitting engine needs are supported:
//! angles (degree <-> radian) and energies (eV <-> GeV). Everything else is
//! compared by identity.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Unit of a parameter value, range and prior constants.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// Pure number.
    #[default]
    Dimensionless,
    /// Plane angle in degrees.
    Degree,
    /// Plane angle in radians.
    Radian,
    /// Energy in electron volts.
    ElectronVolt,
    /// Squared mass splitting, eV^2.
    ElectronVoltSquared,
    /// Energy in GeV.
    GeV,
    /// Livetime in years.
    Year,
    /// Anything else; only convertible to itself.
    Custom(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Angle,
    Energy,
    Other,
}

impl Unit {
    fn dimension(&self) -> Dimension {
        match self {
            Unit::Degree | Unit::Radian => Dimension::Angle,
            Unit::ElectronVolt | Unit::GeV => Dimension::Energy,
            _ => Dimension::Other,
        }
    }

    /// Factor to the canonical unit of the dimension (radian, eV).
    fn to_canonical(&self) -> f64 {
        match self {
            Unit::Degree => std::f64::consts::PI / 180.0,
            Unit::GeV => 1e9,
            _ => 1.0,
        }
    }

    /// Short symbol used in log lines.
    pub fn symbol(&self) -> &str {
        match self {
            Unit::Dimensionless => "",
            Unit::Degree => "deg",
            Unit::Radian => "rad",
            Unit::ElectronVolt => "eV",
            Unit::ElectronVoltSquared => "eV**2",
            Unit::GeV => "GeV",
            Unit::Year => "yr",
            Unit::Custom(s) => s.as_str(),
        }
    }

    /// Convert `value` expressed in `self` into `to`.
    pub fn convert(&self, value: f64, to: &Unit) -> Result<f64> {
        if self == to {
            return Ok(value);
        }
        let (a, b) = (self.dimension(), to.dimension());
        if a != b || a == Dimension::Other {
            return Err(Error::Validation(format!(
                "cannot convert from '{}' to '{}'",
                self.symbol(),
                to.symbol()
            )));
        }
        Ok(value * self.to_canonical() / to.to_canonical())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_angle_conversion() {
        let rad = Unit::Degree.convert(45.0, &Unit::Radian).unwrap();
        assert_relative_eq!(rad, std::f64::consts::FRAC_PI_4, epsilon = 1e-15);
        let deg = Unit::Radian.convert(rad, &Unit::Degree).unwrap();
        assert_relative_eq!(deg, 45.0, epsilon = 1e-12);
    }

    #[test]
    fn test_energy_conversion() {
        assert_relative_eq!(Unit::GeV.convert(2.5, &Unit::ElectronVolt).unwrap(), 2.5e9);
    }

    #[test]
    fn test_incompatible_units() {
        assert!(Unit::Degree.convert(1.0, &Unit::GeV).is_err());
        assert!(Unit::Year.convert(1.0, &Unit::Dimensionless).is_err());
        assert_eq!(Unit::Year.convert(3.0, &Unit::Year).unwrap(), 3.0);
    }
}
