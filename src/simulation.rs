//! Laser cavity simulation parameters and the beam appearance derived from
//! them. Rendering itself lives in the front end; this module only owns the
//! numbers.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const WAVELENGTH_NM: RangeInclusive<f64> = 380.0..=750.0;
pub const PUMP_POWER_W: RangeInclusive<f64> = 0.0..=50.0;
pub const CAVITY_LENGTH_CM: RangeInclusive<f64> = 10.0..=100.0;
pub const REFLECTIVITY: RangeInclusive<f64> = 0.5..=0.999;

#[derive(Debug, Error, PartialEq)]
pub enum SimulationError {
    #[error("{name} must be within {min}..={max}, got {value}")]
    OutOfRange {
        name: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },
    #[error("temperature must be above absolute zero, got {0} K")]
    Temperature(f64),
}

pub type SimulationResult<T> = std::result::Result<T, SimulationError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParams {
    /// nm
    pub wavelength: f64,
    /// W
    pub pump_power: f64,
    /// cm
    pub cavity_length: f64,
    pub gain_medium: String,
    pub reflectivity: f64,
    /// K
    pub temperature: f64,
}

impl Default for SimulationParams {
    /// A helium-neon laser.
    fn default() -> Self {
        Self {
            wavelength: 632.8,
            pump_power: 10.0,
            cavity_length: 30.0,
            gain_medium: "HeNe".to_string(),
            reflectivity: 0.99,
            temperature: 300.0,
        }
    }
}

/// Partial update; `None` leaves the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationPatch {
    pub wavelength: Option<f64>,
    pub pump_power: Option<f64>,
    pub cavity_length: Option<f64>,
    pub gain_medium: Option<String>,
    pub reflectivity: Option<f64>,
    pub temperature: Option<f64>,
}

fn check(name: &'static str, value: f64, range: &RangeInclusive<f64>) -> SimulationResult<()> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(SimulationError::OutOfRange {
            name,
            value,
            min: *range.start(),
            max: *range.end(),
        })
    }
}

impl SimulationParams {
    pub fn validate(&self) -> SimulationResult<()> {
        check("wavelength", self.wavelength, &WAVELENGTH_NM)?;
        check("pump power", self.pump_power, &PUMP_POWER_W)?;
        check("cavity length", self.cavity_length, &CAVITY_LENGTH_CM)?;
        check("reflectivity", self.reflectivity, &REFLECTIVITY)?;
        if self.temperature.is_nan() || self.temperature <= 0.0 {
            return Err(SimulationError::Temperature(self.temperature));
        }
        Ok(())
    }

    /// Applies `patch` and validates the result. On error `self` is left
    /// untouched.
    pub fn apply(&mut self, patch: SimulationPatch) -> SimulationResult<()> {
        let mut next = self.clone();
        if let Some(v) = patch.wavelength {
            next.wavelength = v;
        }
        if let Some(v) = patch.pump_power {
            next.pump_power = v;
        }
        if let Some(v) = patch.cavity_length {
            next.cavity_length = v;
        }
        if let Some(v) = patch.gain_medium {
            next.gain_medium = v;
        }
        if let Some(v) = patch.reflectivity {
            next.reflectivity = v;
        }
        if let Some(v) = patch.temperature {
            next.temperature = v;
        }

        next.validate()?;
        *self = next;
        Ok(())
    }

    pub fn appearance(&self) -> BeamAppearance {
        BeamAppearance {
            color: BeamColor::for_wavelength(self.wavelength),
            opacity: (0.3 + self.pump_power / 50.0).min(1.0),
            beam_scale: 1.0 + self.pump_power / 100.0,
            cavity_scale: self.cavity_length / 30.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BeamColor {
    Violet,
    Blue,
    Green,
    Yellow,
    Orange,
    Red,
    /// Outside the visible spectrum.
    White,
}

impl BeamColor {
    pub fn for_wavelength(nm: f64) -> Self {
        match nm {
            nm if (380.0..450.0).contains(&nm) => Self::Violet,
            nm if (450.0..495.0).contains(&nm) => Self::Blue,
            nm if (495.0..570.0).contains(&nm) => Self::Green,
            nm if (570.0..590.0).contains(&nm) => Self::Yellow,
            nm if (590.0..620.0).contains(&nm) => Self::Orange,
            nm if (620.0..=750.0).contains(&nm) => Self::Red,
            _ => Self::White,
        }
    }

    pub fn rgb(&self) -> u32 {
        match self {
            Self::Violet => 0x9370db,
            Self::Blue => 0x0000ff,
            Self::Green => 0x00ff00,
            Self::Yellow => 0xffff00,
            Self::Orange => 0xffa500,
            Self::Red => 0xff0000,
            Self::White => 0xffffff,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeamAppearance {
    pub color: BeamColor,
    pub opacity: f64,
    pub beam_scale: f64,
    pub cavity_scale: f64,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_a_red_hene_beam() {
        let params = SimulationParams::default();
        assert!(params.validate().is_ok());

        let look = params.appearance();
        assert_eq!(look.color, BeamColor::Red);
        assert!((look.opacity - 0.5).abs() < 1e-9);
        assert!((look.beam_scale - 1.1).abs() < 1e-9);
        assert!((look.cavity_scale - 1.0).abs() < 1e-9);
    }

    #[test]
    fn colour_bands() {
        assert_eq!(BeamColor::for_wavelength(380.0), BeamColor::Violet);
        assert_eq!(BeamColor::for_wavelength(450.0), BeamColor::Blue);
        assert_eq!(BeamColor::for_wavelength(532.0), BeamColor::Green);
        assert_eq!(BeamColor::for_wavelength(589.0), BeamColor::Yellow);
        assert_eq!(BeamColor::for_wavelength(600.0), BeamColor::Orange);
        assert_eq!(BeamColor::for_wavelength(750.0), BeamColor::Red);
        assert_eq!(BeamColor::for_wavelength(1064.0), BeamColor::White);
        assert_eq!(BeamColor::Orange.rgb(), 0xffa500);
    }

    #[test]
    fn opacity_saturates() {
        let params = SimulationParams {
            pump_power: 50.0,
            ..Default::default()
        };
        assert_eq!(params.appearance().opacity, 1.0);
    }

    #[test]
    fn partial_update() {
        let mut params = SimulationParams::default();
        params
            .apply(SimulationPatch {
                wavelength: Some(532.0),
                gain_medium: Some("Nd:YAG".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(params.wavelength, 532.0);
        assert_eq!(params.gain_medium, "Nd:YAG");
        assert_eq!(params.pump_power, 10.0);
    }

    #[test]
    fn rejected_update_keeps_previous_values() {
        let mut params = SimulationParams::default();
        let err = params
            .apply(SimulationPatch {
                pump_power: Some(20.0),
                reflectivity: Some(1.0),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err, SimulationError::OutOfRange { name: "reflectivity", .. }));
        assert_eq!(params, SimulationParams::default());

        assert_eq!(
            params.apply(SimulationPatch {
                temperature: Some(0.0),
                ..Default::default()
            }),
            Err(SimulationError::Temperature(0.0))
        );
    }
}
