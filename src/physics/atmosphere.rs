// Exponential-decay standard atmosphere.
//
// Density and pressure fall off with a single scale height; temperature follows the
// tropospheric lapse rate and holds at the tropopause value above it.

pub const SEA_LEVEL_DENSITY: f64 = 1.225; // kg/m^3
pub const SEA_LEVEL_PRESSURE: f64 = 101_325.0; // Pa
pub const SEA_LEVEL_TEMPERATURE: f64 = 288.15; // K
pub const SCALE_HEIGHT: f64 = 7_400.0; // m
pub const LAPSE_RATE: f64 = -0.0065; // K/m
pub const TROPOPAUSE_TEMPERATURE: f64 = 216.65; // K

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtmosphericConditions {
    pub density: f64,
    pub pressure: f64,
    pub temperature: f64,
}

fn check_altitude(altitude: f64) -> Result<(), super::PhysicsError> {
    if altitude < 0.0 || altitude.is_nan() {
        Err(super::PhysicsError::InvalidAltitude { altitude })
    } else {
        Ok(())
    }
}

pub fn density(altitude: f64) -> Result<f64, super::PhysicsError> {
    check_altitude(altitude)?;
    Ok(SEA_LEVEL_DENSITY * (-altitude / SCALE_HEIGHT).exp())
}

pub fn pressure(altitude: f64) -> Result<f64, super::PhysicsError> {
    check_altitude(altitude)?;
    Ok(SEA_LEVEL_PRESSURE * (-altitude / SCALE_HEIGHT).exp())
}

pub fn temperature(altitude: f64) -> Result<f64, super::PhysicsError> {
    check_altitude(altitude)?;
    Ok((SEA_LEVEL_TEMPERATURE + LAPSE_RATE * altitude).max(TROPOPAUSE_TEMPERATURE))
}

pub fn conditions(altitude: f64) -> Result<AtmosphericConditions, super::PhysicsError> {
    Ok(AtmosphericConditions {
        density: density(altitude)?,
        pressure: pressure(altitude)?,
        temperature: temperature(altitude)?,
    })
}
