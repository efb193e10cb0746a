pub mod atmosphere;
pub mod wind;

pub const GRAVITY: f64 = 9.81;
pub const EARTH_RADIUS: f64 = 6_371_000.0;

custom_error::custom_error! {pub PhysicsError
    InvalidAltitude { altitude: f64 } = "altitude must not be negative (got {altitude} m)",
    NoWindData = "at least one wind level is required",
    InvalidPhysicalParameters { message: String } = "invalid physical parameters; {message}",
}

impl PhysicsError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidAltitude { .. } => "INVALID_ALTITUDE",
            Self::NoWindData => "NO_WIND_DATA",
            Self::InvalidPhysicalParameters { .. } => "INVALID_PHYSICAL_PARAMETERS",
        }
    }
}

/// upward force of the displaced air, in N
pub fn buoyancy(volume: f64, density: f64) -> f64 {
    density * volume * GRAVITY
}

pub fn weight(mass: f64) -> f64 {
    mass * GRAVITY
}

/// quadratic drag `0.5·ρ·v²·A·Cd`, in N
pub fn drag(velocity: f64, density: f64, area: f64, drag_coefficient: f64) -> f64 {
    0.5 * density * velocity.powi(2) * area * drag_coefficient
}

/// speed at which drag balances weight
pub fn terminal_velocity(
    mass: f64,
    density: f64,
    area: f64,
    drag_coefficient: f64,
) -> Result<f64, PhysicsError> {
    let denominator = density * area * drag_coefficient;
    if !(denominator > 0.0) || !denominator.is_finite() {
        return Err(PhysicsError::InvalidPhysicalParameters {
            message: format!(
                "density ({density}), area ({area}) and drag coefficient ({drag_coefficient}) must all be positive"
            ),
        });
    }
    if !(mass > 0.0) {
        return Err(PhysicsError::InvalidPhysicalParameters {
            message: format!("mass must be positive (got {mass})"),
        });
    }

    Ok(((2.0 * weight(mass)) / denominator).sqrt())
}

/// One forward-Euler step of parachute descent.
///
/// The result is floored at zero, and a step that would carry the velocity across the local
/// terminal velocity stops at it instead.
pub fn descent_velocity(
    velocity: f64,
    mass: f64,
    density: f64,
    area: f64,
    drag_coefficient: f64,
    time_step: f64,
) -> f64 {
    let net_force = weight(mass) - drag(velocity, density, area, drag_coefficient);
    if net_force == 0.0 || !(mass > 0.0) {
        return velocity.max(0.0);
    }

    let mut next = velocity + net_force / mass * time_step;
    if let Ok(terminal) = terminal_velocity(mass, density, area, drag_coefficient) {
        if (velocity < terminal && next > terminal) || (velocity > terminal && next < terminal) {
            next = terminal;
        }
    }

    next.max(0.0)
}

/// Lifting-gas volume at altitude, expanding with falling ambient pressure.
pub fn expanded_volume(sea_level_volume: f64, altitude: f64) -> Result<f64, PhysicsError> {
    let pressure = atmosphere::pressure(altitude)?;
    Ok(sea_level_volume * atmosphere::SEA_LEVEL_PRESSURE / pressure)
}

/// velocity attenuation applied each ascent step
pub fn ascent_attenuation(drag_coefficient: f64) -> f64 {
    (1.0 - 0.1 * drag_coefficient).clamp(0.0, 1.0)
}

/// Sea-level gas volume that settles at `ascent_rate` under the attenuated ascent model.
pub fn volume_for_ascent_rate(
    lifted_mass: f64,
    ascent_rate: f64,
    drag_coefficient: f64,
) -> Result<f64, PhysicsError> {
    let attenuation = ascent_attenuation(drag_coefficient);
    if !(lifted_mass > 0.0) || !(ascent_rate > 0.0) || attenuation <= 0.0 || attenuation >= 1.0 {
        return Err(PhysicsError::InvalidPhysicalParameters {
            message: format!(
                "cannot derive gas volume from mass {lifted_mass}, ascent rate {ascent_rate} and drag coefficient {drag_coefficient}"
            ),
        });
    }

    // steady state of `v = (v + a) * k` is `v = a·k / (1 - k)`
    let acceleration = ascent_rate * (1.0 - attenuation) / attenuation;
    Ok(lifted_mass * (GRAVITY + acceleration) / (atmosphere::SEA_LEVEL_DENSITY * GRAVITY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utilities::approx_equal;

    #[test]
    fn test_terminal_velocity() {
        let velocity = terminal_velocity(1.0, 1.225, 2.0, 1.2).unwrap();
        let expected = ((2.0_f64 * 1.0 * 9.81) / (1.225 * 2.0 * 1.2)).sqrt();
        assert!(approx_equal(velocity, expected, 9));
    }

    #[test]
    fn test_terminal_velocity_monotonicity() {
        let small_chute = terminal_velocity(1.0, 1.225, 1.0, 1.2).unwrap();
        let large_chute = terminal_velocity(1.0, 1.225, 3.0, 1.2).unwrap();
        assert!(large_chute < small_chute);

        let light = terminal_velocity(0.5, 1.225, 2.0, 1.2).unwrap();
        let heavy = terminal_velocity(2.0, 1.225, 2.0, 1.2).unwrap();
        assert!(heavy > light);
    }

    #[test]
    fn test_terminal_velocity_zero_denominator() {
        for (density, area, drag_coefficient) in
            [(0.0, 2.0, 1.2), (1.225, 0.0, 1.2), (1.225, 2.0, 0.0)]
        {
            let result = terminal_velocity(1.0, density, area, drag_coefficient);
            assert!(matches!(
                result,
                Err(PhysicsError::InvalidPhysicalParameters { .. })
            ));
        }
    }

    #[test]
    fn test_drag() {
        assert_eq!(drag(0.0, 1.225, 2.0, 1.2), 0.0);

        let base = drag(5.0, 1.225, 2.0, 1.2);
        let doubled = drag(10.0, 1.225, 2.0, 1.2);
        assert!(approx_equal(doubled, 4.0 * base, 9));
    }

    #[test]
    fn test_descent_velocity_never_negative() {
        for velocity in [0.0, 1.0, 5.0, 50.0, 500.0] {
            for area in [0.1, 2.0, 50.0] {
                let next = descent_velocity(velocity, 1.0, 1.225, area, 1.5, 1.0);
                assert!(next >= 0.0);
            }
        }
    }

    #[test]
    fn test_descent_velocity_at_equilibrium() {
        let terminal = terminal_velocity(1.0, 1.225, 2.0, 1.2).unwrap();
        let next = descent_velocity(terminal, 1.0, 1.225, 2.0, 1.2, 1.0);
        assert!(approx_equal(next, terminal, 9));
    }

    #[test]
    fn test_descent_velocity_accelerates_from_rest() {
        let next = descent_velocity(0.0, 1.0, 0.02, 2.0, 1.2, 1.0);
        assert!(approx_equal(next, GRAVITY, 9));
    }

    #[test]
    fn test_volume_for_ascent_rate() {
        let volume = volume_for_ascent_rate(3.0, 5.0, 0.3).unwrap();

        // free lift must exceed the lifted weight
        assert!(buoyancy(volume, atmosphere::SEA_LEVEL_DENSITY) > weight(3.0));
        assert!(volume_for_ascent_rate(3.0, 0.0, 0.3).is_err());
        assert!(volume_for_ascent_rate(3.0, 5.0, 0.0).is_err());
    }

    #[test]
    fn test_expanded_volume() {
        let volume = expanded_volume(4.0, 0.0).unwrap();
        assert!(approx_equal(volume, 4.0, 9));

        let high = expanded_volume(4.0, 20000.0).unwrap();
        assert!(high > 4.0);
        assert!(expanded_volume(4.0, -1.0).is_err());
    }
}
