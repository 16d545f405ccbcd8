//! Open-template plume regression.
//!
//! Deterministic concentration-at-sensor for a catalogued leak under given
//! current and wave conditions. The model is a calibrated Gaussian plume
//! bent over by the current: the leak's gas rises while advecting
//! downstream, spreading by entrainment and bottom-generated turbulence.
//! Constants live in `simulation.parameters` and reproduce the
//! commissioning release trials; they are not re-derived here.

use crate::config::{PlumeParameters, SimulationOptions};
use crate::types::{Current, Leak, Position, Template, Wave};

use super::wave_current::corrected_drag;

/// Concentration (ppmv-equivalent) the leak would produce at the sensor.
///
/// Returns exactly 0.0 when the current vanishes or the sensor sits at or
/// upstream of the leak (travel time <= 0).
pub fn concentration(
    sensor_pos: &Position,
    template: &Template,
    leak: &Leak,
    current: &Current,
    wave: &Wave,
    params: &PlumeParameters,
    options: &SimulationOptions,
) -> f64 {
    let speed = current.magnitude();
    if speed < 1e-9 {
        return 0.0;
    }

    // Frame where the current flows along +x and the leak sits at the origin
    let (x, y) = downstream_frame(sensor_pos, template, leak, current);

    let t = x / speed;
    if t <= 0.0 {
        return 0.0;
    }

    let cd = if options.wave_current_interaction {
        corrected_drag(current, wave, params)
    } else {
        params.cd
    };

    // Rising plume centerline height
    let rise = params.a * (speed / params.uref).powf(params.p) * (t / params.tref).powf(params.q);
    let z_c = leak.position.z + rise;

    // Radial scale: entrainment growth plus bottom-turbulence dispersion
    let u_f = cd.sqrt() * speed;
    let integral = leak.position.z * t + t * rise / (1.0 + params.q);
    let sigma2 = (params.alpha * rise / 2.0).powi(2) + 2.0 * params.kappa * u_f * integral;
    if sigma2 <= 0.0 {
        return 0.0;
    }

    let c0 = leak.rate / (std::f64::consts::TAU * speed * sigma2);

    let dz = sensor_pos.z - z_c;
    let r2 = y * y + dz * dz;
    c0 * (-r2 / (2.0 * sigma2)).exp()
}

/// Transform the sensor position into the leak-origin, current-aligned frame.
///
/// Rotation angle: `alpha = current_angle - pi/2 - template_angle`, mapping
/// the compass current direction into the template's local axes.
pub(crate) fn downstream_frame(
    sensor_pos: &Position,
    template: &Template,
    leak: &Leak,
    current: &Current,
) -> (f64, f64) {
    let alpha =
        current.angle_from_north() - std::f64::consts::FRAC_PI_2 - template.angle_from_north;
    let dx = sensor_pos.x - leak.position.x;
    let dy = sensor_pos.y - leak.position.y;
    let x = dx * alpha.cos() + dy * alpha.sin();
    let y = -dx * alpha.sin() + dy * alpha.cos();
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template() -> Template {
        Template {
            id: "T1".into(),
            angle_from_north: 0.0,
            roof_height: None,
            platform: "Alpha".into(),
        }
    }

    fn leak() -> Leak {
        Leak {
            name: "flange-3".into(),
            position: Position::new(0.0, 0.0, 2.0),
            rate: 0.5,
            duration: 600.0,
        }
    }

    fn calm_wave() -> Wave {
        Wave {
            height: 0.0,
            period: 8.0,
            angle_from_north: 0.0,
        }
    }

    fn eval(sensor: Position, current: Current) -> f64 {
        concentration(
            &sensor,
            &template(),
            &leak(),
            &current,
            &calm_wave(),
            &PlumeParameters::default(),
            &SimulationOptions {
                wave_current_interaction: false,
                ..SimulationOptions::default()
            },
        )
    }

    #[test]
    fn test_zero_current_is_exactly_zero() {
        let c = eval(Position::new(10.0, 0.0, 3.0), Current::new(0.0, 0.0));
        assert_eq!(c, 0.0);
    }

    #[test]
    fn test_upstream_sensor_is_exactly_zero() {
        // Current flows east; a sensor west of the leak never sees the plume.
        // Template angle 0: east in compass = +x in the local frame.
        let c = eval(Position::new(-10.0, 0.0, 3.0), Current::new(0.3, 0.0));
        assert_eq!(c, 0.0);
    }

    #[test]
    fn test_downstream_sensor_sees_plume() {
        let c = eval(Position::new(15.0, 0.0, 4.0), Current::new(0.3, 0.0));
        assert!(c > 0.0);
        assert!(c.is_finite());
    }

    #[test]
    fn test_concentration_decays_off_axis() {
        let on_axis = eval(Position::new(15.0, 0.0, 4.0), Current::new(0.3, 0.0));
        let off_axis = eval(Position::new(15.0, 8.0, 4.0), Current::new(0.3, 0.0));
        assert!(off_axis < on_axis);
    }

    #[test]
    fn test_stronger_rate_scales_linearly() {
        let base = eval(Position::new(15.0, 0.0, 4.0), Current::new(0.3, 0.0));
        let mut big = leak();
        big.rate *= 3.0;
        let c = concentration(
            &Position::new(15.0, 0.0, 4.0),
            &template(),
            &big,
            &Current::new(0.3, 0.0),
            &calm_wave(),
            &PlumeParameters::default(),
            &SimulationOptions {
                wave_current_interaction: false,
                ..SimulationOptions::default()
            },
        );
        assert!((c / base - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let a = eval(Position::new(12.0, 1.0, 5.0), Current::new(0.2, 0.1));
        let b = eval(Position::new(12.0, 1.0, 5.0), Current::new(0.2, 0.1));
        assert_eq!(a, b);
    }
}
