//! Full 2-D plume integral model — the higher-fidelity simulation path.
//!
//! A Lagrangian control-volume march along the plume centerline: volume and
//! momentum flux grow by entrainment, buoyancy comes from the gas fraction,
//! bubbles shrink by dissolution and separate once dissolved, and the
//! centerline bends over with the ambient current. The sensor reads the
//! concentration at the closest centerline point, converted to ppmv and
//! optionally smoothed by a first-order sensor-response filter.
//!
//! Shares the [`concentration`](crate::plume::regression::concentration)
//! contract with the regression path: zero current or an upstream sensor
//! yields exactly zero.

use crate::config::PlumeParameters;
use crate::types::{Current, Leak, Position, Template};

use super::regression::downstream_frame;

const GRAVITY: f64 = 9.81;
/// Seawater density (kg/m^3)
const RHO_WATER: f64 = 1027.0;
/// Methane density at ambient seabed conditions (kg/m^3)
const RHO_GAS: f64 = 7.2;
/// Bubble slip velocity (m/s)
const SLIP_VELOCITY: f64 = 0.25;
/// Bubble dissolution shrink rate (m/s)
const DISSOLUTION_RATE: f64 = 2.5e-4;
/// Initial bubble radius at release (m)
const INITIAL_BUBBLE_RADIUS: f64 = 3.0e-3;
/// Mass concentration (kg/m^3) to parts-per-million by volume
const KG_M3_TO_PPMV: f64 = 1.0e6 / RHO_GAS;

/// Integration controls for the plume march.
#[derive(Debug, Clone, Copy)]
pub struct IntegratorConfig {
    pub steps: usize,
    pub dt: f64,
    /// Sensor-response time constant tau (s); 0 disables smoothing
    pub response_tau: f64,
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        Self {
            steps: 2000,
            dt: 0.25,
            response_tau: 30.0,
        }
    }
}

/// Full plume integrator.
pub struct PlumeIntegrator {
    params: PlumeParameters,
    cfg: IntegratorConfig,
}

impl PlumeIntegrator {
    pub fn new(params: PlumeParameters, cfg: IntegratorConfig) -> Self {
        Self { params, cfg }
    }

    /// Concentration (ppmv) at the sensor: integrate the plume, evaluate at
    /// the closest centerline point, apply the Gaussian radial offset.
    pub fn concentration(
        &self,
        sensor_pos: &Position,
        template: &Template,
        leak: &Leak,
        current: &Current,
    ) -> f64 {
        let speed = current.magnitude();
        if speed < 1e-9 || leak.rate <= 0.0 {
            return 0.0;
        }

        let (sx, sy) = downstream_frame(sensor_pos, template, leak, current);
        if sx <= 0.0 {
            return 0.0;
        }

        // Initial control volume at the release point
        let mut radius_b = 0.1_f64; // plume radius (m)
        let mut u = SLIP_VELOCITY; // centerline rise velocity (m/s)
        let mut q = std::f64::consts::PI * radius_b * radius_b * u; // volume flux
        let mut momentum = q * u;
        let mut gas_flux = leak.rate; // kg/s still in bubble phase
        let mut bubble_r = INITIAL_BUBBLE_RADIUS;

        let mut x = 0.0_f64;
        let mut z = leak.position.z;

        let mut best_d2 = f64::INFINITY;
        let mut best_conc = 0.0_f64;
        let mut best_b = radius_b;

        for _ in 0..self.cfg.steps {
            u = momentum / q;
            radius_b = (q / (std::f64::consts::PI * u)).sqrt();

            // Bubble dissolution: radius shrinks linearly, mass with r^3
            let shrunk = (bubble_r - DISSOLUTION_RATE * self.cfg.dt).max(0.0);
            gas_flux *= if bubble_r > 0.0 {
                (shrunk / bubble_r).powi(3)
            } else {
                0.0
            };
            bubble_r = shrunk;

            // Gas concentration in the control volume
            let conc = gas_flux / q.max(1e-12);

            // Closest-approach bookkeeping against the sensor
            let dxs = x - sx;
            let dzs = z - sensor_pos.z;
            let d2 = dxs * dxs + dzs * dzs;
            if d2 < best_d2 {
                best_d2 = d2;
                best_conc = conc;
                best_b = radius_b;
            }

            // Separation: fully dissolved bubbles stop driving the plume
            let buoyancy = if bubble_r > 0.0 {
                GRAVITY * (RHO_WATER - RHO_GAS) / RHO_WATER * (gas_flux / (RHO_GAS * u.max(1e-6)))
            } else {
                0.0
            };

            // Entrainment grows the volume flux; buoyancy the momentum flux
            let entrain = std::f64::consts::TAU * radius_b * self.params.alpha * u;
            q += entrain * self.cfg.dt;
            momentum += buoyancy * self.cfg.dt;

            // Centerline advection: current downstream, rise upward
            x += speed * self.cfg.dt;
            z += (u + if bubble_r > 0.0 { SLIP_VELOCITY } else { 0.0 }) * self.cfg.dt;

            if z > self.params.depth || (x > sx && d2 > best_d2 * 4.0) {
                break;
            }
        }

        // Radial Gaussian falloff from the centerline, plus the lateral
        // offset the 2-D march does not resolve
        let r2 = best_d2 + sy * sy;
        let sigma2 = (best_b * best_b).max(1e-6);
        best_conc * (-r2 / (2.0 * sigma2)).exp() * KG_M3_TO_PPMV
    }
}

/// First-order sensor-response filter with time constant `tau` over a series
/// sampled at `dt` spacing.
pub fn sensor_response(series: &[f64], tau: f64, dt: f64) -> Vec<f64> {
    if tau <= 0.0 || series.is_empty() {
        return series.to_vec();
    }
    let gain = (dt / tau).clamp(0.0, 1.0);
    let mut out = Vec::with_capacity(series.len());
    let mut y = series[0];
    for &x in series {
        y += gain * (x - y);
        out.push(y);
    }
    out
}
