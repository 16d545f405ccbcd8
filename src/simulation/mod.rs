// ============================================================================
// Simulation Driver — hypothesis curves for a CRITICAL anomaly
// ============================================================================
//
// For each catalogued leak, evaluate the plume regression at every one of
// the last W environment samples ending at the anomaly timestamp, yielding
// one hypothesis curve per leak in catalogue order. Closed templates are
// rejected; wave/current series must be length-aligned.

use tracing::{debug, warn};

use crate::config::SimulationConfig;
use crate::error::MonitorError;
use crate::plume::{concentration, sensor_response};
use crate::types::{Current, Hypothesis, Leak, Sensor, Template, Wave};

/// Sample cadence of the concentration stream (10-minute samples).
const SAMPLE_PERIOD_S: f64 = 600.0;

pub struct SimulationDriver {
    cfg: SimulationConfig,
}

impl SimulationDriver {
    pub fn new(cfg: SimulationConfig) -> Self {
        Self { cfg }
    }

    /// One hypothesis per catalogued leak, each of length `window`,
    /// evaluated over the last `window` environment samples.
    ///
    /// Fails with [`MonitorError::NotImplemented`] for closed templates and
    /// [`MonitorError::Unprocessable`] when the environmental series are
    /// shorter than `window` or disagree in length.
    pub fn hypotheses(
        &self,
        sensor: &Sensor,
        template: &Template,
        leaks: &[Leak],
        currents: &[Current],
        waves: &[Wave],
        window: usize,
    ) -> Result<Vec<Hypothesis>, MonitorError> {
        if template.is_closed() {
            return Err(MonitorError::NotImplemented(format!(
                "closed-template simulation (template {})",
                template.id
            )));
        }
        if !self.cfg.options.run_open_template {
            warn!(template = %template.id, "open-template simulation disabled");
            return Ok(Vec::new());
        }
        if currents.len() != waves.len() {
            return Err(MonitorError::Unprocessable(format!(
                "environmental series length mismatch: {} currents vs {} waves",
                currents.len(),
                waves.len()
            )));
        }
        if currents.len() < window {
            return Err(MonitorError::Unprocessable(format!(
                "environmental series too short: {} samples, window {}",
                currents.len(),
                window
            )));
        }

        let currents = &currents[currents.len() - window..];
        let waves = &waves[waves.len() - window..];

        let mut out = Vec::with_capacity(leaks.len());
        for leak in leaks {
            let mut curve: Vec<f64> = currents
                .iter()
                .zip(waves)
                .map(|(current, wave)| {
                    concentration(
                        &sensor.position,
                        template,
                        leak,
                        current,
                        wave,
                        &self.cfg.parameters,
                        &self.cfg.options,
                    )
                })
                .collect();

            if self.cfg.options.response_tau > 0.0 {
                curve = sensor_response(&curve, self.cfg.options.response_tau, SAMPLE_PERIOD_S);
            }

            debug!(
                leak = %leak.name,
                sensor = %sensor.id,
                peak = curve.iter().cloned().fold(0.0_f64, f64::max),
                "hypothesis simulated"
            );
            out.push(Hypothesis {
                leak_name: leak.name.clone(),
                concentrations: curve,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulationOptions;
    use crate::types::{Position, SensorConfig};

    fn sensor() -> Sensor {
        Sensor {
            id: "S1".into(),
            position: Position::new(15.0, 2.0, 4.0),
            template_id: "T1".into(),
            config: SensorConfig {
                initial_baseline: Vec::new(),
                interactive_feedback_mode: false,
            },
        }
    }

    fn template(closed: bool) -> Template {
        Template {
            id: "T1".into(),
            angle_from_north: 0.0,
            roof_height: if closed { Some(10.0) } else { None },
            platform: "Alpha".into(),
        }
    }

    fn leaks() -> Vec<Leak> {
        vec![
            Leak {
                name: "valve-7".into(),
                position: Position::new(0.0, 0.0, 1.5),
                rate: 0.5,
                duration: 600.0,
            },
            Leak {
                name: "flange-2".into(),
                position: Position::new(5.0, -3.0, 2.0),
                rate: 0.2,
                duration: 600.0,
            },
        ]
    }

    fn env(n: usize) -> (Vec<Current>, Vec<Wave>) {
        let currents = vec![Current::new(0.3, 0.0); n];
        let waves = vec![
            Wave {
                height: 0.5,
                period: 8.0,
                angle_from_north: 0.0,
            };
            n
        ];
        (currents, waves)
    }

    fn driver() -> SimulationDriver {
        SimulationDriver::new(SimulationConfig::default())
    }

    #[test]
    fn test_one_hypothesis_per_leak_in_order() {
        let (currents, waves) = env(20);
        let hyps = driver()
            .hypotheses(&sensor(), &template(false), &leaks(), &currents, &waves, 16)
            .unwrap();
        assert_eq!(hyps.len(), 2);
        assert_eq!(hyps[0].leak_name, "valve-7");
        assert_eq!(hyps[1].leak_name, "flange-2");
        for h in &hyps {
            assert_eq!(h.concentrations.len(), 16);
            assert!(h.concentrations.iter().all(|c| *c >= 0.0 && c.is_finite()));
        }
    }

    #[test]
    fn test_closed_template_not_implemented() {
        let (currents, waves) = env(20);
        let err = driver()
            .hypotheses(&sensor(), &template(true), &leaks(), &currents, &waves, 16)
            .unwrap_err();
        assert!(matches!(err, MonitorError::NotImplemented(_)));
    }

    #[test]
    fn test_length_mismatch_unprocessable() {
        let (currents, mut waves) = env(20);
        waves.pop();
        let err = driver()
            .hypotheses(&sensor(), &template(false), &leaks(), &currents, &waves, 16)
            .unwrap_err();
        assert!(matches!(err, MonitorError::Unprocessable(_)));
    }

    #[test]
    fn test_short_series_unprocessable() {
        let (currents, waves) = env(10);
        let err = driver()
            .hypotheses(&sensor(), &template(false), &leaks(), &currents, &waves, 16)
            .unwrap_err();
        assert!(matches!(err, MonitorError::Unprocessable(_)));
    }

    #[test]
    fn test_smoothing_preserves_length() {
        let mut cfg = SimulationConfig::default();
        cfg.options = SimulationOptions {
            response_tau: 1800.0,
            ..SimulationOptions::default()
        };
        let (currents, waves) = env(20);
        let hyps = SimulationDriver::new(cfg)
            .hypotheses(&sensor(), &template(false), &leaks(), &currents, &waves, 16)
            .unwrap();
        assert_eq!(hyps[0].concentrations.len(), 16);
    }
}
