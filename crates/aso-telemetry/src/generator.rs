//! ---
//! aso_section: "02-telemetry-core"
//! aso_subsection: "module"
//! aso_type: "source"
//! aso_scope: "code"
//! aso_description: "Synthetic sample generator and transition draw sources."
//! aso_version: "v0.0.0-prealpha"
//! aso_owner: "tbd"
//! ---
use std::collections::VecDeque;

use chrono::Local;
use rand::prelude::*;
use rand_distr::Uniform;

use crate::sample::{Sample, SampleOrigin, Status, LATENT_MAX, LATENT_MIN};
use crate::status::StatusMachine;
use crate::Result;

/// Supplies the per-tick uniform draw in `[0, 1)` used by the transition model.
pub trait TransitionSource: Send {
    fn next_draw(&mut self) -> f64;
}

/// Transition draws taken from a seeded [`StdRng`].
#[derive(Debug)]
pub struct RngDraws {
    rng: StdRng,
}

impl RngDraws {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl TransitionSource for RngDraws {
    fn next_draw(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }
}

/// Replays a fixed sequence of draws, then repeats `fallback` forever.
///
/// Used to drive the transition model through exact scenarios.
#[derive(Debug, Clone)]
pub struct ScriptedDraws {
    draws: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedDraws {
    /// `fallback` of 0.5 keeps the current status once the script runs out.
    pub fn new(draws: impl IntoIterator<Item = f64>) -> Self {
        Self::with_fallback(draws, 0.5)
    }

    pub fn with_fallback(draws: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            draws: draws.into_iter().collect(),
            fallback,
        }
    }

    pub fn remaining(&self) -> usize {
        self.draws.len()
    }
}

impl TransitionSource for ScriptedDraws {
    fn next_draw(&mut self) -> f64 {
        self.draws.pop_front().unwrap_or(self.fallback)
    }
}

/// Fills in the bounded random fields of a sample.
#[derive(Debug)]
pub struct SampleFactory {
    rng: StdRng,
    autonomous_confidence: Uniform<f64>,
    autonomous_entropy: Uniform<f64>,
    override_confidence: Uniform<f64>,
    override_entropy: Uniform<f64>,
    latent: Uniform<f64>,
}

impl SampleFactory {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            autonomous_confidence: Uniform::new_inclusive(0.7, 1.0),
            autonomous_entropy: Uniform::new_inclusive(0.0, 0.2),
            override_confidence: Uniform::new_inclusive(0.8, 1.0),
            override_entropy: Uniform::new_inclusive(0.0, 0.5),
            latent: Uniform::new_inclusive(LATENT_MIN, LATENT_MAX),
        }
    }

    /// Sample for a generator tick that landed on `status`.
    pub fn autonomous(&mut self, status: Status) -> Result<Sample> {
        let confidence = self.autonomous_confidence.sample(&mut self.rng);
        let entropy = self.autonomous_entropy.sample(&mut self.rng);
        let [x, y] = self.latent_pair();
        Sample::builder(status)
            .confidence(confidence)
            .entropy(entropy)
            .latent_coordinates(x, y)
            .description(format!(
                "Telemetry sync at {}",
                Local::now().format("%H:%M:%S")
            ))
            .origin(SampleOrigin::Autonomous)
            .build()
    }

    /// Sample recording an operator override to `status`. A halt always
    /// reports zero confidence.
    pub fn manual_override(&mut self, status: Status) -> Result<Sample> {
        let confidence = if status.is_halted() {
            0.0
        } else {
            self.override_confidence.sample(&mut self.rng)
        };
        let entropy = self.override_entropy.sample(&mut self.rng);
        let [x, y] = self.latent_pair();
        Sample::builder(status)
            .confidence(confidence)
            .entropy(entropy)
            .latent_coordinates(x, y)
            .description(format!("Manual override: System state set to {}", status))
            .origin(SampleOrigin::Override)
            .build()
    }

    fn latent_pair(&mut self) -> [f64; 2] {
        [
            self.latent.sample(&mut self.rng),
            self.latent.sample(&mut self.rng),
        ]
    }
}

/// Per-tick sampling logic: one draw, one transition, one sample.
pub struct SampleGenerator {
    draws: Box<dyn TransitionSource>,
    factory: SampleFactory,
    ticks: u64,
}

impl SampleGenerator {
    pub fn new(draws: Box<dyn TransitionSource>, factory: SampleFactory) -> Self {
        Self {
            draws,
            factory,
            ticks: 0,
        }
    }

    /// Generator fully driven by one seed (entropy when `None`).
    pub fn seeded(seed: Option<u64>) -> Self {
        let draws: Box<dyn TransitionSource> = match seed {
            Some(seed) => Box::new(RngDraws::seeded(seed)),
            None => Box::new(RngDraws::from_entropy()),
        };
        Self::new(draws, SampleFactory::new(seed.map(|s| s.rotate_left(17) ^ 0x5EED)))
    }

    /// Run one tick against `machine`.
    ///
    /// Returns `Ok(None)` while the machine is halted. The sample is built
    /// for the successor status before the machine commits it, so on error
    /// the status was not changed and nothing should be published.
    pub fn tick(&mut self, machine: &StatusMachine) -> Result<Option<Sample>> {
        self.ticks += 1;
        let draws = &mut self.draws;
        let factory = &mut self.factory;
        machine.advance_with(|| draws.next_draw(), |status| factory.autonomous(status))
    }

    /// Ticks attempted so far, frozen and failed ones included.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl std::fmt::Debug for SampleGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleGenerator")
            .field("ticks", &self.ticks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TelemetryError;

    #[test]
    fn autonomous_fields_stay_in_bounds() {
        let mut factory = SampleFactory::new(Some(42));
        for _ in 0..500 {
            let sample = factory.autonomous(Status::Optimal).unwrap();
            assert!((0.7..=1.0).contains(&sample.confidence()));
            assert!((0.0..=0.2).contains(&sample.entropy()));
            for axis in sample.latent_coordinates() {
                assert!((0.0..=100.0).contains(&axis));
            }
            assert!(sample.description().starts_with("Telemetry sync at "));
            assert_eq!(sample.origin(), SampleOrigin::Autonomous);
        }
    }

    #[test]
    fn override_confidence_depends_on_target() {
        let mut factory = SampleFactory::new(Some(7));
        for _ in 0..200 {
            let halted = factory.manual_override(Status::Halted).unwrap();
            assert_eq!(halted.confidence(), 0.0);
            assert!((0.0..=0.5).contains(&halted.entropy()));

            let resumed = factory.manual_override(Status::Optimal).unwrap();
            assert!((0.8..=1.0).contains(&resumed.confidence()));
            assert_eq!(
                resumed.description(),
                "Manual override: System state set to OPTIMAL"
            );
        }
    }

    #[test]
    fn scripted_draws_drive_transitions() {
        let machine = StatusMachine::default();
        let mut generator = SampleGenerator::new(
            Box::new(ScriptedDraws::new([0.97, 0.5, 0.995, 0.05])),
            SampleFactory::new(Some(1)),
        );
        let statuses: Vec<Status> = (0..4)
            .map(|_| generator.tick(&machine).unwrap().unwrap().status())
            .collect();
        assert_eq!(
            statuses,
            [Status::Uncertain, Status::Uncertain, Status::Unsafe, Status::Optimal]
        );
        assert_eq!(machine.current(), Status::Optimal);
    }

    #[test]
    fn halted_tick_produces_nothing_and_keeps_script() {
        let machine = StatusMachine::new(Status::Halted);
        let script = ScriptedDraws::new([0.995]);
        let mut generator = SampleGenerator::new(Box::new(script), SampleFactory::new(Some(1)));
        assert!(generator.tick(&machine).unwrap().is_none());
        assert_eq!(generator.ticks(), 1);

        machine.set(Status::Optimal);
        let sample = generator.tick(&machine).unwrap().unwrap();
        assert_eq!(sample.status(), Status::Unsafe);
    }

    #[test]
    fn bad_draw_fails_the_tick() {
        let machine = StatusMachine::default();
        let mut generator = SampleGenerator::new(
            Box::new(ScriptedDraws::new([f64::INFINITY])),
            SampleFactory::new(Some(1)),
        );
        assert_eq!(
            generator.tick(&machine).unwrap_err(),
            TelemetryError::InvalidDraw(f64::INFINITY)
        );
        assert_eq!(machine.current(), Status::Optimal);
    }

    #[test]
    fn same_seed_same_statuses() {
        let run = |seed| {
            let machine = StatusMachine::default();
            let mut generator = SampleGenerator::seeded(Some(seed));
            (0..300)
                .map(|_| generator.tick(&machine).unwrap().unwrap().status())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }
}
