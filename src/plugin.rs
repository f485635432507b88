use bevy::log::{error, info};
use bevy::prelude::*;

use crate::config::AnalysisConfig;
use crate::error::MpmResult;
use crate::orchestrator::{Collaborators, StepReport, TimeStepOrchestrator};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimulationStatus {
    Running,
    Finished,
    Failed(String),
}

/// A running analysis, advanced by [`advance_simulation`].
#[derive(Resource)]
pub struct Simulation {
    orchestrator: TimeStepOrchestrator,
    status: SimulationStatus,
    last_report: Option<StepReport>,
}

impl Simulation {
    pub fn new(orchestrator: TimeStepOrchestrator) -> Self {
        let status = if orchestrator.is_finished() {
            SimulationStatus::Finished
        } else {
            SimulationStatus::Running
        };
        Self {
            orchestrator,
            status,
            last_report: None,
        }
    }

    pub fn initialize(config: AnalysisConfig, collaborators: Collaborators) -> MpmResult<Self> {
        TimeStepOrchestrator::initialize(config, collaborators).map(Self::new)
    }

    pub fn orchestrator(&self) -> &TimeStepOrchestrator {
        &self.orchestrator
    }

    pub fn status(&self) -> &SimulationStatus {
        &self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == SimulationStatus::Running
    }

    pub fn last_report(&self) -> Option<&StepReport> {
        self.last_report.as_ref()
    }

    /// Run up to `steps` steps; stops at the end of the analysis or on the
    /// first error.
    pub fn advance(&mut self, steps: usize) {
        for _ in 0..steps {
            if !self.is_running() {
                return;
            }
            match self.orchestrator.step() {
                Ok(report) => {
                    self.last_report = Some(report);
                    if self.orchestrator.is_finished() {
                        info!("analysis finished after step {}", report.step);
                        self.status = SimulationStatus::Finished;
                    }
                }
                Err(err) => {
                    error!("analysis failed: {err}");
                    self.status = SimulationStatus::Failed(err.to_string());
                }
            }
        }
    }
}

#[derive(Resource, Clone, Copy, Debug)]
pub struct StepsPerUpdate(pub usize);

/// Steps the [`Simulation`] resource, when present, on every `Update`.
pub struct MpmPlugin {
    pub steps_per_update: usize,
}

impl Default for MpmPlugin {
    fn default() -> Self {
        Self { steps_per_update: 1 }
    }
}

impl Plugin for MpmPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(StepsPerUpdate(self.steps_per_update))
            .add_systems(Update, advance_simulation);
    }
}

pub fn advance_simulation(simulation: Option<ResMut<Simulation>>, steps: Res<StepsPerUpdate>) {
    if let Some(mut simulation) = simulation {
        simulation.advance(steps.0);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::{MaterialPoint, SolidState};
    use crate::materials::LinearElastic;
    use crate::math::Vector;
    use crate::setup::{MeshSpec, ScenarioModel};

    fn simulation(nsteps: u64) -> Simulation {
        let model = ScenarioModel::new(MeshSpec::new(Vector::ZERO, 1.0, 2, 2))
            .with_material(Arc::new(LinearElastic::new(1.0e6, 0.3).unwrap()))
            .with_points([MaterialPoint::solid(
                0,
                Vector::new(1.0, 1.5),
                0.25,
                0.3,
                SolidState::new(0, 2000.0),
            )]);
        let config = AnalysisConfig::new(1.0e-3, nsteps).with_threads(1);
        Simulation::initialize(config, Collaborators::new(model)).unwrap()
    }

    #[test]
    fn plugin_steps_until_finished() {
        let mut app = App::new();
        app.add_plugins(MpmPlugin { steps_per_update: 2 })
            .insert_resource(simulation(3));

        app.update();
        let sim = app.world().resource::<Simulation>();
        assert_eq!(sim.last_report().map(|r| r.step), Some(1));
        assert!(sim.is_running());

        app.update();
        app.update();
        let sim = app.world().resource::<Simulation>();
        assert_eq!(sim.status(), &SimulationStatus::Finished);
        assert_eq!(sim.orchestrator().context().steps().current(), 3);
    }

    #[test]
    fn plugin_without_simulation_is_inert() {
        let mut app = App::new();
        app.add_plugins(MpmPlugin::default());
        app.update();
        assert!(app.world().get_resource::<Simulation>().is_none());
    }
}
