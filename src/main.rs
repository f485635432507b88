// Headless saturated column settling under gravity.
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use bevy::app::TaskPoolPlugin;
use bevy::log::{LogPlugin, error, info};
use bevy::prelude::*;
use mpm2p::error::InitError;
use mpm2p::io::ParticleCsvWriter;
use mpm2p::math::{Real, Vector};
use mpm2p::solver::{Axis, LoadSet, NodalVelocityConstraint};
use mpm2p::{
    AnalysisConfig, Collaborators, Damping, FluidParams, LinearElastic, MeshSpec, MpmPlugin, Phase,
    ScenarioModel, Simulation, SimulationStatus,
};
use rand::Rng;

const CELL_SIZE: Real = 0.25;
const CELLS_X: usize = 4;
const CELLS_Y: usize = 16;
const FILL_ROWS: usize = 12;
const POINTS_PER_SIDE: usize = 2;

fn column_model() -> Result<ScenarioModel, InitError> {
    let mesh = MeshSpec::new(Vector::ZERO, CELL_SIZE, CELLS_X, CELLS_Y);
    let mut loads = LoadSet::new().fix_nodes(mesh.bottom_nodes());
    for node in mesh.side_nodes() {
        for phase in Phase::ALL {
            loads = loads.with_nodal_constraint(NodalVelocityConstraint {
                node,
                phase,
                axis: Axis::X,
                velocity: 0.0,
            });
        }
    }

    let mut model = ScenarioModel::new(mesh)
        .with_material(Arc::new(LinearElastic::new(1.0e7, 0.3)?))
        .with_loads(loads)
        .saturated_column(FILL_ROWS, POINTS_PER_SIDE, 0.4, 2650.0, &FluidParams::water());

    // break the lattice symmetry a little
    let jitter = 0.05 * CELL_SIZE / POINTS_PER_SIDE as Real;
    let mut rng = rand::rng();
    for point in &mut model.points {
        point.position += Vector::new(
            rng.random_range(-jitter..jitter),
            rng.random_range(-jitter..jitter),
        );
    }
    Ok(model)
}

fn main() -> ExitCode {
    let mut app = App::new();
    app.add_plugins((
        TaskPoolPlugin::default(),
        LogPlugin::default(),
        MpmPlugin { steps_per_update: 100 },
    ));

    let config = match std::env::args().nth(1) {
        Some(path) => match AnalysisConfig::from_path(Path::new(&path)) {
            Ok(config) => config,
            Err(err) => {
                error!("cannot read analysis config {path}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => AnalysisConfig::new(1.0e-4, 2000)
            .with_output_steps(500)
            .with_damping(Damping::Cundall { damping_factor: 0.05 }),
    };

    let model = match column_model() {
        Ok(model) => model,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    let collaborators = Collaborators::new(model).with_writer(ParticleCsvWriter::new("output"));
    let simulation = match Simulation::initialize(config, collaborators) {
        Ok(simulation) => simulation,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };
    app.insert_resource(simulation);
    app.finish();
    app.cleanup();

    loop {
        app.update();
        let simulation = app.world().resource::<Simulation>();
        match simulation.status() {
            SimulationStatus::Running => {}
            SimulationStatus::Finished => {
                info!(
                    "{} points written to ./output",
                    simulation.orchestrator().particles().len()
                );
                return ExitCode::SUCCESS;
            }
            SimulationStatus::Failed(_) => return ExitCode::FAILURE,
        }
    }
}
