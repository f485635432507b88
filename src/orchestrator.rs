//! Explicit two-phase time stepping.
//!
//! [`TimeStepOrchestrator`] owns the state of one rank and advances it one
//! step at a time. Every step runs the same fixed sequence:
//!
//! 1. periodic redecomposition
//! 2. node reset and activation, concurrently with shape functions
//! 3. mass and momentum to nodes
//! 4. halo reduction of mass and momentum
//! 5. nodal velocities and velocity constraints
//! 6. stress update (USF)
//! 7. external forces, concurrently with internal and drag forces
//! 8. halo reduction of the forces
//! 9. nodal acceleration and velocity, damping and constraints
//! 10. point velocities and positions
//! 11. point velocity constraints
//! 12. stress update (USL)
//! 13. relocation
//! 14. migration
//! 15. output
//!
//! [`solve`] wraps initialisation and the step loop and reports success as a
//! boolean.

use std::sync::Arc;
use std::thread;

use bevy::log::{debug, error, info, warn};

use crate::config::{AnalysisConfig, StressUpdate};
use crate::core::{
    Grid, MaterialPoint, NodeFields, ParticleSet, Phase, compute_shape_functions, reset_and_activate,
};
use crate::error::{CheckpointError, InitError, InitStage, MpmError, MpmResult};
use crate::io::{CheckpointStore, CheckpointWriter, OutputFrame, ResultWriter};
use crate::materials::MaterialTable;
use crate::parallel::{
    BlockPartitioner, Communicator, DecompositionSummary, DomainDecomposer, GraphPartitioner,
    HaloExchange, NodeQuantity, Packet, SingleRank, TaskBatch, TaskScheduler, ThreadGroup, any_rank,
};
use crate::setup::ModelLoader;
use crate::solver::{
    LoadSet, StressStrainUpdate, apply_nodal_forces, apply_particle_constraints,
    apply_velocity_constraints, compute_acceleration_velocity, compute_velocity, map_body_force,
    map_drag, map_internal_force, map_mass_momentum, map_tractions, relocate, update_kinematics,
};

/// Position in the step loop. Persisted through checkpoints.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepCounter {
    current: u64,
    total: u64,
}

impl StepCounter {
    pub fn new(total: u64) -> Self {
        Self { current: 0, total }
    }

    /// Index of the next step to run.
    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn remaining(&self) -> u64 {
        self.total.saturating_sub(self.current)
    }

    pub fn is_finished(&self) -> bool {
        self.current >= self.total
    }

    fn advance(&mut self) {
        self.current += 1;
    }

    fn resume_after(&mut self, step: u64) {
        self.current = step + 1;
    }
}

/// Run-wide settings shared by every stage.
#[derive(Clone, Debug)]
pub struct SimulationContext {
    config: AnalysisConfig,
    steps: StepCounter,
    rank: usize,
    ranks: usize,
}

impl SimulationContext {
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn steps(&self) -> StepCounter {
        self.steps
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn ranks(&self) -> usize {
        self.ranks
    }

    pub fn is_distributed(&self) -> bool {
        self.ranks > 1
    }
}

/// External services the stepper is wired to.
pub struct Collaborators {
    model: Box<dyn ModelLoader>,
    communicator: Arc<dyn Communicator>,
    partitioner: Box<dyn GraphPartitioner>,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    writers: Vec<Box<dyn ResultWriter>>,
}

impl Collaborators {
    /// Single rank, block partitioning, no output.
    pub fn new(model: impl ModelLoader + 'static) -> Self {
        Self {
            model: Box::new(model),
            communicator: Arc::new(SingleRank),
            partitioner: Box::new(BlockPartitioner),
            checkpoints: None,
            writers: Vec::new(),
        }
    }

    pub fn with_communicator(mut self, communicator: Arc<dyn Communicator>) -> Self {
        self.communicator = communicator;
        self
    }

    pub fn with_partitioner(mut self, partitioner: impl GraphPartitioner + 'static) -> Self {
        self.partitioner = Box::new(partitioner);
        self
    }

    /// Resume source; also receives a checkpoint at every output step.
    pub fn with_checkpoint_store(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.writers.push(Box::new(CheckpointWriter::new(Arc::clone(&store))));
        self.checkpoints = Some(store);
        self
    }

    pub fn with_writer(mut self, writer: impl ResultWriter + 'static) -> Self {
        self.writers.push(Box::new(writer));
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepReport {
    pub step: u64,
    /// Points owned after the step.
    pub points: usize,
    pub rebalanced: bool,
    pub dropped: usize,
    pub migrated_out: usize,
    pub migrated_in: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rank: usize,
    pub steps_run: u64,
    /// Step counter after the last step.
    pub final_step: u64,
    pub points: usize,
    pub dropped: usize,
    /// Points received from other ranks.
    pub migrated_in: usize,
}

struct LoadedModel {
    materials: MaterialTable,
    grid: Grid,
    points: Vec<MaterialPoint>,
    loads: LoadSet,
}

fn at(stage: InitStage) -> impl FnOnce(InitError) -> MpmError {
    move |source| MpmError::Init { stage, source }
}

fn load_model(model: &mut dyn ModelLoader) -> MpmResult<LoadedModel> {
    let materials = model.materials().map_err(at(InitStage::Materials))?;
    let grid = model.mesh().map_err(at(InitStage::Mesh))?;
    let points = model.particles(&grid).map_err(at(InitStage::Particles))?;
    for solid in points.iter().filter_map(|p| p.solid_state()) {
        materials.check(solid.material).map_err(at(InitStage::Particles))?;
    }
    let loads = model.loads(&grid).map_err(at(InitStage::Loads))?;
    Ok(LoadedModel {
        materials,
        grid,
        points,
        loads,
    })
}

/// Collective. A local success becomes [`MpmError::RemoteAbort`] when any
/// other rank failed.
fn agree<T>(comm: &dyn Communicator, outcome: MpmResult<T>) -> MpmResult<T> {
    let failed_somewhere = any_rank(comm, outcome.is_err())?;
    match outcome {
        Ok(_) if failed_somewhere => Err(MpmError::RemoteAbort),
        other => other,
    }
}

pub struct TimeStepOrchestrator {
    context: SimulationContext,
    grid: Grid,
    particles: ParticleSet,
    materials: MaterialTable,
    loads: LoadSet,
    communicator: Arc<dyn Communicator>,
    halo: HaloExchange,
    decomposer: DomainDecomposer,
    scheduler: TaskScheduler,
    writers: Vec<Box<dyn ResultWriter>>,
}

impl TimeStepOrchestrator {
    /// Load the model, then either decompose it from scratch or restore the
    /// checkpointed points and continue after the checkpointed step.
    ///
    /// Collective: a failure on one rank fails every rank.
    pub fn initialize(config: AnalysisConfig, collaborators: Collaborators) -> MpmResult<Self> {
        config.validate()?;
        let Collaborators {
            mut model,
            communicator,
            partitioner,
            checkpoints,
            writers,
        } = collaborators;
        let (rank, ranks) = (communicator.rank(), communicator.size());

        let LoadedModel {
            materials,
            grid,
            points,
            loads,
        } = agree(communicator.as_ref(), load_model(model.as_mut()))?;
        info!(
            "rank {rank}/{ranks}: loaded {} materials, {} cells, {} points",
            materials.len(),
            grid.geometry().cell_count(),
            points.len()
        );

        let steps = StepCounter::new(config.nsteps);
        let threads = config.threads;
        let resume = config.resume;
        let mut orchestrator = Self {
            context: SimulationContext {
                config,
                steps,
                rank,
                ranks,
            },
            grid,
            particles: ParticleSet::from_points(points),
            materials,
            loads,
            halo: HaloExchange::new(Arc::clone(&communicator)),
            decomposer: DomainDecomposer::new(Arc::clone(&communicator), partitioner),
            scheduler: TaskScheduler::new(threads, rank),
            communicator,
            writers,
        };
        debug!("rank {rank}: task pool with {} threads", orchestrator.scheduler.thread_num());

        if resume {
            orchestrator.restore(checkpoints.as_deref())?;
        } else {
            orchestrator.decomposer.redecompose(
                true,
                &mut orchestrator.grid,
                &mut orchestrator.particles,
                &mut orchestrator.halo,
            )?;
        }
        Ok(orchestrator)
    }

    fn restore(&mut self, store: Option<&dyn CheckpointStore>) -> MpmResult<DecompositionSummary> {
        let rank = self.context.rank;
        let loaded = store
            .ok_or(CheckpointError::NoStore)
            .and_then(|store| store.load(rank, self.context.config.resume_step))
            .map_err(MpmError::from);
        let checkpoint = agree(self.communicator.as_ref(), loaded)?;

        if self.context.is_distributed() {
            let steps = self
                .communicator
                .all_gather(Packet::Counts(vec![checkpoint.step]))?
                .into_iter()
                .map(|packet| match packet {
                    Packet::Counts(counts) => Ok(counts.first().copied().unwrap_or_default()),
                    _ => Err(MpmError::Communication("expected a step count".to_string())),
                })
                .collect::<MpmResult<Vec<u64>>>()?;
            if steps.iter().any(|&step| step != checkpoint.step) {
                return Err(MpmError::InvalidState(format!(
                    "ranks resumed from different steps: {steps:?}"
                )));
            }
        }

        info!(
            "rank {rank}: resuming after step {} with {} points",
            checkpoint.step,
            checkpoint.points.len()
        );
        self.particles = ParticleSet::from_points(checkpoint.points);
        self.context.steps.resume_after(checkpoint.step);
        self.decomposer
            .redecompose(false, &mut self.grid, &mut self.particles, &mut self.halo)
    }

    pub fn context(&self) -> &SimulationContext {
        &self.context
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn particles(&self) -> &ParticleSet {
        &self.particles
    }

    pub fn materials(&self) -> &MaterialTable {
        &self.materials
    }

    pub fn is_finished(&self) -> bool {
        self.context.steps.is_finished()
    }

    /// Advance by one step.
    pub fn step(&mut self) -> MpmResult<StepReport> {
        if self.is_finished() {
            return Err(MpmError::InvalidState(format!(
                "all {} steps have already run",
                self.context.steps.total()
            )));
        }
        let step = self.context.steps.current();
        let mut report = StepReport {
            step,
            ..Default::default()
        };

        if self.context.config.is_rebalance_step(step) {
            let summary =
                self.decomposer
                    .redecompose(false, &mut self.grid, &mut self.particles, &mut self.halo)?;
            report.rebalanced = true;
            report.migrated_out += summary.migrated_out;
            report.migrated_in += summary.migrated_in;
        }

        self.prepare_grid()?;
        self.map_mass_momentum()?;

        {
            let nodes = self.grid.nodes_mut();
            compute_velocity(nodes);
            apply_velocity_constraints(nodes, &self.loads.nodal_velocity_constraints, false);
        }

        if self.context.config.stress_update == StressUpdate::Usf {
            self.update_stress()?;
        }

        self.map_forces()?;

        {
            let config = &self.context.config;
            let nodes = self.grid.nodes_mut();
            compute_acceleration_velocity(nodes, config.dt, config.damping);
            apply_velocity_constraints(nodes, &self.loads.nodal_velocity_constraints, true);
        }

        self.update_points();

        if self.context.config.stress_update == StressUpdate::Usl {
            self.update_stress()?;
        }

        let dropped = relocate(
            &mut self.particles,
            self.grid.geometry(),
            self.context.config.particle_out_of_domain,
        );
        report.dropped = agree(self.communicator.as_ref(), dropped)?;

        let (out, incoming) = self
            .decomposer
            .transfer_migrated(self.grid.geometry(), &mut self.particles)?;
        report.migrated_out += out;
        report.migrated_in += incoming;

        self.write_results(step);

        self.context.steps.advance();
        report.points = self.particles.len();
        debug!(
            "rank {}: step {step} done, {} points",
            self.context.rank, report.points
        );
        Ok(report)
    }

    /// Run the remaining steps.
    pub fn run(&mut self) -> MpmResult<RunSummary> {
        let first = self.context.steps.current();
        let (mut dropped, mut migrated_in) = (0, 0);
        while !self.is_finished() {
            let report = self.step()?;
            dropped += report.dropped;
            migrated_in += report.migrated_in;
        }
        let summary = RunSummary {
            rank: self.context.rank,
            steps_run: self.context.steps.current() - first,
            final_step: self.context.steps.current(),
            points: self.particles.len(),
            dropped,
            migrated_in,
        };
        info!(
            "rank {}: ran {} steps, {} points remain",
            summary.rank, summary.steps_run, summary.points
        );
        Ok(summary)
    }

    fn prepare_grid(&mut self) -> MpmResult<()> {
        let occupied = self.particles.occupied_cells();
        self.halo.reset_ledger();
        let (geometry, nodes) = self.grid.split_mut();
        let (points, cache) = self.particles.points_and_cache_mut();
        let reset: TaskBatch = Box::new(move || {
            reset_and_activate(geometry, nodes, occupied);
            Ok(())
        });
        let shapes: TaskBatch = Box::new(move || {
            compute_shape_functions(geometry, points, cache);
            Ok(())
        });
        let handle = self.scheduler.run_concurrently(vec![reset, shapes]);
        self.scheduler.join(handle)
    }

    fn map_mass_momentum(&mut self) -> MpmResult<()> {
        let nodes = self.grid.nodes_mut();
        let (points, cache) = self.particles.points_and_cache();
        map_mass_momentum(points, cache, nodes);
        for phase in Phase::ALL {
            self.halo.sync_quantity(nodes, NodeQuantity::Mass(phase))?;
            self.halo.sync_quantity(nodes, NodeQuantity::Momentum(phase))?;
        }
        Ok(())
    }

    fn map_forces(&mut self) -> MpmResult<()> {
        let gravity = self.context.config.gravity;
        let rank = self.context.rank;
        let loads = &self.loads;
        let (geometry, nodes) = self.grid.split_mut();
        let NodeFields {
            external_force,
            internal_force,
            drag_coefficient,
            ..
        } = nodes;
        let (points, cache) = self.particles.points_and_cache();

        let external: TaskBatch = Box::new(move || {
            map_body_force(points, cache, gravity, external_force);
            map_tractions(points, cache, &loads.tractions, external_force);
            apply_nodal_forces(geometry, &loads.nodal_forces, rank, external_force);
            Ok(())
        });
        let internal: TaskBatch = Box::new(move || {
            map_internal_force(points, cache, internal_force);
            map_drag(points, cache, drag_coefficient);
            Ok(())
        });
        let handle = self.scheduler.run_concurrently(vec![external, internal]);
        self.scheduler.join(handle)?;

        let nodes = self.grid.nodes_mut();
        for phase in Phase::ALL {
            self.halo.sync_quantity(nodes, NodeQuantity::ExternalForce(phase))?;
            self.halo.sync_quantity(nodes, NodeQuantity::InternalForce(phase))?;
        }
        self.halo.sync_quantity(nodes, NodeQuantity::DragCoefficient)
    }

    fn update_points(&mut self) {
        let config = &self.context.config;
        let (points, cache) = self.particles.points_mut_and_cache();
        update_kinematics(points, cache, self.grid.nodes(), config.dt, config.velocity_update);
        apply_particle_constraints(points, &self.loads.particle_velocity_constraints);
    }

    fn update_stress(&mut self) -> MpmResult<()> {
        let config = &self.context.config;
        StressStrainUpdate {
            dt: config.dt,
            materials: &self.materials,
            pressure_smoothing: config.pressure_smoothing,
            pore_pressure_smoothing: config.pore_pressure_smoothing,
        }
        .run(&mut self.grid, &mut self.particles, &mut self.halo)
    }

    /// Writer failures are logged and never stop the run.
    fn write_results(&mut self, step: u64) {
        if self.writers.is_empty() || !self.context.config.is_output_step(step) {
            return;
        }
        let frame = OutputFrame {
            step,
            max_steps: self.context.steps.total(),
            rank: self.context.rank,
            grid: &self.grid,
            points: self.particles.points(),
        };
        for writer in &mut self.writers {
            if let Err(err) = writer.write(&frame) {
                warn!(
                    "rank {}: {} output failed at step {step}: {err}",
                    frame.rank,
                    writer.name()
                );
            }
        }
    }
}

/// Initialise and run to completion. Failures are logged; the return value
/// only says whether the analysis finished.
pub fn solve(config: AnalysisConfig, collaborators: Collaborators) -> bool {
    match TimeStepOrchestrator::initialize(config, collaborators).and_then(|mut o| o.run()) {
        Ok(summary) => {
            info!(
                "analysis finished at step {} with {} points",
                summary.final_step, summary.points
            );
            true
        }
        Err(err) => {
            error!("analysis failed: {err}");
            false
        }
    }
}

/// Final state of one rank of [`run_partitioned`].
#[derive(Clone, Debug)]
pub struct RankOutcome {
    pub summary: RunSummary,
    pub points: Vec<MaterialPoint>,
}

/// Run `ranks` partitions on threads of this process, one orchestrator per
/// thread, connected through a [`ThreadGroup`]. `factory` builds the
/// collaborators of each rank; their communicator is replaced.
pub fn run_partitioned<F>(ranks: usize, config: &AnalysisConfig, factory: F) -> Vec<MpmResult<RankOutcome>>
where
    F: Fn(usize) -> Collaborators + Sync,
{
    let factory = &factory;
    thread::scope(|scope| {
        let handles: Vec<_> = ThreadGroup::communicators(ranks)
            .into_iter()
            .enumerate()
            .map(|(rank, comm)| {
                let config = config.clone();
                scope.spawn(move || -> MpmResult<RankOutcome> {
                    let collaborators = factory(rank).with_communicator(Arc::new(comm));
                    let mut orchestrator = TimeStepOrchestrator::initialize(config, collaborators)?;
                    let summary = orchestrator.run()?;
                    Ok(RankOutcome {
                        summary,
                        points: orchestrator.particles.points().to_vec(),
                    })
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|_| Err(MpmError::Communication("rank thread panicked".to_string())))
            })
            .collect()
    })
}
