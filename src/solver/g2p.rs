//! Grid-to-Particle (G2P) transfer operations
//!
//! Updates point velocities and positions from the nodal solution, applies
//! point-level velocity constraints and re-locates points in the mesh.

use bevy::log::warn;

use crate::config::{OutOfDomainPolicy, VelocityUpdate};
use crate::core::{GridGeometry, MaterialPoint, NodeFields, ParticleSet, Phase, ShapeFunctions};
use crate::error::{MpmError, MpmResult};
use crate::math::{Real, Vector};

use super::loads::ParticleVelocityConstraint;

/// Advance point velocities and positions.
///
/// Positions follow the interpolated nodal velocity of the point's kinematic
/// phase. Afterwards `cell` and the shape functions still describe the start
/// of the step, which is what a stress update later in the same step needs;
/// [`relocate`] resolves the cell again.
pub fn update_kinematics(
    points: &mut [MaterialPoint],
    cache: &[ShapeFunctions],
    nodes: &NodeFields,
    dt: Real,
    mode: VelocityUpdate,
) {
    for (point, sf) in points.iter_mut().zip(cache.iter()) {
        if point.cell.is_none() {
            continue;
        }
        for phase in Phase::ALL {
            let ph = phase.index();
            let Some(velocity) = point.velocity_mut(phase) else {
                continue;
            };
            *velocity = match mode {
                VelocityUpdate::Flip => {
                    *velocity + sf.interpolate(|node| nodes.acceleration[ph][node]) * dt
                }
                VelocityUpdate::Pic => sf.interpolate(|node| nodes.velocity[ph][node]),
            };
        }
        let ph = point.kinematic_phase().index();
        let nodal_velocity: Vector = sf.interpolate(|node| nodes.velocity[ph][node]);
        point.position += nodal_velocity * dt;
    }
}

pub fn apply_particle_constraints(points: &mut [MaterialPoint], constraints: &[ParticleVelocityConstraint]) {
    for constraint in constraints {
        for point in points.iter_mut().filter(|p| constraint.selects(p.id)) {
            if let Some(velocity) = point.velocity_mut(constraint.phase) {
                velocity[constraint.axis.index()] = constraint.velocity;
            }
        }
    }
}

/// Re-locate every point in the mesh.
///
/// Under [`OutOfDomainPolicy::Fail`] the first lost point (lowest id) is an
/// error and the set is left unchanged. Under [`OutOfDomainPolicy::Drop`] lost
/// points are removed; the count is returned.
pub fn relocate(
    particles: &mut ParticleSet,
    geometry: &GridGeometry,
    policy: OutOfDomainPolicy,
) -> MpmResult<usize> {
    for point in particles.points_mut() {
        point.cell = geometry.locate(point.position);
    }
    match policy {
        OutOfDomainPolicy::Fail => {
            match particles.points().iter().find(|p| p.cell.is_none()) {
                Some(lost) => Err(MpmError::ParticleOutsideDomain {
                    id: lost.id,
                    position: lost.position,
                }),
                None => Ok(0),
            }
        }
        OutOfDomainPolicy::Drop => {
            let dropped = particles.extract_where(|p| p.cell.is_none());
            for point in &dropped {
                warn!(
                    "dropping material point {} outside the mesh at ({:.4}, {:.4})",
                    point.id, point.position.x, point.position.y
                );
            }
            Ok(dropped.len())
        }
    }
}
