use crate::config::{Damping, MASS_TOLERANCE};
use crate::core::{NodeFields, Phase};
use crate::math::{Real, Vector, sign_or_zero, zero_vector};

/// Nodal velocity `p / m` of both phases on active nodes.
pub fn compute_velocity(nodes: &mut NodeFields) {
    for node in 0..nodes.len() {
        if !nodes.active[node] {
            continue;
        }
        for ph in 0..2 {
            let mass = nodes.mass[ph][node];
            nodes.velocity[ph][node] = if mass > MASS_TOLERANCE {
                nodes.momentum[ph][node] / mass
            } else {
                zero_vector()
            };
        }
    }
}

/// Local non-viscous damping: oppose each force component by a fraction of
/// its magnitude, signed by the current velocity.
#[inline]
fn damped(unbalanced: Vector, velocity: Vector, damping: Damping) -> Vector {
    match damping {
        Damping::None => unbalanced,
        Damping::Cundall { damping_factor } => {
            unbalanced - unbalanced.abs() * sign_or_zero(velocity) * damping_factor
        }
    }
}

/// Two-phase explicit update on active nodes.
///
/// The liquid equation carries the drag against the relative velocity; the
/// mixture equation then yields the skeleton acceleration once the liquid
/// inertia is removed.
pub fn compute_acceleration_velocity(nodes: &mut NodeFields, dt: Real, damping: Damping) {
    let (s, l) = (Phase::Solid.index(), Phase::Liquid.index());
    for node in 0..nodes.len() {
        if !nodes.active[node] {
            continue;
        }
        let mass_s = nodes.mass[s][node];
        let mass_l = nodes.mass[l][node];
        let velocity_s = nodes.velocity[s][node];
        let velocity_l = nodes.velocity[l][node];

        let acceleration_l = if mass_l > MASS_TOLERANCE {
            let drag = (velocity_l - velocity_s) * nodes.drag_coefficient[node];
            let unbalanced =
                nodes.external_force[l][node] + nodes.internal_force[l][node] - drag;
            damped(unbalanced, velocity_l, damping) / mass_l
        } else {
            zero_vector()
        };

        let acceleration_s = if mass_s > MASS_TOLERANCE {
            let unbalanced = nodes.external_force[s][node] + nodes.internal_force[s][node]
                - acceleration_l * mass_l;
            damped(unbalanced, velocity_s, damping) / mass_s
        } else {
            zero_vector()
        };

        for (ph, acceleration, mass) in [(s, acceleration_s, mass_s), (l, acceleration_l, mass_l)] {
            nodes.acceleration[ph][node] = acceleration;
            nodes.velocity[ph][node] += acceleration * dt;
            nodes.momentum[ph][node] = nodes.velocity[ph][node] * mass;
        }
    }
}
