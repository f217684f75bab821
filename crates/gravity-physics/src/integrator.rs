//! Kick-drift-kick leapfrog with a single force evaluation per substep
//!
//! Both half-kicks use the accelerations evaluated at the start of the substep.
//! The second kick does not wait for forces at the drifted positions.

use glam::Vec2;
use rayon::prelude::*;

/// `v += 0.5 * dt * a`
pub fn half_kick(velocities: &mut [Vec2], accelerations: &[Vec2], delta_time: f32) {
    let half_dt = 0.5 * delta_time;
    velocities
        .par_iter_mut()
        .zip(accelerations)
        .for_each(|(v, &a)| *v += half_dt * a);
}

/// `x += dt * v`
pub fn drift(positions: &mut [Vec2], velocities: &[Vec2], delta_time: f32) {
    positions
        .par_iter_mut()
        .zip(velocities)
        .for_each(|(x, &v)| *x += delta_time * v);
}

pub fn leapfrog_step(positions: &mut [Vec2], velocities: &mut [Vec2], accelerations: &[Vec2], delta_time: f32) {
    half_kick(velocities, accelerations, delta_time);
    drift(positions, velocities, delta_time);
    half_kick(velocities, accelerations, delta_time);
}
