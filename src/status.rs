//! Particle status codes written to event records
use crate::particle::ParticleNode;

/// Final-state particle
pub const STABLE: i32 = 1;
/// Particle decayed by the generator, its mass should be preserved
pub const DECAYED: i32 = 2;

/// Status code of a node in a generated decay
pub fn of(node: &ParticleNode) -> i32 {
    if node.is_stable() {
        STABLE
    } else {
        DECAYED
    }
}
