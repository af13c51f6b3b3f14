//! Orbit camera and push-constant payloads
//!
//! The projection is hand-built rather than a perspective matrix: y is flipped
//! for Vulkan's downward y axis and depth is squashed into `0..1` by scaling
//! and pushing the scene back one unit.

use bytemuck::{Pod, Zeroable};
use crate::foundation::math::{to_column_major, Mat4, Point3, Vec3};

/// Seconds a particle flies before the fountain restarts
pub const PARTICLE_PERIOD: f64 = 3.0;

/// Fixed projection matrix
pub fn projection() -> Mat4 {
    let mut projection = Mat4::identity();
    projection[(1, 1)] = -1.0;
    projection[(2, 2)] = 0.1;
    projection[(2, 3)] = 1.0;
    projection
}

/// View circling the terrain below it, looking up at the centre
pub fn orbit_view(time: f64) -> Mat4 {
    let eye = Point3::new((2.0 * time.cos()) as f32, -2.0, (2.0 * time.sin()) as f32);
    let target = Point3::new(0.0, 0.2, 0.0);
    Mat4::look_at_rh(&eye, &target, &Vec3::y())
}

/// Combined projection * view at `time` seconds since start
pub fn view_projection(time: f64) -> Mat4 {
    projection() * orbit_view(time)
}

/// Terrain push constants: the MVP matrix
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    /// Column-major model-view-projection matrix
    pub mvp: [[f32; 4]; 4],
}

const _: () = assert!(std::mem::size_of::<MeshPushConstants>() == 64);

impl MeshPushConstants {
    /// Payload for `mvp`
    pub fn new(mvp: &Mat4) -> Self {
        Self { mvp: to_column_major(mvp) }
    }
}

/// Particle push constants: the MVP matrix followed by the particle clock
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct ParticlePushConstants {
    /// Column-major model-view-projection matrix
    pub mvp: [[f32; 4]; 4],
    /// Seconds since the current fountain cycle started
    pub time: f32,
}

const _: () = assert!(std::mem::size_of::<ParticlePushConstants>() == 68);

impl ParticlePushConstants {
    /// Payload for `mvp` at `elapsed` seconds since start
    pub fn new(mvp: &Mat4, elapsed: f64) -> Self {
        Self {
            mvp: to_column_major(mvp),
            time: (elapsed % PARTICLE_PERIOD) as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_projection_layout() {
        let cols = to_column_major(&projection());
        assert_eq!(cols[0], [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(cols[1], [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(cols[2], [0.0, 0.0, 0.1, 0.0]);
        // z translation lives in the fourth column
        assert_eq!(cols[3], [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_projection_depth_and_flip() {
        let p = projection().transform_point(&Point3::new(0.5, 0.5, -2.0));
        assert_relative_eq!(p.x, 0.5);
        assert_relative_eq!(p.y, -0.5);
        assert_relative_eq!(p.z, 0.8, epsilon = 1e-6);
    }

    #[test]
    fn test_orbit_view_puts_target_in_front() {
        for &t in &[0.0, 1.0, 2.5] {
            let target = orbit_view(t).transform_point(&Point3::new(0.0, 0.2, 0.0));
            assert_relative_eq!(target.x, 0.0, epsilon = 1e-5);
            assert_relative_eq!(target.y, 0.0, epsilon = 1e-5);
            // Right-handed view space looks down -z
            assert!(target.z < 0.0);
        }
    }

    #[test]
    fn test_orbit_eye_position() {
        let view = orbit_view(0.0);
        let eye = view.try_inverse().unwrap().transform_point(&Point3::origin());
        assert_relative_eq!(eye.coords, Vec3::new(2.0, -2.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_particle_time_wraps() {
        let mvp = Mat4::identity();
        assert_relative_eq!(ParticlePushConstants::new(&mvp, 1.25).time, 1.25);
        assert_relative_eq!(ParticlePushConstants::new(&mvp, 7.5).time, 1.5);
        assert_relative_eq!(ParticlePushConstants::new(&mvp, 3.0).time, 0.0);
    }

    #[test]
    fn test_particle_payload_bytes() {
        let mvp = view_projection(0.7);
        let payload = ParticlePushConstants::new(&mvp, 0.7);
        let bytes = bytemuck::bytes_of(&payload);
        assert_eq!(bytes.len(), 68);
        assert_eq!(&bytes[..64], bytemuck::bytes_of(&MeshPushConstants::new(&mvp)));
        assert_eq!(&bytes[64..], &0.7f32.to_ne_bytes());
    }
}
