//! Procedural terrain
//!
//! A square height map with a circular ridge around its centre, turned into a
//! grid mesh with per-vertex normals.

use crate::foundation::math::Vec3;
use crate::render::mesh::{Model, Vertex};

/// Height map edge length in samples
pub const MAP_SIZE: usize = 32;

/// Heights in `0..=1`, row-major, `MAP_SIZE * MAP_SIZE` samples
#[allow(clippy::approx_constant)]
pub fn generate_heightmap() -> Vec<f32> {
    let half = (MAP_SIZE / 2) as f32;
    let mut heights = Vec::with_capacity(MAP_SIZE * MAP_SIZE);
    for y in 0..MAP_SIZE {
        for x in 0..MAP_SIZE {
            let xc = (x as f32 - half) / half;
            let yc = (y as f32 - half) / half;
            let r = xc.hypot(yc);
            // Capped just short of pi so the outer plain keeps a faint slope
            heights.push((r * 6.0).min(3.14).sin().max(0.0));
        }
    }
    heights
}

/// Slope along one axis: central difference inside, doubled one-sided
/// difference on the borders
fn slope(before: Option<f32>, here: f32, after: Option<f32>) -> f32 {
    match (before, after) {
        (Some(before), Some(after)) => after - before,
        (None, Some(after)) => (after - here) * 2.0,
        (Some(before), None) => (here - before) * 2.0,
        (None, None) => 0.0,
    }
}

/// One vertex per height sample
///
/// Positions span `-0.5..0.5` in x and z with the height as y.
pub fn make_vertices(heights: &[f32]) -> Vec<Vertex> {
    let at = |x: usize, y: usize| heights[y * MAP_SIZE + x];
    let size = MAP_SIZE as f32;
    let last = MAP_SIZE - 1;

    let mut vertices = Vec::with_capacity(MAP_SIZE * MAP_SIZE);
    for y in 0..MAP_SIZE {
        for x in 0..MAP_SIZE {
            let height = at(x, y);
            let dx = slope(
                x.checked_sub(1).map(|xb| at(xb, y)),
                height,
                (x < last).then(|| at(x + 1, y)),
            );
            let dy = slope(
                y.checked_sub(1).map(|yb| at(x, yb)),
                height,
                (y < last).then(|| at(x, y + 1)),
            );
            let normal = Vec3::new(2.0 * dx, -4.0, 2.0 * dy).normalize();

            vertices.push(Vertex {
                position: [x as f32 / size - 0.5, height, y as f32 / size - 0.5],
                normal: [normal.x, normal.y, normal.z],
                tex_coord: [x as f32 / size, y as f32 / size],
            });
        }
    }
    vertices
}

/// Two triangles per grid cell: `[i, i+1, i+w, i+1, i+1+w, i+w]`
pub fn make_indices() -> Vec<u32> {
    let width = MAP_SIZE as u32;
    let cells = MAP_SIZE - 1;
    let mut indices = Vec::with_capacity(cells * cells * 6);
    for y in 0..cells as u32 {
        for x in 0..cells as u32 {
            let i = y * width + x;
            indices.extend_from_slice(&[i, i + 1, i + width, i + 1, i + 1 + width, i + width]);
        }
    }
    indices
}

/// The complete terrain mesh
pub fn make_terrain_model() -> Model {
    let heights = generate_heightmap();
    Model {
        vertices: make_vertices(&heights),
        indices: make_indices(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_terrain_counts() {
        let model = make_terrain_model();
        assert_eq!(model.vertices.len(), 1024);
        assert_eq!(model.indices.len(), 5766);
        assert!(model.indices.iter().all(|&i| (i as usize) < model.vertices.len()));
    }

    #[test]
    fn test_quad_index_pattern() {
        let indices = make_indices();
        assert_eq!(&indices[..6], &[0, 1, 32, 1, 33, 32]);

        // Cell (x=3, y=2)
        let cell = 2 * 31 + 3;
        let i = 2 * 32 + 3;
        assert_eq!(&indices[cell * 6..cell * 6 + 6], &[i, i + 1, i + 32, i + 1, i + 33, i + 32]);
    }

    #[test]
    fn test_heights_bounded_and_flat_outside_ridge() {
        let heights = generate_heightmap();
        assert!(heights.iter().all(|&h| (0.0..=1.0).contains(&h)));
        // Centre sample and corners
        assert_relative_eq!(heights[16 * MAP_SIZE + 16], 0.0);
        assert_relative_eq!(heights[0], 0.0, epsilon = 1e-2);
    }

    #[test]
    fn test_ridge_peak_height() {
        let heights = generate_heightmap();
        // r = 4/16 puts r * 6 = 1.5, close to the sine peak
        assert_relative_eq!(heights[16 * MAP_SIZE + 20], 1.5f32.sin(), epsilon = 1e-6);
    }

    #[test]
    fn test_vertex_positions_and_tex_coords() {
        let model = make_terrain_model();
        let corner = model.vertices[0];
        assert_relative_eq!(corner.position[0], -0.5);
        assert_relative_eq!(corner.position[2], -0.5);
        assert_eq!(corner.tex_coord, [0.0, 0.0]);

        let v = model.vertices[5 * MAP_SIZE + 7];
        assert_relative_eq!(v.position[0], 7.0 / 32.0 - 0.5);
        assert_relative_eq!(v.position[2], 5.0 / 32.0 - 0.5);
        assert_relative_eq!(v.tex_coord[0], 7.0 / 32.0);
        assert_relative_eq!(v.tex_coord[1], 5.0 / 32.0);
    }

    #[test]
    fn test_normals_are_unit_and_point_down_y() {
        let model = make_terrain_model();
        for vertex in &model.vertices {
            let n = Vec3::from(vertex.normal);
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-5);
            assert!(n.y < 0.0);
        }
    }

    #[test]
    fn test_flat_heights_give_straight_normals() {
        let heights = vec![0.3; MAP_SIZE * MAP_SIZE];
        let vertices = make_vertices(&heights);
        for vertex in [vertices[0], vertices[MAP_SIZE * MAP_SIZE - 1], vertices[100]] {
            assert_relative_eq!(vertex.normal[0], 0.0);
            assert_relative_eq!(vertex.normal[1], -1.0);
            assert_relative_eq!(vertex.normal[2], 0.0);
        }
    }

    #[test]
    fn test_border_slope_is_doubled_one_sided() {
        assert_relative_eq!(slope(None, 1.0, Some(1.5)), 1.0);
        assert_relative_eq!(slope(Some(1.0), 1.5, None), 1.0);
        assert_relative_eq!(slope(Some(1.0), 5.0, Some(2.0)), 1.0);
    }
}
