//! Math utilities and types
//!
//! Thin aliases over nalgebra so vertex formats, the camera and push-constant
//! payloads all agree on `f32` column-major types.

pub use nalgebra::{Vector2, Vector3, Matrix4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Flatten a matrix into the column-major array layout GLSL expects for `mat4`
pub fn to_column_major(matrix: &Mat4) -> [[f32; 4]; 4] {
    let mut columns = [[0.0; 4]; 4];
    for (c, column) in columns.iter_mut().enumerate() {
        for (r, value) in column.iter_mut().enumerate() {
            *value = matrix[(r, c)];
        }
    }
    columns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_major_layout() {
        let mut m = Mat4::identity();
        m[(0, 3)] = 5.0; // translation x lives in the last column
        let cols = to_column_major(&m);
        assert_eq!(cols[3][0], 5.0);
        assert_eq!(cols[0][3], 0.0);
        assert_eq!(cols[1][1], 1.0);
    }
}
