use glam::Mat4;

/// One TLAS instance: which bottom-level structure it references, where it
/// sits in the world, and the InstanceID the shaders see. The hit-group
/// contribution is not stored here; it comes from the table layout so the
/// instance buffer and the shader table cannot drift apart.
#[derive(Debug, Clone, Copy)]
pub struct InstanceRecord {
    pub instance_id: u32,
    pub transform: Mat4,
    pub blas_index: usize,
}

/// The 3x4 object-to-world matrix exactly as the instance desc stores it.
///
/// `transposed` writes the logical matrix rows, which puts the translation in
/// the fourth column where the hardware reads it. The non-transposed form
/// copies column-major storage straight through and only round-trips for
/// symmetric matrices; the first instance of the classic tutorial scene is
/// written that way with an identity transform, and that asymmetry is kept.
pub fn instance_transform_rows(transform: &Mat4, transposed: bool) -> [f32; 12] {
    let rows = if transposed {
        [transform.row(0), transform.row(1), transform.row(2)]
    } else {
        [transform.col(0), transform.col(1), transform.col(2)]
    };

    let mut out = [0.0; 12];
    for (i, row) in rows.iter().enumerate() {
        out[i * 4..(i + 1) * 4].copy_from_slice(&row.to_array());
    }

    out
}

#[test]
fn test_identity_rows() {
    let rows = instance_transform_rows(&Mat4::IDENTITY, false);
    assert_eq!(rows, [1., 0., 0., 0., 0., 1., 0., 0., 0., 0., 1., 0.]);

    // Identity is symmetric, both forms agree.
    assert_eq!(rows, instance_transform_rows(&Mat4::IDENTITY, true));
}

#[test]
fn test_translation_lands_in_fourth_column() {
    let transform = Mat4::from_translation(glam::vec3(-2.0, 0.0, 0.0)) * Mat4::from_rotation_y(0.0);
    let rows = instance_transform_rows(&transform, true);

    assert_eq!(rows, [1., 0., 0., -2., 0., 1., 0., 0., 0., 0., 1., 0.]);
}

#[test]
fn test_rotation_rows() {
    let angle = std::f32::consts::FRAC_PI_2;
    let transform = Mat4::from_translation(glam::vec3(2.0, 0.0, 0.0)) * Mat4::from_rotation_y(angle);
    let rows = instance_transform_rows(&transform, true);

    // Row-major [R|t] with R = rot_y(90 deg).
    let expected = [0., 0., 1., 2., 0., 1., 0., 0., -1., 0., 0., 0.];
    for (value, expected) in rows.iter().zip(expected.iter()) {
        assert!((value - expected).abs() < 1e-6);
    }
}
