use ultraviolet::{Vec2, Vec3, Vec4};

fn accumulate(direction: Vec3) -> Option<Vec3> {
    let length = direction.mag();
    (length > 0.0 && length.is_finite()).then(|| direction / length)
}

/// Computes a tangent per vertex from the UV gradients of the triangles using it.
///
/// The result has the unit tangent in xyz and the handedness in w.
/// Vertices without a usable triangle get a zero vector and a handedness of 0.
pub fn compute_tangents(
    indices: &[u32],
    positions: &[Vec3],
    normals: &[Vec3],
    texcoords: &[Vec2],
) -> Vec<Vec4> {
    let vertex_count = positions.len();
    let mut tangents = vec![Vec3::zero(); vertex_count];
    let mut bitangents = vec![Vec3::zero(); vertex_count];

    for triangle in indices.chunks_exact(3) {
        let [a, b, c] = [triangle[0] as usize, triangle[1] as usize, triangle[2] as usize];
        if a >= vertex_count || b >= vertex_count || c >= vertex_count {
            continue;
        }
        let (Some(t0), Some(t1), Some(t2)) = (texcoords.get(a), texcoords.get(b), texcoords.get(c))
        else {
            continue;
        };

        let d_p_ds = positions[b] - positions[a];
        let d_p_dt = positions[c] - positions[a];
        let d_t_ds = *t1 - *t0;
        let d_t_dt = *t2 - *t0;

        let r = 1.0 / (d_t_ds.x * d_t_dt.y - d_t_ds.y * d_t_dt.x);
        let tangent = (d_p_ds * d_t_dt.y - d_p_dt * d_t_ds.y) * r;
        let bitangent = (d_p_dt * d_t_ds.x - d_p_ds * d_t_dt.x) * r;

        if let (Some(tangent), Some(bitangent)) = (accumulate(tangent), accumulate(bitangent)) {
            for vertex in [a, b, c] {
                tangents[vertex] += tangent;
                bitangents[vertex] += bitangent;
            }
        }
    }

    tangents
        .into_iter()
        .zip(bitangents)
        .enumerate()
        .map(|(vertex, (tangent, bitangent))| {
            match (accumulate(tangent), accumulate(bitangent)) {
                (Some(tangent), Some(bitangent)) => {
                    let normal = normals.get(vertex).copied().unwrap_or_else(Vec3::zero);
                    let sign = if normal.cross(tangent).dot(bitangent) > 0.0 {
                        -1.0
                    } else {
                        1.0
                    };
                    Vec4::new(tangent.x, tangent.y, tangent.z, sign)
                }
                _ => Vec4::new(tangent.x, tangent.y, tangent.z, 0.0),
            }
        })
        .collect()
}
