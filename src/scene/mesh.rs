//! Mesh geometry and procedural primitives
//!
//! Meshes are immutable after creation: a vertex array (position, uv,
//! normal, tangent, bitangent) plus a u32 index array. Each unique mesh is
//! registered once in the [`MeshRegistry`] and referenced by id from scene
//! objects; the acceleration structure builder keys its bottom-level
//! structures on the same ids.

use cgmath::{InnerSpace, Vector2, Vector3};

/// Full shading vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub position: Vector3<f32>,
    pub uv: Vector2<f32>,
    pub normal: Vector3<f32>,
    pub tangent: Vector3<f32>,
    pub bitangent: Vector3<f32>,
}

/// Stable reference to a mesh in the [`MeshRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub(crate) u32);

impl MeshId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Immutable triangle mesh.
pub struct Mesh {
    pub name: String,
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
}

impl Mesh {
    /// Builds a mesh from positions, uvs, normals and indices, deriving
    /// tangent frames from the UV layout.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vector3<f32>>,
        uvs: Vec<Vector2<f32>>,
        normals: Vec<Vector3<f32>>,
        indices: Vec<u32>,
    ) -> Self {
        let (tangents, bitangents) = compute_tangents(&positions, &uvs, &normals, &indices);
        let vertices = positions
            .into_iter()
            .zip(uvs)
            .zip(normals)
            .zip(tangents.into_iter().zip(bitangents))
            .map(|(((position, uv), normal), (tangent, bitangent))| Vertex {
                position,
                uv,
                normal,
                tangent,
                bitangent,
            })
            .collect();
        Self {
            name: name.into(),
            vertices,
            indices,
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    pub fn triangle_count(&self) -> u32 {
        (self.indices.len() / 3) as u32
    }

    /// Positions of triangle `i` in mesh space.
    pub fn triangle(&self, i: usize) -> [Vector3<f32>; 3] {
        let i0 = self.indices[i * 3] as usize;
        let i1 = self.indices[i * 3 + 1] as usize;
        let i2 = self.indices[i * 3 + 2] as usize;
        [
            self.vertices[i0].position,
            self.vertices[i1].position,
            self.vertices[i2].position,
        ]
    }
}

/// Owns all meshes for one engine instance.
///
/// Long-lived asset storage: components and acceleration structures hold
/// `MeshId`s, never the mesh data itself.
#[derive(Default)]
pub struct MeshRegistry {
    meshes: Vec<Mesh>,
}

impl MeshRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, mesh: Mesh) -> MeshId {
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(mesh);
        id
    }

    pub fn get(&self, id: MeshId) -> &Mesh {
        &self.meshes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }
}

/// Per-vertex tangent frames averaged over adjacent triangles and
/// orthogonalised against the vertex normal.
fn compute_tangents(
    positions: &[Vector3<f32>],
    uvs: &[Vector2<f32>],
    normals: &[Vector3<f32>],
    indices: &[u32],
) -> (Vec<Vector3<f32>>, Vec<Vector3<f32>>) {
    let mut tangents = vec![Vector3::new(0.0, 0.0, 0.0); positions.len()];

    for triangle in indices.chunks_exact(3) {
        let (i0, i1, i2) = (
            triangle[0] as usize,
            triangle[1] as usize,
            triangle[2] as usize,
        );
        let edge1 = positions[i1] - positions[i0];
        let edge2 = positions[i2] - positions[i0];
        let duv1 = uvs[i1] - uvs[i0];
        let duv2 = uvs[i2] - uvs[i0];

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() < 1e-12 {
            continue;
        }
        let r = 1.0 / det;
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) * r;
        for &i in &[i0, i1, i2] {
            tangents[i] += tangent;
        }
    }

    let mut bitangents = vec![Vector3::new(0.0, 0.0, 0.0); positions.len()];
    for i in 0..positions.len() {
        let n = normals[i];
        // Gram-Schmidt against the normal; fall back to any frame for
        // degenerate UV layouts
        let mut t = tangents[i] - n * n.dot(tangents[i]);
        if t.magnitude2() < 1e-12 {
            t = if n.x.abs() < 0.9 {
                Vector3::new(1.0, 0.0, 0.0).cross(n)
            } else {
                Vector3::new(0.0, 1.0, 0.0).cross(n)
            };
        }
        tangents[i] = t.normalize();
        bitangents[i] = n.cross(tangents[i]);
    }

    (tangents, bitangents)
}

/// Generates a UV sphere centred at the origin with the given radius.
pub fn generate_sphere(radius: f32, segments: u32, rings: u32) -> Mesh {
    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut indices = Vec::new();

    for ring in 0..=rings {
        let v = ring as f32 / rings as f32;
        let theta = v * std::f32::consts::PI;
        for segment in 0..=segments {
            let u = segment as f32 / segments as f32;
            let phi = u * std::f32::consts::TAU;
            let normal = Vector3::new(
                theta.sin() * phi.cos(),
                theta.cos(),
                theta.sin() * phi.sin(),
            );
            positions.push(normal * radius);
            normals.push(normal);
            uvs.push(Vector2::new(u, v));
        }
    }

    let stride = segments + 1;
    for ring in 0..rings {
        for segment in 0..segments {
            let a = ring * stride + segment;
            let b = a + stride;
            indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
        }
    }

    Mesh::new("sphere", positions, uvs, normals, indices)
}

/// Generates a flat plane in the XZ plane, normal up, centred at the origin.
pub fn generate_plane(width: f32, depth: f32) -> Mesh {
    let hw = width * 0.5;
    let hd = depth * 0.5;
    let positions = vec![
        Vector3::new(-hw, 0.0, -hd),
        Vector3::new(hw, 0.0, -hd),
        Vector3::new(hw, 0.0, hd),
        Vector3::new(-hw, 0.0, hd),
    ];
    let uvs = vec![
        Vector2::new(0.0, 0.0),
        Vector2::new(1.0, 0.0),
        Vector2::new(1.0, 1.0),
        Vector2::new(0.0, 1.0),
    ];
    let normals = vec![Vector3::new(0.0, 1.0, 0.0); 4];
    let indices = vec![0, 2, 1, 0, 3, 2];
    Mesh::new("plane", positions, uvs, normals, indices)
}

/// Generates an axis-aligned cube with the given edge length.
pub fn generate_cube(size: f32) -> Mesh {
    let h = size * 0.5;
    let faces: [(Vector3<f32>, Vector3<f32>, Vector3<f32>); 6] = [
        // (normal, u axis, v axis)
        (Vector3::unit_x(), Vector3::unit_z(), Vector3::unit_y()),
        (-Vector3::unit_x(), -Vector3::unit_z(), Vector3::unit_y()),
        (Vector3::unit_y(), Vector3::unit_x(), Vector3::unit_z()),
        (-Vector3::unit_y(), Vector3::unit_x(), -Vector3::unit_z()),
        (Vector3::unit_z(), -Vector3::unit_x(), Vector3::unit_y()),
        (-Vector3::unit_z(), Vector3::unit_x(), Vector3::unit_y()),
    ];

    let mut positions = Vec::new();
    let mut uvs = Vec::new();
    let mut normals = Vec::new();
    let mut indices = Vec::new();

    for (normal, u_axis, v_axis) in faces {
        let base = positions.len() as u32;
        for (du, dv) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            positions.push(normal * h + u_axis * (h * du) + v_axis * (h * dv));
            uvs.push(Vector2::new(du * 0.5 + 0.5, dv * 0.5 + 0.5));
            normals.push(normal);
        }
        indices.extend_from_slice(&[base, base + 2, base + 1, base, base + 3, base + 2]);
    }

    Mesh::new("cube", positions, uvs, normals, indices)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::InnerSpace;

    #[test]
    fn cube_generation() {
        let cube = generate_cube(1.0);
        assert_eq!(cube.vertex_count(), 24); // 6 faces * 4 vertices
        assert_eq!(cube.triangle_count(), 12); // 6 faces * 2 triangles
    }

    #[test]
    fn sphere_vertices_sit_on_the_radius() {
        let sphere = generate_sphere(2.0, 16, 8);
        assert!(sphere.triangle_count() > 0);
        for vertex in sphere.vertices() {
            assert!((vertex.position.magnitude() - 2.0).abs() < 1e-4);
            assert!((vertex.normal.magnitude() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn tangent_frames_are_orthonormal() {
        let sphere = generate_sphere(1.0, 12, 6);
        for vertex in sphere.vertices() {
            assert!((vertex.tangent.magnitude() - 1.0).abs() < 1e-3);
            assert!(vertex.tangent.dot(vertex.normal).abs() < 1e-3);
            assert!((vertex.bitangent.magnitude() - 1.0).abs() < 1e-3);
        }
    }

    #[test]
    fn plane_winding_faces_up() {
        let plane = generate_plane(2.0, 2.0);
        let [a, b, c] = plane.triangle(0);
        let normal = (b - a).cross(c - a).normalize();
        assert!(normal.y > 0.99);
    }
}
