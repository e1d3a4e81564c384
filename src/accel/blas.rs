//! Bottom-level acceleration structure
//!
//! One BVH over the triangles of a single mesh, built once at mesh
//! registration and immutable afterwards (meshes are static within a scene
//! session). Traversal works in mesh-local space; the top-level structure
//! transforms rays into this space before querying.

use cgmath::{InnerSpace, Vector3};

use crate::accel::aabb::Aabb;
use crate::accel::Ray;
use crate::scene::mesh::{Mesh, MeshId};

/// Triangles per leaf before splitting stops.
const LEAF_SIZE: usize = 4;

#[derive(Debug, Clone, Copy)]
struct Node {
    aabb: Aabb,
    /// Leaf: `start..start + count` into the ordered triangle array.
    /// Internal: `start` is the left child index, right is `start + 1`'s
    /// subtree sibling stored in `right`.
    start: u32,
    count: u32,
    right: u32,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// Intersection record in mesh-local space.
#[derive(Debug, Clone, Copy)]
pub struct BlasHit {
    pub t: f32,
    pub triangle: u32,
    pub u: f32,
    pub v: f32,
}

/// A mesh's triangle BVH.
pub struct Blas {
    mesh: MeshId,
    nodes: Vec<Node>,
    /// Triangle vertex triples, reordered for locality during the build.
    triangles: Vec<[Vector3<f32>; 3]>,
    /// Original mesh triangle index per reordered entry.
    triangle_ids: Vec<u32>,
}

impl Blas {
    /// Builds the BVH for `mesh` with a median split over triangle
    /// centroids on the longest axis.
    pub fn build(id: MeshId, mesh: &Mesh) -> Self {
        let triangle_count = mesh.triangle_count() as usize;
        let mut triangles: Vec<[Vector3<f32>; 3]> =
            (0..triangle_count).map(|i| mesh.triangle(i)).collect();
        let mut triangle_ids: Vec<u32> = (0..triangle_count as u32).collect();

        let mut blas = Self {
            mesh: id,
            nodes: Vec::with_capacity(triangle_count.max(1) * 2),
            triangles: Vec::new(),
            triangle_ids: Vec::new(),
        };
        if triangle_count > 0 {
            blas.split(&mut triangles, &mut triangle_ids, 0);
        } else {
            blas.nodes.push(Node {
                aabb: Aabb::empty(),
                start: 0,
                count: 0,
                right: 0,
            });
        }
        blas.triangles = triangles;
        blas.triangle_ids = triangle_ids;
        blas
    }

    pub fn mesh(&self) -> MeshId {
        self.mesh
    }

    /// Mesh-space bounds of the whole structure.
    pub fn aabb(&self) -> Aabb {
        self.nodes[0].aabb
    }

    /// Recursively partitions `triangles[offset..]`, appending nodes.
    /// Returns the new node's index.
    fn split(
        &mut self,
        triangles: &mut [[Vector3<f32>; 3]],
        ids: &mut [u32],
        offset: usize,
    ) -> u32 {
        let mut aabb = Aabb::empty();
        for tri in triangles.iter() {
            for &vertex in tri {
                aabb.grow(vertex);
            }
        }

        let node_index = self.nodes.len() as u32;
        if triangles.len() <= LEAF_SIZE {
            self.nodes.push(Node {
                aabb,
                start: offset as u32,
                count: triangles.len() as u32,
                right: 0,
            });
            return node_index;
        }

        // Median split on the longest centroid axis
        let centroid_bounds =
            Aabb::from_points(triangles.iter().map(|tri| (tri[0] + tri[1] + tri[2]) / 3.0));
        let axis = centroid_bounds.longest_axis();
        let mid = triangles.len() / 2;

        // Sort indices and triangles together by centroid
        let mut order: Vec<usize> = (0..triangles.len()).collect();
        order.sort_by(|&a, &b| {
            let ca = (triangles[a][0] + triangles[a][1] + triangles[a][2])[axis];
            let cb = (triangles[b][0] + triangles[b][1] + triangles[b][2])[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });
        apply_permutation(triangles, &order);
        apply_permutation(ids, &order);

        self.nodes.push(Node {
            aabb,
            start: 0, // patched below
            count: 0,
            right: 0,
        });

        let (left_tris, right_tris) = triangles.split_at_mut(mid);
        let (left_ids, right_ids) = ids.split_at_mut(mid);
        let left = self.split(left_tris, left_ids, offset);
        let right = self.split(right_tris, right_ids, offset + mid);
        self.nodes[node_index as usize].start = left;
        self.nodes[node_index as usize].right = right;
        node_index
    }

    /// Closest triangle hit along `ray` within `(t_min, t_max)`.
    pub fn intersect(&self, ray: &Ray, t_min: f32, mut t_max: f32) -> Option<BlasHit> {
        let mut stack = [0u32; 64];
        let mut stack_len = 0usize;
        stack[0] = 0;
        stack_len += 1;

        let mut best: Option<BlasHit> = None;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if !node.aabb.hit(ray, t_min, t_max) {
                continue;
            }
            if node.is_leaf() {
                let start = node.start as usize;
                for i in start..start + node.count as usize {
                    if let Some((t, u, v)) = intersect_triangle(ray, &self.triangles[i], t_min, t_max)
                    {
                        t_max = t;
                        best = Some(BlasHit {
                            t,
                            triangle: self.triangle_ids[i],
                            u,
                            v,
                        });
                    }
                }
            } else {
                stack[stack_len] = node.start;
                stack[stack_len + 1] = node.right;
                stack_len += 2;
            }
        }
        best
    }

    /// Whether anything lies along `ray` within `(t_min, t_max)`.
    pub fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        let mut stack = [0u32; 64];
        let mut stack_len = 1usize;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if !node.aabb.hit(ray, t_min, t_max) {
                continue;
            }
            if node.is_leaf() {
                let start = node.start as usize;
                for i in start..start + node.count as usize {
                    if intersect_triangle(ray, &self.triangles[i], t_min, t_max).is_some() {
                        return true;
                    }
                }
            } else {
                stack[stack_len] = node.start;
                stack[stack_len + 1] = node.right;
                stack_len += 2;
            }
        }
        false
    }
}

fn apply_permutation<T: Copy>(data: &mut [T], order: &[usize]) {
    let scratch: Vec<T> = order.iter().map(|&i| data[i]).collect();
    data.copy_from_slice(&scratch);
}

/// Moeller-Trumbore. Returns `(t, u, v)` for hits inside `(t_min, t_max)`.
fn intersect_triangle(
    ray: &Ray,
    triangle: &[Vector3<f32>; 3],
    t_min: f32,
    t_max: f32,
) -> Option<(f32, f32, f32)> {
    let edge1 = triangle[1] - triangle[0];
    let edge2 = triangle[2] - triangle[0];
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < 1e-9 {
        return None;
    }
    let inv_det = 1.0 / det;
    let s = ray.origin - triangle[0];
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = edge2.dot(q) * inv_det;
    if t <= t_min || t >= t_max {
        return None;
    }
    Some((t, u, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::mesh::{generate_sphere, MeshId};

    #[test]
    fn bvh_agrees_with_brute_force() {
        let mesh = generate_sphere(1.0, 16, 8);
        let blas = Blas::build(MeshId(0), &mesh);

        let rays = [
            Ray::new(Vector3::new(0.0, 0.0, 3.0), Vector3::new(0.0, 0.0, -1.0)),
            Ray::new(Vector3::new(0.4, 0.2, 3.0), Vector3::new(0.0, 0.0, -1.0)),
            Ray::new(Vector3::new(2.0, 2.0, 3.0), Vector3::new(0.0, 0.0, -1.0)),
            Ray::new(
                Vector3::new(3.0, 1.0, 0.5),
                Vector3::new(-1.0, -0.3, -0.15).normalize(),
            ),
        ];

        for ray in &rays {
            let brute = (0..mesh.triangle_count() as usize)
                .filter_map(|i| intersect_triangle(ray, &mesh.triangle(i), 1e-4, f32::INFINITY))
                .map(|(t, _, _)| t)
                .fold(f32::INFINITY, f32::min);
            match blas.intersect(ray, 1e-4, f32::INFINITY) {
                Some(hit) => assert!((hit.t - brute).abs() < 1e-5),
                None => assert_eq!(brute, f32::INFINITY),
            }
        }
    }

    #[test]
    fn occlusion_respects_t_max() {
        let mesh = generate_sphere(1.0, 12, 6);
        let blas = Blas::build(MeshId(0), &mesh);
        let ray = Ray::new(Vector3::new(0.0, 0.0, 5.0), Vector3::new(0.0, 0.0, -1.0));
        // Sphere surface starts at t = 4
        assert!(blas.occluded(&ray, 1e-4, 10.0));
        assert!(!blas.occluded(&ray, 1e-4, 3.0));
    }

    #[test]
    fn frontface_hit_distance_is_exact_on_axis() {
        let mesh = generate_sphere(1.0, 64, 32);
        let blas = Blas::build(MeshId(0), &mesh);
        let ray = Ray::new(Vector3::new(0.0, 0.0, 4.0), Vector3::new(0.0, 0.0, -1.0));
        let hit = blas.intersect(&ray, 1e-4, f32::INFINITY).unwrap();
        // Tessellated surface sits just inside the analytic radius
        assert!((hit.t - 3.0).abs() < 0.02);
    }
}
