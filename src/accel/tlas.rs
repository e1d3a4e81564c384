//! Top-level acceleration structure
//!
//! The ordered set of live instances, each pairing a bottom-level structure
//! with its current world transform, plus a BVH over the instance world
//! bounds. Rebuilt from scratch when the instance set changes; refit in
//! place when only transforms moved.

use cgmath::{Matrix4, SquareMatrix, Vector3, Vector4};

use crate::accel::aabb::Aabb;
use crate::accel::blas::Blas;
use crate::accel::{Hit, Ray};
use crate::core::error::EngineError;

/// Instances per leaf.
const LEAF_SIZE: usize = 2;

/// One place in the top-level structure: a BLAS reference plus transforms.
pub struct Instance {
    /// Index into the builder's BLAS table.
    pub blas: usize,
    pub transform: Matrix4<f32>,
    pub inverse: Matrix4<f32>,
    pub world_aabb: Aabb,
}

impl Instance {
    pub fn new(blas_index: usize, blas: &Blas, transform: Matrix4<f32>) -> Result<Self, EngineError> {
        let inverse = transform
            .invert()
            .ok_or_else(|| EngineError::device("singular instance transform"))?;
        Ok(Self {
            blas: blas_index,
            world_aabb: blas.aabb().transformed(&transform),
            transform,
            inverse,
        })
    }

    /// Updates the transform in place, recomputing the cached inverse and
    /// world bounds. Used on the refit path.
    pub fn update_transform(
        &mut self,
        blas: &Blas,
        transform: Matrix4<f32>,
    ) -> Result<(), EngineError> {
        self.inverse = transform
            .invert()
            .ok_or_else(|| EngineError::device("singular instance transform"))?;
        self.transform = transform;
        self.world_aabb = blas.aabb().transformed(&transform);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Node {
    aabb: Aabb,
    start: u32,
    count: u32,
    right: u32,
}

impl Node {
    fn is_leaf(&self) -> bool {
        self.count > 0
    }
}

/// BVH over instance world bounds.
pub struct Tlas {
    instances: Vec<Instance>,
    /// Permutation of instance indices referenced by leaves.
    order: Vec<u32>,
    nodes: Vec<Node>,
}

impl Tlas {
    /// Builds the structure over `instances` from scratch.
    pub fn build(instances: Vec<Instance>) -> Self {
        let mut order: Vec<u32> = (0..instances.len() as u32).collect();
        let mut tlas = Self {
            instances,
            order: Vec::new(),
            nodes: Vec::new(),
        };
        if tlas.instances.is_empty() {
            tlas.nodes.push(Node {
                aabb: Aabb::empty(),
                start: 0,
                count: 0,
                right: 0,
            });
            return tlas;
        }
        let len = order.len();
        tlas.split(&mut order, 0, len);
        tlas.order = order;
        tlas
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    fn split(&mut self, order: &mut [u32], offset: usize, len: usize) -> u32 {
        let slice = &mut order[..len];
        let mut aabb = Aabb::empty();
        for &i in slice.iter() {
            aabb = aabb.union(&self.instances[i as usize].world_aabb);
        }

        let node_index = self.nodes.len() as u32;
        if len <= LEAF_SIZE {
            self.nodes.push(Node {
                aabb,
                start: offset as u32,
                count: len as u32,
                right: 0,
            });
            return node_index;
        }

        let centroid_bounds = Aabb::from_points(
            slice
                .iter()
                .map(|&i| self.instances[i as usize].world_aabb.centroid()),
        );
        let axis = centroid_bounds.longest_axis();
        let instances = &self.instances;
        slice.sort_by(|&a, &b| {
            let ca = instances[a as usize].world_aabb.centroid()[axis];
            let cb = instances[b as usize].world_aabb.centroid()[axis];
            ca.partial_cmp(&cb).unwrap_or(std::cmp::Ordering::Equal)
        });

        self.nodes.push(Node {
            aabb,
            start: 0,
            count: 0,
            right: 0,
        });

        let mid = len / 2;
        // Recurse on disjoint halves of the permutation
        let left = {
            let (left_half, _) = order.split_at_mut(mid);
            let half_len = left_half.len();
            self.split(left_half, offset, half_len)
        };
        let right = {
            let (_, right_half) = order.split_at_mut(mid);
            let half_len = len - mid;
            self.split(right_half, offset + mid, half_len)
        };
        self.nodes[node_index as usize].start = left;
        self.nodes[node_index as usize].right = right;
        node_index
    }

    /// Refits node bounds in place after instance transforms changed.
    ///
    /// Topology is preserved: children were pushed after their parent, so a
    /// reverse sweep sees every child before its parent.
    pub fn refit(&mut self) {
        for i in (0..self.nodes.len()).rev() {
            let node = self.nodes[i];
            let aabb = if node.is_leaf() {
                let mut aabb = Aabb::empty();
                for &instance in &self.order[node.start as usize..(node.start + node.count) as usize]
                {
                    aabb = aabb.union(&self.instances[instance as usize].world_aabb);
                }
                aabb
            } else {
                self.nodes[node.start as usize]
                    .aabb
                    .union(&self.nodes[node.right as usize].aabb)
            };
            self.nodes[i].aabb = aabb;
        }
    }

    /// Mutable instance access for the refit path.
    pub fn instances_mut(&mut self) -> &mut [Instance] {
        &mut self.instances
    }

    /// Closest hit across all instances.
    pub fn intersect(&self, blas_table: &[Blas], ray: &Ray, t_min: f32, mut t_max: f32) -> Option<Hit> {
        let mut stack = [0u32; 64];
        let mut stack_len = 1usize;
        let mut best: Option<Hit> = None;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if !node.aabb.hit(ray, t_min, t_max) {
                continue;
            }
            if node.is_leaf() {
                for &index in &self.order[node.start as usize..(node.start + node.count) as usize] {
                    let instance = &self.instances[index as usize];
                    let local = ray.transformed(&instance.inverse);
                    if let Some(hit) =
                        blas_table[instance.blas].intersect(&local, t_min, t_max)
                    {
                        t_max = hit.t;
                        best = Some(Hit {
                            t: hit.t,
                            instance: index,
                            triangle: hit.triangle,
                            u: hit.u,
                            v: hit.v,
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

    /// Any-hit query for shadow rays.
    pub fn occluded(&self, blas_table: &[Blas], ray: &Ray, t_min: f32, t_max: f32) -> bool {
        let mut stack = [0u32; 64];
        let mut stack_len = 1usize;

        while stack_len > 0 {
            stack_len -= 1;
            let node = &self.nodes[stack[stack_len] as usize];
            if !node.aabb.hit(ray, t_min, t_max) {
                continue;
            }
            if node.is_leaf() {
                for &index in &self.order[node.start as usize..(node.start + node.count) as usize] {
                    let instance = &self.instances[index as usize];
                    let local = ray.transformed(&instance.inverse);
                    if blas_table[instance.blas].occluded(&local, t_min, t_max) {
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

impl Ray {
    /// Carries the ray through an affine transform without renormalising,
    /// so `t` values remain comparable with world space.
    pub fn transformed(&self, matrix: &Matrix4<f32>) -> Ray {
        let origin = matrix * Vector4::new(self.origin.x, self.origin.y, self.origin.z, 1.0);
        let direction =
            matrix * Vector4::new(self.direction.x, self.direction.y, self.direction.z, 0.0);
        Ray::new_unnormalized(
            Vector3::new(origin.x, origin.y, origin.z),
            Vector3::new(direction.x, direction.y, direction.z),
        )
    }
}
