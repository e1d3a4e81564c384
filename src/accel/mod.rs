//! # Acceleration Structures
//!
//! Two-level spatial index over scene geometry for ray queries: one
//! bottom-level structure ([`blas::Blas`]) per unique mesh, built once, and
//! one top-level structure ([`tlas::Tlas`]) instancing every mesh-bearing
//! scene object with its current world transform.
//!
//! The [`AccelStructures`] builder keeps both current against scene
//! mutation, choosing per frame between a full top-level rebuild (instance
//! set changed) and a cheaper in-place refit (only transforms changed).
//! Per-instance object descriptions are rebuilt in lockstep with the
//! top-level structure so hit shading can resolve geometry and material
//! data by instance index.

pub mod aabb;
pub mod blas;
pub mod tlas;

use std::collections::HashMap;

use cgmath::{InnerSpace, Vector3};
use log::{debug, error};

use crate::core::error::EngineError;
use crate::gpu::layouts::ObjectDescBlock;
use crate::scene::mesh::{MeshId, MeshRegistry};
use crate::scene::scene::RenderObject;
use blas::Blas;
use tlas::{Instance, Tlas};

/// A world-space ray with precomputed reciprocal direction for slab tests.
#[derive(Debug, Clone, Copy)]
pub struct Ray {
    pub origin: Vector3<f32>,
    pub direction: Vector3<f32>,
    pub inv_direction: Vector3<f32>,
}

impl Ray {
    /// Creates a ray with a normalised direction.
    pub fn new(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self::new_unnormalized(origin, direction.normalize())
    }

    /// Creates a ray keeping `direction`'s length (used for instance-space
    /// traversal where scale must carry through to `t`).
    pub fn new_unnormalized(origin: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            origin,
            direction,
            inv_direction: Vector3::new(
                1.0 / direction.x,
                1.0 / direction.y,
                1.0 / direction.z,
            ),
        }
    }

    pub fn at(&self, t: f32) -> Vector3<f32> {
        self.origin + self.direction * t
    }
}

/// Scene-wide intersection record.
#[derive(Debug, Clone, Copy)]
pub struct Hit {
    pub t: f32,
    /// Top-level instance index.
    pub instance: u32,
    /// Triangle index within the instance's mesh.
    pub triangle: u32,
    pub u: f32,
    pub v: f32,
}

/// How the last `sync` kept the top-level structure current.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Instance set changed: full rebuild plus object-desc rebuild.
    Rebuilt,
    /// Only transforms changed: refit in place.
    Refitted,
    /// Nothing moved.
    Unchanged,
}

/// Owner and maintainer of all acceleration structures for one scene.
pub struct AccelStructures {
    blas_table: Vec<Blas>,
    blas_by_mesh: HashMap<MeshId, usize>,
    tlas: Tlas,
    object_descs: Vec<ObjectDescBlock>,
    /// `(entity raw id, mesh)` per instance at the last sync, in order.
    topology: Vec<(u64, MeshId)>,
}

impl Default for AccelStructures {
    fn default() -> Self {
        Self::new()
    }
}

impl AccelStructures {
    pub fn new() -> Self {
        Self {
            blas_table: Vec::new(),
            blas_by_mesh: HashMap::new(),
            tlas: Tlas::build(Vec::new()),
            object_descs: Vec::new(),
            topology: Vec::new(),
        }
    }

    /// Brings both levels up to date with the flattened `objects` list.
    ///
    /// On failure the structures keep their previous state; the caller
    /// skips ray-traced rendering for the frame and surfaces the error.
    pub fn sync(
        &mut self,
        registry: &MeshRegistry,
        objects: &[RenderObject],
    ) -> Result<SyncOutcome, EngineError> {
        // Bottom level: one immutable BVH per distinct mesh, built on first
        // sight.
        for object in objects {
            if !self.blas_by_mesh.contains_key(&object.mesh) {
                let blas = Blas::build(object.mesh, registry.get(object.mesh));
                self.blas_by_mesh.insert(object.mesh, self.blas_table.len());
                self.blas_table.push(blas);
            }
        }

        let topology: Vec<(u64, MeshId)> = objects
            .iter()
            .map(|object| (object.entity.raw(), object.mesh))
            .collect();

        if topology != self.topology {
            match self.rebuild(registry, objects) {
                Ok(()) => {
                    self.topology = topology;
                    debug!(
                        "top-level structure rebuilt with {} instances",
                        objects.len()
                    );
                    Ok(SyncOutcome::Rebuilt)
                }
                Err(err) => {
                    error!("top-level rebuild failed: {err}");
                    Err(err)
                }
            }
        } else if self.refit_needed(objects) {
            self.refit(objects)?;
            debug!("top-level structure refit in place");
            Ok(SyncOutcome::Refitted)
        } else {
            Ok(SyncOutcome::Unchanged)
        }
    }

    fn rebuild(
        &mut self,
        registry: &MeshRegistry,
        objects: &[RenderObject],
    ) -> Result<(), EngineError> {
        let mut instances = Vec::with_capacity(objects.len());
        let mut descs = Vec::with_capacity(objects.len());
        for object in objects {
            let blas_index = self.blas_by_mesh[&object.mesh];
            instances.push(Instance::new(
                blas_index,
                &self.blas_table[blas_index],
                object.transform,
            )?);
            descs.push(ObjectDescBlock {
                mesh: object.mesh.index() as u32,
                material_slot: object.material_slot,
                triangle_count: registry.get(object.mesh).triangle_count(),
                _padding: 0,
            });
        }
        self.tlas = Tlas::build(instances);
        self.object_descs = descs;
        Ok(())
    }

    fn refit_needed(&self, objects: &[RenderObject]) -> bool {
        self.tlas
            .instances()
            .iter()
            .zip(objects)
            .any(|(instance, object)| instance.transform != object.transform)
    }

    fn refit(&mut self, objects: &[RenderObject]) -> Result<(), EngineError> {
        // Instance order matches `objects` order after a rebuild, which is
        // the precondition for landing on this path.
        for (index, object) in objects.iter().enumerate() {
            let blas = &self.blas_table[self.blas_by_mesh[&object.mesh]];
            self.tlas.instances_mut()[index].update_transform(blas, object.transform)?;
        }
        self.tlas.refit();
        Ok(())
    }

    pub fn instance_count(&self) -> usize {
        self.tlas.instance_count()
    }

    pub fn object_descs(&self) -> &[ObjectDescBlock] {
        &self.object_descs
    }

    pub fn blas_count(&self) -> usize {
        self.blas_table.len()
    }

    pub fn tlas(&self) -> &Tlas {
        &self.tlas
    }

    /// Closest hit in world space.
    pub fn intersect(&self, ray: &Ray, t_min: f32, t_max: f32) -> Option<Hit> {
        self.tlas.intersect(&self.blas_table, ray, t_min, t_max)
    }

    /// Shadow-ray query.
    pub fn occluded(&self, ray: &Ray, t_min: f32, t_max: f32) -> bool {
        self.tlas.occluded(&self.blas_table, ray, t_min, t_max)
    }

    /// Instance transform and mesh lookup for shading.
    pub fn instance(&self, index: u32) -> &Instance {
        &self.tlas.instances()[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::entity::EntityAllocator;
    use crate::scene::mesh::{generate_cube, generate_sphere};
    use cgmath::Matrix4;

    fn two_object_scene() -> (MeshRegistry, Vec<RenderObject>) {
        let mut registry = MeshRegistry::new();
        let sphere = registry.register(generate_sphere(1.0, 12, 6));
        let cube = registry.register(generate_cube(1.0));
        let mut ids = EntityAllocator::new();
        let objects = vec![
            RenderObject {
                entity: ids.mint(),
                mesh: sphere,
                material_slot: 0,
                transform: Matrix4::from_scale(1.0),
            },
            RenderObject {
                entity: ids.mint(),
                mesh: cube,
                material_slot: 1,
                transform: Matrix4::from_translation(Vector3::new(4.0, 0.0, 0.0)),
            },
        ];
        (registry, objects)
    }

    #[test]
    fn sync_rebuilds_then_settles() {
        let (registry, objects) = two_object_scene();
        let mut accel = AccelStructures::new();

        assert_eq!(accel.sync(&registry, &objects).unwrap(), SyncOutcome::Rebuilt);
        assert_eq!(accel.blas_count(), 2);
        assert_eq!(accel.instance_count(), 2);
        assert_eq!(accel.object_descs().len(), 2);
        assert!(accel.object_descs()[0].triangle_count > 0);

        assert_eq!(accel.sync(&registry, &objects).unwrap(), SyncOutcome::Unchanged);
    }

    #[test]
    fn transform_only_change_refits_in_place() {
        let (registry, mut objects) = two_object_scene();
        let mut accel = AccelStructures::new();
        accel.sync(&registry, &objects).unwrap();

        objects[1].transform = Matrix4::from_translation(Vector3::new(0.0, 8.0, 0.0));
        assert_eq!(accel.sync(&registry, &objects).unwrap(), SyncOutcome::Refitted);

        // The cube moved up; a ray down its new column must hit it.
        let ray = Ray::new(Vector3::new(0.0, 20.0, 0.0), Vector3::new(0.0, -1.0, 0.0));
        let hit = accel.intersect(&ray, 1e-4, f32::MAX).unwrap();
        assert_eq!(hit.instance, 1);
        assert!((hit.t - 11.5).abs() < 1e-3);
    }

    #[test]
    fn adding_an_object_triggers_a_rebuild() {
        let (mut registry, mut objects) = two_object_scene();
        let mut accel = AccelStructures::new();
        accel.sync(&registry, &objects).unwrap();

        let plane = registry.register(crate::scene::mesh::generate_plane(10.0, 10.0));
        let mut ids = EntityAllocator::new();
        ids.mint();
        ids.mint();
        objects.push(RenderObject {
            entity: ids.mint(),
            mesh: plane,
            material_slot: 2,
            transform: Matrix4::from_scale(1.0),
        });
        assert_eq!(accel.sync(&registry, &objects).unwrap(), SyncOutcome::Rebuilt);
        assert_eq!(accel.instance_count(), 3);
    }

    #[test]
    fn singular_transform_fails_and_keeps_previous_state() {
        let (registry, mut objects) = two_object_scene();
        let mut accel = AccelStructures::new();
        accel.sync(&registry, &objects).unwrap();

        objects[0].entity = {
            let mut ids = EntityAllocator::new();
            ids.mint();
            ids.mint();
            ids.mint()
        };
        objects[0].transform = Matrix4::from_scale(0.0);
        assert!(accel.sync(&registry, &objects).is_err());
        // Previous instances survive for the next frame.
        assert_eq!(accel.instance_count(), 2);
    }
}
