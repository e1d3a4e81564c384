//! Scene graph and flattening
//!
//! The scene owns the component store, the camera and the environment, and
//! keeps an ordered list of scene objects with optional parent links. The
//! per-frame `update` propagates parent-to-child world matrices; `flatten`
//! produces the ordered object list handed to the acceleration structure
//! builder and the path tracer.

use std::collections::HashMap;

use cgmath::Matrix4;
use log::warn;

use crate::core::error::EngineError;
use crate::ecs::store::{ComponentKind, ComponentStore, MeshComponent};
use crate::ecs::EntityId;
use crate::scene::camera::Camera;
use crate::scene::environment::Environment;
use crate::scene::light::Light;
use crate::scene::material::Material;
use crate::scene::mesh::MeshId;
use crate::scene::transform::Transform;

/// One node of the scene graph.
pub struct SceneObject {
    pub name: String,
    pub entity: EntityId,
    pub transform: Transform,
    pub parent: Option<EntityId>,
    pub visible: bool,
    world: Matrix4<f32>,
}

impl SceneObject {
    /// World matrix as of the last [`Scene::update`].
    pub fn world(&self) -> Matrix4<f32> {
        self.world
    }
}

/// Flattened view of one renderable object, input to the acceleration
/// structure builder and the renderer.
#[derive(Debug, Clone, Copy)]
pub struct RenderObject {
    pub entity: EntityId,
    pub mesh: MeshId,
    /// Stable material pool slot, doubling as the material block index.
    pub material_slot: u32,
    /// World transform.
    pub transform: Matrix4<f32>,
}

/// Main scene: component store, object list, camera and environment.
pub struct Scene {
    pub camera: Camera,
    pub environment: Environment,
    components: ComponentStore,
    objects: Vec<SceneObject>,
}

impl Scene {
    /// Creates a scene whose component pools hold up to 1024 records each.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            camera: Camera::default(),
            environment: Environment::default(),
            components: ComponentStore::new(capacity),
            objects: Vec::new(),
        }
    }

    /// Inserts a mesh-bearing object with its own material.
    pub fn add_object(
        &mut self,
        name: &str,
        mesh: MeshId,
        material: Material,
    ) -> Result<EntityId, EngineError> {
        let entity = self.components.create_entity();
        self.components.assign_mesh(entity, MeshComponent { mesh })?;
        self.components.assign_material(entity, material)?;
        self.push_node(name, entity);
        Ok(entity)
    }

    /// Inserts an object sharing an existing material record.
    ///
    /// `source` names any entity already holding the material; the record's
    /// reference count goes up by one and it returns to its pool only when
    /// the last holder releases it.
    pub fn add_object_sharing_material(
        &mut self,
        name: &str,
        mesh: MeshId,
        source: EntityId,
    ) -> Result<EntityId, EngineError> {
        let handle = self
            .components
            .component_handle(source, ComponentKind::Material)
            .ok_or(EngineError::ComponentNotFound {
                entity: source.raw(),
                kind: ComponentKind::Material,
            })?;
        let entity = self.components.create_entity();
        self.components.assign_mesh(entity, MeshComponent { mesh })?;
        self.components
            .attach_shared(entity, ComponentKind::Material, handle)?;
        self.push_node(name, entity);
        Ok(entity)
    }

    /// Inserts a light-only object (point or directional).
    pub fn add_light(&mut self, name: &str, light: Light) -> Result<EntityId, EngineError> {
        let entity = self.components.create_entity();
        self.components.assign_light(entity, light)?;
        self.push_node(name, entity);
        Ok(entity)
    }

    /// Turns an existing mesh-bearing object into an area emitter.
    pub fn attach_mesh_light(
        &mut self,
        entity: EntityId,
        light: Light,
    ) -> Result<(), EngineError> {
        if !self.components.has(entity, ComponentKind::Mesh) {
            warn!("{entity} has no mesh; mesh light will not be sampled");
        }
        self.components.assign_light(entity, light)?;
        Ok(())
    }

    /// Removes an object and releases all its components.
    pub fn remove_object(&mut self, entity: EntityId) {
        // Children of the removed node fall back to the root
        for object in &mut self.objects {
            if object.parent == Some(entity) {
                object.parent = None;
            }
        }
        self.objects.retain(|object| object.entity != entity);
        self.components.destroy_entity(entity);
    }

    /// Parents `child` under `parent` for transform propagation.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) {
        if child == parent {
            warn!("{child} cannot parent itself");
            return;
        }
        if let Some(object) = self.objects.iter_mut().find(|o| o.entity == child) {
            object.parent = Some(parent);
        }
    }

    pub fn object(&self, entity: EntityId) -> Option<&SceneObject> {
        self.objects.iter().find(|o| o.entity == entity)
    }

    pub fn transform_mut(&mut self, entity: EntityId) -> Option<&mut Transform> {
        self.objects
            .iter_mut()
            .find(|o| o.entity == entity)
            .map(|o| &mut o.transform)
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    pub fn components_mut(&mut self) -> &mut ComponentStore {
        &mut self.components
    }

    /// Recomputes world matrices, walking each node's parent chain.
    pub fn update(&mut self) {
        let index: HashMap<EntityId, usize> = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (o.entity, i))
            .collect();

        let worlds: Vec<Matrix4<f32>> = (0..self.objects.len())
            .map(|i| self.world_of(i, &index))
            .collect();
        for (object, world) in self.objects.iter_mut().zip(worlds) {
            object.world = world;
        }
    }

    /// Walks the parent chain upward, capped at the object count so a
    /// malformed parent cycle cannot hang the update.
    fn world_of(&self, i: usize, index: &HashMap<EntityId, usize>) -> Matrix4<f32> {
        let mut world = self.objects[i].transform.matrix();
        let mut parent = self.objects[i].parent;
        let mut steps = 0;
        while let Some(entity) = parent {
            if steps >= self.objects.len() {
                warn!("parent cycle detected at {entity}; truncating propagation");
                break;
            }
            let Some(&p) = index.get(&entity) else { break };
            world = self.objects[p].transform.matrix() * world;
            parent = self.objects[p].parent;
            steps += 1;
        }
        world
    }

    /// Ordered list of visible mesh-bearing objects with world transforms.
    ///
    /// Call [`update`](Self::update) first so world matrices are current.
    pub fn flatten(&self) -> Vec<RenderObject> {
        self.objects
            .iter()
            .filter(|object| object.visible)
            .filter_map(|object| {
                let mesh = self.components.mesh(object.entity).ok()?.mesh;
                let material_slot = self
                    .components
                    .component_handle(object.entity, ComponentKind::Material)?
                    .index();
                Some(RenderObject {
                    entity: object.entity,
                    mesh,
                    material_slot,
                    transform: object.world,
                })
            })
            .collect()
    }

    /// Every object carrying a light component, with the light's pool slot.
    ///
    /// Call [`update`](Self::update) first so world matrices are current.
    pub fn lights(&self) -> Vec<(&SceneObject, u32, &Light)> {
        self.objects
            .iter()
            .filter_map(|object| {
                let slot = self
                    .components
                    .component_handle(object.entity, ComponentKind::Light)?
                    .index();
                let light = self.components.light(object.entity).ok()?;
                Some((object, slot, light))
            })
            .collect()
    }

    fn push_node(&mut self, name: &str, entity: EntityId) {
        self.objects.push(SceneObject {
            name: self.ensure_unique_name(name),
            entity,
            transform: Transform::identity(),
            parent: None,
            visible: true,
            world: Matrix4::from_scale(1.0),
        });
    }

    fn ensure_unique_name(&self, desired: &str) -> String {
        let mut counter = 0;
        let mut name = desired.to_string();
        while self.objects.iter().any(|o| o.name == name) {
            counter += 1;
            name = format!("{} ({})", desired, counter);
        }
        name
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::mesh::{generate_cube, MeshRegistry};
    use cgmath::{Vector3, Vector4};

    fn scene_with_cube() -> (Scene, MeshRegistry, MeshId) {
        let mut registry = MeshRegistry::new();
        let mesh = registry.register(generate_cube(1.0));
        (Scene::new(), registry, mesh)
    }

    #[test]
    fn flatten_skips_invisible_and_meshless_objects() {
        let (mut scene, _registry, mesh) = scene_with_cube();
        let visible = scene.add_object("a", mesh, Material::default()).unwrap();
        let hidden = scene.add_object("b", mesh, Material::default()).unwrap();
        scene
            .add_light("sun", Light::directional(Vector3::new(1.0, 1.0, 1.0), 1.0, Vector3::new(0.0, -1.0, 0.0)))
            .unwrap();
        scene
            .objects
            .iter_mut()
            .find(|o| o.entity == hidden)
            .unwrap()
            .visible = false;

        scene.update();
        let flat = scene.flatten();
        assert_eq!(flat.len(), 1);
        assert_eq!(flat[0].entity, visible);
    }

    #[test]
    fn parent_transforms_propagate_to_children() {
        let (mut scene, _registry, mesh) = scene_with_cube();
        let parent = scene.add_object("parent", mesh, Material::default()).unwrap();
        let child = scene.add_object("child", mesh, Material::default()).unwrap();
        scene.set_parent(child, parent);

        scene
            .transform_mut(parent)
            .unwrap()
            .set_position(Vector3::new(0.0, 5.0, 0.0));
        scene
            .transform_mut(child)
            .unwrap()
            .set_position(Vector3::new(1.0, 0.0, 0.0));
        scene.update();

        let world = scene.object(child).unwrap().world();
        let origin = world * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert!((origin.x - 1.0).abs() < 1e-5);
        assert!((origin.y - 5.0).abs() < 1e-5);
    }

    #[test]
    fn add_then_remove_restores_flattened_topology() {
        let (mut scene, _registry, mesh) = scene_with_cube();
        scene.add_object("keep", mesh, Material::default()).unwrap();
        scene.update();
        let before: Vec<EntityId> = scene.flatten().iter().map(|o| o.entity).collect();

        let transient = scene.add_object("gone", mesh, Material::default()).unwrap();
        scene.remove_object(transient);
        scene.update();
        let after: Vec<EntityId> = scene.flatten().iter().map(|o| o.entity).collect();

        assert_eq!(before, after);
    }

    #[test]
    fn duplicate_names_get_suffixed() {
        let (mut scene, _registry, mesh) = scene_with_cube();
        let a = scene.add_object("box", mesh, Material::default()).unwrap();
        let b = scene.add_object("box", mesh, Material::default()).unwrap();
        assert_eq!(scene.object(a).unwrap().name, "box");
        assert_eq!(scene.object(b).unwrap().name, "box (1)");
    }
}
