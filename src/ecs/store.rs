//! Component store
//!
//! Central storage for all component records, generalising the pattern of a
//! material manager shared by id: records live in per-kind fixed pools,
//! entities hold generational handles into them, and shared records are
//! reference-counted so they return to their pool only when the last
//! referencing entity lets go.

use std::collections::HashMap;

use log::warn;

use crate::core::error::EngineError;
use crate::core::generational::{GenerationalPool, Handle};
use crate::ecs::entity::{EntityAllocator, EntityId};
use crate::scene::light::Light;
use crate::scene::material::Material;
use crate::scene::mesh::MeshId;

/// Closed set of component kinds, used as an array index per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    Mesh,
    Material,
    Light,
}

impl ComponentKind {
    pub const COUNT: usize = 3;

    fn slot(self) -> usize {
        match self {
            ComponentKind::Mesh => 0,
            ComponentKind::Material => 1,
            ComponentKind::Light => 2,
        }
    }
}

/// Mesh component: a non-owning reference into the mesh registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MeshComponent {
    pub mesh: MeshId,
}

/// Pool record: component value plus its shared reference count.
struct Record<T> {
    value: T,
    refs: u32,
}

impl<T> Record<T> {
    fn new(value: T) -> Self {
        Self { value, refs: 1 }
    }
}

#[derive(Default, Clone, Copy)]
struct EntityRecord {
    components: [Option<Handle>; ComponentKind::COUNT],
}

/// Typed component pools plus the per-entity kind → handle table.
pub struct ComponentStore {
    allocator: EntityAllocator,
    entities: HashMap<EntityId, EntityRecord>,
    meshes: GenerationalPool<Record<MeshComponent>>,
    materials: GenerationalPool<Record<Material>>,
    lights: GenerationalPool<Record<Light>>,
}

impl ComponentStore {
    /// Creates a store whose per-kind pools each hold up to `capacity`
    /// records.
    pub fn new(capacity: usize) -> Self {
        Self {
            allocator: EntityAllocator::new(),
            entities: HashMap::new(),
            meshes: GenerationalPool::new("mesh component", capacity),
            materials: GenerationalPool::new("material component", capacity),
            lights: GenerationalPool::new("light component", capacity),
        }
    }

    pub fn create_entity(&mut self) -> EntityId {
        let id = self.allocator.mint();
        self.entities.insert(id, EntityRecord::default());
        id
    }

    /// Destroys an entity, releasing (or un-sharing) all its components.
    pub fn destroy_entity(&mut self, entity: EntityId) {
        let Some(record) = self.entities.remove(&entity) else {
            return;
        };
        for kind in [
            ComponentKind::Mesh,
            ComponentKind::Material,
            ComponentKind::Light,
        ] {
            if let Some(handle) = record.components[kind.slot()] {
                self.release_record(kind, handle);
            }
        }
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Assigns a fresh mesh component to `entity`.
    pub fn assign_mesh(
        &mut self,
        entity: EntityId,
        component: MeshComponent,
    ) -> Result<Handle, EngineError> {
        if let Some(existing) = self.component_handle(entity, ComponentKind::Mesh) {
            warn!("{entity} already has a mesh component; assign rejected");
            return Ok(existing);
        }
        let handle = self.meshes.insert(Record::new(component))?;
        self.set_component_handle(entity, ComponentKind::Mesh, handle);
        Ok(handle)
    }

    /// Assigns a fresh material component to `entity`.
    pub fn assign_material(
        &mut self,
        entity: EntityId,
        material: Material,
    ) -> Result<Handle, EngineError> {
        if let Some(existing) = self.component_handle(entity, ComponentKind::Material) {
            warn!("{entity} already has a material component; assign rejected");
            return Ok(existing);
        }
        let handle = self.materials.insert(Record::new(material))?;
        self.set_component_handle(entity, ComponentKind::Material, handle);
        Ok(handle)
    }

    /// Assigns a fresh light component to `entity`.
    pub fn assign_light(&mut self, entity: EntityId, light: Light) -> Result<Handle, EngineError> {
        if let Some(existing) = self.component_handle(entity, ComponentKind::Light) {
            warn!("{entity} already has a light component; assign rejected");
            return Ok(existing);
        }
        let handle = self.lights.insert(Record::new(light))?;
        self.set_component_handle(entity, ComponentKind::Light, handle);
        Ok(handle)
    }

    /// Attaches an already-stored component to a second entity, bumping its
    /// reference count. Rejected (with a warning) if `entity` already holds
    /// a component of that kind.
    pub fn attach_shared(
        &mut self,
        entity: EntityId,
        kind: ComponentKind,
        handle: Handle,
    ) -> Result<(), EngineError> {
        if self.component_handle(entity, kind).is_some() {
            warn!("{entity} already has a {kind:?} component; shared attach rejected");
            return Ok(());
        }
        let found = match kind {
            ComponentKind::Mesh => self.meshes.get_mut(handle).map(|r| r.refs += 1).is_some(),
            ComponentKind::Material => {
                self.materials.get_mut(handle).map(|r| r.refs += 1).is_some()
            }
            ComponentKind::Light => self.lights.get_mut(handle).map(|r| r.refs += 1).is_some(),
        };
        if !found {
            // Stale handle: nothing to share
            return Err(EngineError::ComponentNotFound {
                entity: entity.raw(),
                kind,
            });
        }
        self.set_component_handle(entity, kind, handle);
        Ok(())
    }

    pub fn has(&self, entity: EntityId, kind: ComponentKind) -> bool {
        self.component_handle(entity, kind).is_some()
    }

    pub fn mesh(&self, entity: EntityId) -> Result<&MeshComponent, EngineError> {
        let handle = self.require(entity, ComponentKind::Mesh)?;
        self.meshes
            .get(handle)
            .map(|r| &r.value)
            .ok_or_else(|| self.not_found(entity, ComponentKind::Mesh))
    }

    pub fn material(&self, entity: EntityId) -> Result<&Material, EngineError> {
        let handle = self.require(entity, ComponentKind::Material)?;
        self.materials
            .get(handle)
            .map(|r| &r.value)
            .ok_or_else(|| self.not_found(entity, ComponentKind::Material))
    }

    pub fn material_mut(&mut self, entity: EntityId) -> Result<&mut Material, EngineError> {
        let handle = self.require(entity, ComponentKind::Material)?;
        self.materials
            .get_mut(handle)
            .map(|r| &mut r.value)
            .ok_or(EngineError::ComponentNotFound {
                entity: entity.raw(),
                kind: ComponentKind::Material,
            })
    }

    pub fn light(&self, entity: EntityId) -> Result<&Light, EngineError> {
        let handle = self.require(entity, ComponentKind::Light)?;
        self.lights
            .get(handle)
            .map(|r| &r.value)
            .ok_or_else(|| self.not_found(entity, ComponentKind::Light))
    }

    pub fn light_mut(&mut self, entity: EntityId) -> Result<&mut Light, EngineError> {
        let handle = self.require(entity, ComponentKind::Light)?;
        self.lights
            .get_mut(handle)
            .map(|r| &mut r.value)
            .ok_or(EngineError::ComponentNotFound {
                entity: entity.raw(),
                kind: ComponentKind::Light,
            })
    }

    /// Detaches the `kind` component from `entity`; the record returns to
    /// its pool once its last reference is gone.
    pub fn remove(&mut self, entity: EntityId, kind: ComponentKind) -> Result<(), EngineError> {
        let handle = self.require(entity, kind)?;
        if let Some(record) = self.entities.get_mut(&entity) {
            record.components[kind.slot()] = None;
        }
        self.release_record(kind, handle);
        Ok(())
    }

    /// Handle of the `kind` component on `entity`, if any. The handle's
    /// index doubles as the component's stable data-block slot.
    pub fn component_handle(&self, entity: EntityId, kind: ComponentKind) -> Option<Handle> {
        self.entities
            .get(&entity)
            .and_then(|record| record.components[kind.slot()])
    }

    /// Live material records with their pool slots (used for block upload).
    pub fn materials(&self) -> impl Iterator<Item = (usize, &Material)> {
        self.materials.iter().map(|(slot, r)| (slot, &r.value))
    }

    /// Mutable sweep over live materials, for clearing dirty flags after a
    /// flush.
    pub fn materials_mut(&mut self) -> impl Iterator<Item = (usize, &mut Material)> {
        self.materials.iter_mut().map(|(slot, r)| (slot, &mut r.value))
    }

    /// Live light records with their pool slots.
    pub fn lights(&self) -> impl Iterator<Item = (usize, &Light)> {
        self.lights.iter().map(|(slot, r)| (slot, &r.value))
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    fn require(&self, entity: EntityId, kind: ComponentKind) -> Result<Handle, EngineError> {
        self.component_handle(entity, kind)
            .ok_or_else(|| self.not_found(entity, kind))
    }

    fn not_found(&self, entity: EntityId, kind: ComponentKind) -> EngineError {
        EngineError::ComponentNotFound {
            entity: entity.raw(),
            kind,
        }
    }

    fn set_component_handle(&mut self, entity: EntityId, kind: ComponentKind, handle: Handle) {
        self.entities
            .entry(entity)
            .or_default()
            .components[kind.slot()] = Some(handle);
    }

    fn release_record(&mut self, kind: ComponentKind, handle: Handle) {
        macro_rules! release {
            ($pool:expr) => {{
                let free = match $pool.get_mut(handle) {
                    Some(record) => {
                        record.refs -= 1;
                        record.refs == 0
                    }
                    None => false,
                };
                if free {
                    $pool.remove(handle);
                }
            }};
        }
        match kind {
            ComponentKind::Mesh => release!(self.meshes),
            ComponentKind::Material => release!(self.materials),
            ComponentKind::Light => release!(self.lights),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    fn store() -> ComponentStore {
        ComponentStore::new(8)
    }

    #[test]
    fn get_on_missing_component_is_component_not_found() {
        let mut store = store();
        let entity = store.create_entity();
        match store.material(entity) {
            Err(EngineError::ComponentNotFound { kind, .. }) => {
                assert_eq!(kind, ComponentKind::Material)
            }
            other => panic!("expected ComponentNotFound, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn second_assign_of_same_kind_is_rejected_keeping_the_first() {
        let mut store = store();
        let entity = store.create_entity();
        let first = store
            .assign_material(entity, Material::lambert("a", Vector3::new(0.1, 0.2, 0.3)))
            .unwrap();
        let second = store
            .assign_material(entity, Material::lambert("b", Vector3::new(0.9, 0.9, 0.9)))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(store.material(entity).unwrap().name, "a");
        assert_eq!(store.material_count(), 1);
    }

    #[test]
    fn shared_component_freed_after_exactly_k_releases() {
        let mut store = store();
        let owner = store.create_entity();
        let handle = store
            .assign_material(owner, Material::lambert("shared", Vector3::new(0.5, 0.5, 0.5)))
            .unwrap();

        let mut others = Vec::new();
        for _ in 0..3 {
            let entity = store.create_entity();
            store
                .attach_shared(entity, ComponentKind::Material, handle)
                .unwrap();
            others.push(entity);
        }
        assert_eq!(store.material_count(), 1);

        // Release in arbitrary order: middle sharer, owner, rest
        store.remove(others[1], ComponentKind::Material).unwrap();
        assert_eq!(store.material_count(), 1);
        store.destroy_entity(owner);
        assert_eq!(store.material_count(), 1);
        store.remove(others[0], ComponentKind::Material).unwrap();
        assert_eq!(store.material_count(), 1);
        store.destroy_entity(others[2]);
        assert_eq!(store.material_count(), 0);
    }

    #[test]
    fn destroy_entity_releases_all_component_kinds() {
        let mut store = store();
        let entity = store.create_entity();
        store
            .assign_material(entity, Material::default())
            .unwrap();
        store
            .assign_light(entity, Light::point(Vector3::new(1.0, 1.0, 1.0), 5.0))
            .unwrap();
        store.destroy_entity(entity);
        assert_eq!(store.material_count(), 0);
        assert_eq!(store.entity_count(), 0);
    }

    #[test]
    fn attach_shared_with_stale_handle_errors() {
        let mut store = store();
        let entity = store.create_entity();
        let handle = store
            .assign_material(entity, Material::default())
            .unwrap();
        store.remove(entity, ComponentKind::Material).unwrap();

        let other = store.create_entity();
        assert!(store
            .attach_shared(other, ComponentKind::Material, handle)
            .is_err());
    }
}
