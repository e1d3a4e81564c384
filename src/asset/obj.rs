//! OBJ model import
//!
//! Loads a Wavefront OBJ into the mesh registry and the scene: one scene
//! object per OBJ model, each with its own material converted from the MTL
//! definition. Missing normals are reconstructed from face geometry.

use std::path::Path;

use cgmath::{InnerSpace, Vector2, Vector3};
use log::{info, warn};
use tobj::LoadOptions;

use crate::core::error::EngineError;
use crate::ecs::EntityId;
use crate::scene::material::Material;
use crate::scene::mesh::{Mesh, MeshRegistry};
use crate::scene::scene::Scene;

/// Imports every model in `path`, registering meshes and adding one scene
/// object per model. Returns the created entities in file order.
pub fn import_model(
    path: &Path,
    registry: &mut MeshRegistry,
    scene: &mut Scene,
) -> Result<Vec<EntityId>, EngineError> {
    if !path.exists() {
        return Err(EngineError::AssetMissing {
            path: path.display().to_string(),
        });
    }

    let (models, materials) = tobj::load_obj(
        path,
        &LoadOptions {
            single_index: true,
            triangulate: true,
            ..Default::default()
        },
    )
    .map_err(|e| EngineError::AssetMissing {
        path: format!("{}: {e}", path.display()),
    })?;

    let materials = materials.unwrap_or_else(|e| {
        warn!("no usable MTL for {}: {e}", path.display());
        Vec::new()
    });

    let mut entities = Vec::with_capacity(models.len());
    for model in &models {
        let mesh = convert_mesh(&model.name, &model.mesh);
        let id = registry.register(mesh);
        let material = model
            .mesh
            .material_id
            .and_then(|i| materials.get(i))
            .map(convert_material)
            .unwrap_or_default();
        let entity = scene.add_object(&model.name, id, material)?;
        entities.push(entity);
    }
    info!("imported {} model(s) from {}", entities.len(), path.display());
    Ok(entities)
}

fn convert_mesh(name: &str, mesh: &tobj::Mesh) -> Mesh {
    let positions: Vec<Vector3<f32>> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| Vector3::new(p[0], p[1], p[2]))
        .collect();
    let uvs: Vec<Vector2<f32>> = if mesh.texcoords.len() == positions.len() * 2 {
        mesh.texcoords
            .chunks_exact(2)
            .map(|t| Vector2::new(t[0], t[1]))
            .collect()
    } else {
        vec![Vector2::new(0.0, 0.0); positions.len()]
    };
    let normals = if mesh.normals.len() == positions.len() * 3 {
        mesh.normals
            .chunks_exact(3)
            .map(|n| Vector3::new(n[0], n[1], n[2]))
            .collect()
    } else {
        reconstruct_normals(&positions, &mesh.indices)
    };
    Mesh::new(name, positions, uvs, normals, mesh.indices.clone())
}

/// Area-weighted vertex normals from face geometry.
fn reconstruct_normals(positions: &[Vector3<f32>], indices: &[u32]) -> Vec<Vector3<f32>> {
    let mut normals = vec![Vector3::new(0.0, 0.0, 0.0); positions.len()];
    for tri in indices.chunks_exact(3) {
        let a = positions[tri[0] as usize];
        let b = positions[tri[1] as usize];
        let c = positions[tri[2] as usize];
        let face = (b - a).cross(c - a);
        for &i in tri {
            normals[i as usize] += face;
        }
    }
    normals
        .into_iter()
        .map(|n| {
            if n.magnitude2() > 1e-12 {
                n.normalize()
            } else {
                Vector3::new(0.0, 1.0, 0.0)
            }
        })
        .collect()
}

fn convert_material(source: &tobj::Material) -> Material {
    let albedo = source
        .diffuse
        .map(|d| Vector3::new(d[0], d[1], d[2]))
        .unwrap_or_else(|| Vector3::new(0.8, 0.8, 0.8));
    // Invert shininess into a rough proxy for microfacet roughness.
    let roughness = source
        .shininess
        .map(|s| (1.0 - (s / 1000.0).clamp(0.0, 1.0)).max(0.05))
        .unwrap_or(0.5);
    Material::pbr(&source.name, albedo, 0.0, roughness)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_asset_missing() {
        let mut registry = MeshRegistry::new();
        let mut scene = Scene::new();
        let err = import_model(Path::new("/nonexistent/model.obj"), &mut registry, &mut scene)
            .unwrap_err();
        assert!(matches!(err, EngineError::AssetMissing { .. }));
    }

    #[test]
    fn imports_a_triangle_with_reconstructed_normals() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tri.obj");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "o tri").unwrap();
        writeln!(file, "v 0 0 0").unwrap();
        writeln!(file, "v 1 0 0").unwrap();
        writeln!(file, "v 0 0 -1").unwrap();
        writeln!(file, "f 1 2 3").unwrap();
        drop(file);

        let mut registry = MeshRegistry::new();
        let mut scene = Scene::new();
        let entities = import_model(&path, &mut registry, &mut scene).unwrap();
        assert_eq!(entities.len(), 1);
        assert_eq!(registry.len(), 1);
        let mesh = registry.get(crate::scene::mesh::MeshId(0));
        assert_eq!(mesh.triangle_count(), 1);
        // CCW in XZ seen from +Y.
        assert!(mesh.vertices()[0].normal.y > 0.9);
    }
}
