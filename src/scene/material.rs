//! Material system
//!
//! Materials are a tagged variant per shading model (redesign of the usual
//! inheritance-per-kind hierarchy): PBR standard, Lambert, single-scattering
//! volume, and skybox. Each material is backed by exactly one GPU data
//! block; every setter mutates in place and flags the material dirty so the
//! block manager re-uploads it before the next dispatch.

use cgmath::Vector3;

/// Kind tag matching the `kind` field of the uploaded material block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterialKind {
    Pbr,
    Lambert,
    Volume,
    Skybox,
}

/// Per-kind shading parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterialParams {
    /// Microfacet GGX with Smith visibility and Fresnel-Schlick.
    Pbr {
        albedo: Vector3<f32>,
        metallic: f32,
        roughness: f32,
        ao: f32,
        emissive: Vector3<f32>,
    },
    /// Ideal diffuse: albedo / pi.
    Lambert { albedo: Vector3<f32> },
    /// Homogeneous single-scattering medium with a Henyey-Greenstein phase
    /// function. `asymmetry` is the HG `g` parameter: 0 is isotropic,
    /// positive is forward-peaked, negative back-peaked.
    Volume {
        albedo: Vector3<f32>,
        sigma_t: f32,
        asymmetry: f32,
    },
    /// Emits the environment radiance; used on inside-out backdrop geometry.
    Skybox,
}

/// A scene material: parameter variant plus dirty state for block upload.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    params: MaterialParams,
    dirty: bool,
}

impl Default for Material {
    fn default() -> Self {
        Self::pbr(
            "default",
            Vector3::new(0.8, 0.8, 0.8),
            0.0,
            0.5,
        )
    }
}

impl Material {
    /// Creates a PBR standard material.
    pub fn pbr(name: &str, albedo: Vector3<f32>, metallic: f32, roughness: f32) -> Self {
        Self {
            name: name.to_string(),
            params: MaterialParams::Pbr {
                albedo,
                metallic: metallic.clamp(0.0, 1.0),
                roughness: roughness.clamp(0.0, 1.0),
                ao: 1.0,
                emissive: Vector3::new(0.0, 0.0, 0.0),
            },
            dirty: true,
        }
    }

    /// Creates an ideal diffuse material.
    pub fn lambert(name: &str, albedo: Vector3<f32>) -> Self {
        Self {
            name: name.to_string(),
            params: MaterialParams::Lambert { albedo },
            dirty: true,
        }
    }

    /// Creates a homogeneous volume material.
    pub fn volume(name: &str, albedo: Vector3<f32>, sigma_t: f32, asymmetry: f32) -> Self {
        Self {
            name: name.to_string(),
            params: MaterialParams::Volume {
                albedo,
                sigma_t: sigma_t.max(0.0),
                asymmetry: asymmetry.clamp(-0.999, 0.999),
            },
            dirty: true,
        }
    }

    /// Creates a skybox material.
    pub fn skybox(name: &str) -> Self {
        Self {
            name: name.to_string(),
            params: MaterialParams::Skybox,
            dirty: true,
        }
    }

    pub fn kind(&self) -> MaterialKind {
        match self.params {
            MaterialParams::Pbr { .. } => MaterialKind::Pbr,
            MaterialParams::Lambert { .. } => MaterialKind::Lambert,
            MaterialParams::Volume { .. } => MaterialKind::Volume,
            MaterialParams::Skybox => MaterialKind::Skybox,
        }
    }

    pub fn params(&self) -> &MaterialParams {
        &self.params
    }

    /// Sets the albedo on PBR, Lambert and volume materials; ignored (with a
    /// warning) on skyboxes.
    pub fn set_albedo(&mut self, value: Vector3<f32>) {
        match &mut self.params {
            MaterialParams::Pbr { albedo, .. }
            | MaterialParams::Lambert { albedo }
            | MaterialParams::Volume { albedo, .. } => {
                *albedo = value;
                self.dirty = true;
            }
            MaterialParams::Skybox => {
                log::warn!("set_albedo on skybox material '{}' ignored", self.name);
            }
        }
    }

    pub fn set_metallic(&mut self, value: f32) {
        if let MaterialParams::Pbr { metallic, .. } = &mut self.params {
            *metallic = value.clamp(0.0, 1.0);
            self.dirty = true;
        }
    }

    pub fn set_roughness(&mut self, value: f32) {
        if let MaterialParams::Pbr { roughness, .. } = &mut self.params {
            *roughness = value.clamp(0.0, 1.0);
            self.dirty = true;
        }
    }

    pub fn set_ao(&mut self, value: f32) {
        if let MaterialParams::Pbr { ao, .. } = &mut self.params {
            *ao = value.clamp(0.0, 1.0);
            self.dirty = true;
        }
    }

    pub fn set_emissive(&mut self, value: Vector3<f32>) {
        if let MaterialParams::Pbr { emissive, .. } = &mut self.params {
            *emissive = value;
            self.dirty = true;
        }
    }

    pub fn set_asymmetry(&mut self, value: f32) {
        if let MaterialParams::Volume { asymmetry, .. } = &mut self.params {
            *asymmetry = value.clamp(-0.999, 0.999);
            self.dirty = true;
        }
    }

    /// Whether the backing data block needs re-upload.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clears the dirty flag after the block has been copied out.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Emissive radiance of the material, zero for non-emissive kinds.
    pub fn emission(&self) -> Vector3<f32> {
        match self.params {
            MaterialParams::Pbr { emissive, .. } => emissive,
            _ => Vector3::new(0.0, 0.0, 0.0),
        }
    }

    pub fn is_emissive(&self) -> bool {
        let e = self.emission();
        e.x > 0.0 || e.y > 0.0 || e.z > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_mark_dirty() {
        let mut material = Material::pbr("m", Vector3::new(0.5, 0.5, 0.5), 0.0, 0.4);
        material.clear_dirty();
        assert!(!material.is_dirty());
        material.set_roughness(0.8);
        assert!(material.is_dirty());
    }

    #[test]
    fn kind_setters_ignore_foreign_variants() {
        let mut material = Material::lambert("m", Vector3::new(0.6, 0.6, 0.6));
        material.clear_dirty();
        material.set_metallic(1.0); // no metallic on lambert
        assert!(!material.is_dirty());
        assert_eq!(material.kind(), MaterialKind::Lambert);
    }

    #[test]
    fn pbr_parameters_clamp_to_unit_range() {
        let material = Material::pbr("m", Vector3::new(1.0, 1.0, 1.0), 2.0, -1.0);
        match material.params() {
            MaterialParams::Pbr {
                metallic,
                roughness,
                ..
            } => {
                assert_eq!(*metallic, 1.0);
                assert_eq!(*roughness, 0.0);
            }
            _ => unreachable!(),
        }
    }
}
