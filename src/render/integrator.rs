//! Path-tracing integrator
//!
//! Iterative path tracer with next-event estimation. Hit shading dispatches
//! on the material block's `kind` tag: Lambert and PBR surfaces bounce with
//! importance-sampled BSDFs, volume surfaces switch the path into the
//! enclosed medium for single scattering, skybox surfaces terminate into
//! the environment. Analytic lights (point, directional) and mesh emitters
//! are sampled directly with shadow rays; environment radiance is collected
//! when a path escapes.

use cgmath::{InnerSpace, Matrix, Matrix4, Vector3, Vector4};
use rand::rngs::SmallRng;
use rand::Rng;

use crate::accel::{AccelStructures, Hit, Ray};
use crate::gpu::layouts::{light_kind, material_kind, LightBlock, MaterialBlock, ObjectDescBlock};
use crate::render::brdf;
use crate::scene::environment::Environment;
use crate::scene::mesh::{Mesh, MeshId, MeshRegistry};

/// Hard bounce cap.
pub const MAX_DEPTH: u32 = 8;
/// Depth at which Russian roulette starts terminating paths.
pub const RR_DEPTH: u32 = 4;
/// Self-intersection guard for secondary and shadow rays.
pub const RAY_EPS: f32 = 1e-4;

/// Area-sampling table for one mesh emitter: world-space triangles with a
/// cumulative area distribution.
pub struct EmitterTable {
    /// Index into the light block array.
    pub light: usize,
    /// TLAS instance of the emitting object.
    pub instance: u32,
    triangles: Vec<[Vector3<f32>; 3]>,
    cdf: Vec<f32>,
    total_area: f32,
}

impl EmitterTable {
    pub fn build(light: usize, instance: u32, mesh: &Mesh, transform: &Matrix4<f32>) -> Self {
        let count = mesh.triangle_count() as usize;
        let mut triangles = Vec::with_capacity(count);
        let mut cdf = Vec::with_capacity(count);
        let mut total_area = 0.0f32;
        for i in 0..count {
            let [a, b, c] = mesh.triangle(i);
            let tri = [
                transform_point(transform, a),
                transform_point(transform, b),
                transform_point(transform, c),
            ];
            total_area += 0.5 * (tri[1] - tri[0]).cross(tri[2] - tri[0]).magnitude();
            triangles.push(tri);
            cdf.push(total_area);
        }
        Self {
            light,
            instance,
            triangles,
            cdf,
            total_area,
        }
    }

    /// Uniform-by-area point on the emitter: position, geometric normal and
    /// the area pdf.
    fn sample(&self, rng: &mut SmallRng) -> (Vector3<f32>, Vector3<f32>, f32) {
        let pick = rng.random::<f32>() * self.total_area;
        let idx = self.cdf.partition_point(|&c| c < pick).min(self.triangles.len() - 1);
        let [a, b, c] = self.triangles[idx];
        let mut u: f32 = rng.random();
        let mut v: f32 = rng.random();
        if u + v > 1.0 {
            u = 1.0 - u;
            v = 1.0 - v;
        }
        let p = a + (b - a) * u + (c - a) * v;
        let n = (b - a).cross(c - a).normalize();
        (p, n, 1.0 / self.total_area.max(1e-8))
    }
}

fn transform_point(m: &Matrix4<f32>, p: Vector3<f32>) -> Vector3<f32> {
    (m * Vector4::new(p.x, p.y, p.z, 1.0)).truncate()
}

/// Everything one radiance query reads: acceleration structures, the
/// per-dispatch views of the uploaded data blocks, and the environment.
pub struct TraceContext<'a> {
    pub accel: &'a AccelStructures,
    pub meshes: &'a MeshRegistry,
    pub materials: &'a [MaterialBlock],
    pub lights: &'a [LightBlock],
    pub descs: &'a [ObjectDescBlock],
    pub emitters: &'a [EmitterTable],
    pub environment: &'a Environment,
}

struct Shading {
    position: Vector3<f32>,
    /// Interpolated vertex normal, world space, flipped toward the viewer.
    normal: Vector3<f32>,
    /// Triangle plane normal, world space, used for ray offsets.
    geometric: Vector3<f32>,
    entering: bool,
    material_slot: u32,
}

impl<'a> TraceContext<'a> {
    fn resolve(&self, ray: &Ray, hit: &Hit) -> Shading {
        let desc = &self.descs[hit.instance as usize];
        let mesh = self.meshes.get(MeshId(desc.mesh));
        let indices = mesh.indices();
        let base = hit.triangle as usize * 3;
        let v0 = &mesh.vertices()[indices[base] as usize];
        let v1 = &mesh.vertices()[indices[base + 1] as usize];
        let v2 = &mesh.vertices()[indices[base + 2] as usize];

        let w = 1.0 - hit.u - hit.v;
        let local_normal = v0.normal * w + v1.normal * hit.u + v2.normal * hit.v;
        let local_geom = (v1.position - v0.position)
            .cross(v2.position - v0.position)
            .normalize();

        let instance = self.accel.instance(hit.instance);
        let normal_matrix = instance.inverse.transpose();
        let mut normal = (normal_matrix * local_normal.extend(0.0)).truncate().normalize();
        let mut geometric = (normal_matrix * local_geom.extend(0.0)).truncate().normalize();

        let entering = ray.direction.dot(geometric) < 0.0;
        if ray.direction.dot(normal) > 0.0 {
            normal = -normal;
        }
        if !entering {
            geometric = -geometric;
        }
        Shading {
            position: ray.at(hit.t),
            normal,
            geometric,
            entering,
            material_slot: desc.material_slot,
        }
    }

    /// Mesh emitter owning `instance`, if any.
    fn emitter_for(&self, instance: u32) -> Option<&EmitterTable> {
        self.emitters.iter().find(|e| e.instance == instance)
    }

    /// Direct lighting at a surface point. `eval` maps a light direction to
    /// the BSDF value times the surface cosine.
    fn direct_light(
        &self,
        position: Vector3<f32>,
        offset_normal: Vector3<f32>,
        rng: &mut SmallRng,
        eval: impl Fn(Vector3<f32>) -> Vector3<f32>,
    ) -> Vector3<f32> {
        let origin = position + offset_normal * RAY_EPS;
        let mut sum = Vector3::new(0.0, 0.0, 0.0);
        for (i, light) in self.lights.iter().enumerate() {
            let radiance = Vector3::from(light.color) * light.intensity;
            match light.kind {
                light_kind::POINT => {
                    let to_light = Vector3::from(light.vector) - position;
                    let dist2 = to_light.magnitude2();
                    if dist2 <= 1e-8 {
                        continue;
                    }
                    let dist = dist2.sqrt();
                    let wi = to_light / dist;
                    let f = eval(wi);
                    if f.magnitude2() <= 0.0 {
                        continue;
                    }
                    let shadow = Ray::new(origin, wi);
                    if !self.accel.occluded(&shadow, RAY_EPS, dist - RAY_EPS) {
                        sum += mul(f, radiance) / dist2;
                    }
                }
                light_kind::DIRECTIONAL => {
                    let wi = -Vector3::from(light.vector).normalize();
                    let f = eval(wi);
                    if f.magnitude2() <= 0.0 {
                        continue;
                    }
                    let shadow = Ray::new(origin, wi);
                    if !self.accel.occluded(&shadow, RAY_EPS, f32::MAX) {
                        sum += mul(f, radiance);
                    }
                }
                light_kind::MESH_EMISSIVE => {
                    let Some(table) = self.emitters.iter().find(|e| e.light == i) else {
                        continue;
                    };
                    let (y, ny, pdf_area) = table.sample(rng);
                    let to_light = y - position;
                    let dist2 = to_light.magnitude2();
                    if dist2 <= 1e-8 {
                        continue;
                    }
                    let dist = dist2.sqrt();
                    let wi = to_light / dist;
                    let cos_light = ny.dot(-wi).abs();
                    if cos_light <= 0.0 {
                        continue;
                    }
                    let f = eval(wi);
                    if f.magnitude2() <= 0.0 {
                        continue;
                    }
                    let shadow = Ray::new(origin, wi);
                    if !self.accel.occluded(&shadow, RAY_EPS, dist - 2.0 * RAY_EPS) {
                        let g = cos_light / dist2;
                        sum += mul(f, radiance) * (g / pdf_area);
                    }
                }
                _ => {}
            }
        }
        sum
    }

    /// Direct lighting at an in-scattering point. The shadow ray first has
    /// to cross the medium's own boundary; that crossing attenuates by the
    /// transmittance instead of counting as occlusion.
    fn direct_light_in_medium(
        &self,
        point: Vector3<f32>,
        w: Vector3<f32>,
        medium: &Medium,
        rng: &mut SmallRng,
    ) -> Vector3<f32> {
        let mut sum = Vector3::new(0.0, 0.0, 0.0);
        for (i, light) in self.lights.iter().enumerate() {
            let radiance = Vector3::from(light.color) * light.intensity;
            let (wi, dist, geometry) = match light.kind {
                light_kind::POINT => {
                    let to_light = Vector3::from(light.vector) - point;
                    let dist2 = to_light.magnitude2();
                    if dist2 <= 1e-8 {
                        continue;
                    }
                    (to_light / dist2.sqrt(), dist2.sqrt(), 1.0 / dist2)
                }
                light_kind::DIRECTIONAL => {
                    (-Vector3::from(light.vector).normalize(), f32::MAX, 1.0)
                }
                light_kind::MESH_EMISSIVE => {
                    let Some(table) = self.emitters.iter().find(|e| e.light == i) else {
                        continue;
                    };
                    let (y, ny, pdf_area) = table.sample(rng);
                    let to_light = y - point;
                    let dist2 = to_light.magnitude2();
                    if dist2 <= 1e-8 {
                        continue;
                    }
                    let dist = dist2.sqrt();
                    let wi = to_light / dist;
                    let cos_light = ny.dot(-wi).abs();
                    if cos_light <= 0.0 {
                        continue;
                    }
                    (wi, dist, cos_light / (dist2 * pdf_area))
                }
                _ => continue,
            };
            let Some(transmittance) = self.medium_transmittance(point, wi, dist, medium) else {
                continue;
            };
            let phase = brdf::hg_phase(w.dot(wi), medium.asymmetry);
            sum += radiance * (phase * transmittance * geometry);
        }
        sum
    }

    /// Transmittance along a shadow ray leaving the medium, or `None` when
    /// the path to the light is blocked by other geometry.
    fn medium_transmittance(
        &self,
        point: Vector3<f32>,
        wi: Vector3<f32>,
        dist: f32,
        medium: &Medium,
    ) -> Option<f32> {
        let shadow = Ray::new(point, wi);
        match self.accel.intersect(&shadow, RAY_EPS, dist - RAY_EPS) {
            Some(h) if h.instance == medium.instance => {
                let transmittance = (-medium.sigma_t * h.t).exp();
                let exit = shadow.at(h.t) + wi * RAY_EPS;
                let remaining = if dist == f32::MAX { f32::MAX } else { dist - h.t - 2.0 * RAY_EPS };
                let blocked = self.accel.occluded(&Ray::new(exit, wi), RAY_EPS, remaining);
                (!blocked).then_some(transmittance)
            }
            Some(_) => None,
            None => Some(1.0),
        }
    }
}

fn mul(a: Vector3<f32>, b: Vector3<f32>) -> Vector3<f32> {
    Vector3::new(a.x * b.x, a.y * b.y, a.z * b.z)
}

/// Active homogeneous medium state for a path segment.
struct Medium {
    instance: u32,
    albedo: Vector3<f32>,
    sigma_t: f32,
    asymmetry: f32,
    /// Single scattering: after one scatter event the path transmits
    /// straight out of the medium.
    scattered: bool,
}

/// Traces one camera-ray path and returns its radiance estimate.
pub fn trace(ctx: &TraceContext, mut ray: Ray, rng: &mut SmallRng) -> Vector3<f32> {
    let mut radiance = Vector3::new(0.0, 0.0, 0.0);
    let mut throughput = Vector3::new(1.0, 1.0, 1.0);
    let mut medium: Option<Medium> = None;

    for depth in 0..MAX_DEPTH {
        let hit = ctx.accel.intersect(&ray, RAY_EPS, f32::MAX);

        // Distance sampling inside the active medium.
        if let Some(active) = medium.as_mut() {
            if !active.scattered && active.sigma_t > 0.0 {
                let boundary = hit.as_ref().map(|h| h.t).unwrap_or(f32::MAX);
                let xi: f32 = rng.random();
                let d = -(1.0 - xi).max(1e-12).ln() / active.sigma_t;
                if d < boundary {
                    let point = ray.at(d);
                    throughput = mul(throughput, active.albedo);
                    let w = ray.direction;
                    let g = active.asymmetry;
                    radiance += mul(throughput, ctx.direct_light_in_medium(point, w, active, rng));
                    active.scattered = true;
                    ray = Ray::new(point, brdf::hg_sample(w, g, rng));
                    continue;
                }
            }
        }

        let Some(hit) = hit else {
            radiance += mul(throughput, ctx.environment.radiance(ray.direction));
            break;
        };

        let shading = ctx.resolve(&ray, &hit);
        let material = &ctx.materials[shading.material_slot as usize];

        match material.kind {
            material_kind::SKYBOX => {
                radiance += mul(throughput, ctx.environment.radiance(ray.direction));
                break;
            }
            material_kind::VOLUME => {
                if shading.entering && medium.is_none() {
                    medium = Some(Medium {
                        instance: hit.instance,
                        albedo: Vector3::from(material.albedo),
                        sigma_t: material.sigma_t,
                        asymmetry: material.asymmetry,
                        scattered: false,
                    });
                    ray = Ray::new(shading.position - shading.geometric * RAY_EPS, ray.direction);
                } else {
                    // Leaving (or re-crossing) the medium boundary.
                    if medium.as_ref().is_some_and(|m| m.instance == hit.instance) {
                        medium = None;
                    }
                    ray = Ray::new(shading.position - shading.geometric * RAY_EPS, ray.direction);
                }
                continue;
            }
            _ => {}
        }

        // Direct emitter hits count only for camera rays; later bounces are
        // covered by next-event estimation.
        if depth == 0 {
            if let Some(table) = ctx.emitter_for(hit.instance) {
                let light = &ctx.lights[table.light];
                radiance += mul(throughput, Vector3::from(light.color) * light.intensity);
            }
        }
        // Material emission has no sampling table, so it is collected on
        // hit at every depth.
        let emissive = Vector3::from(material.emissive);
        if emissive.magnitude2() > 0.0 {
            radiance += mul(throughput, emissive);
        }

        let n = shading.normal;
        let v = -ray.direction;
        let albedo = Vector3::from(material.albedo);

        let sample = match material.kind {
            material_kind::LAMBERT => {
                radiance += mul(
                    throughput,
                    ctx.direct_light(shading.position, shading.geometric, rng, |wi| {
                        let cos = n.dot(wi).max(0.0);
                        albedo * (cos / std::f32::consts::PI)
                    }),
                );
                // Cosine sampling makes the weight exactly the albedo.
                Some(brdf::BsdfSample {
                    direction: brdf::sample_cosine(n, rng),
                    weight: albedo,
                })
            }
            _ => {
                let metallic = material.metallic;
                let roughness = material.roughness;
                radiance += mul(
                    throughput,
                    ctx.direct_light(shading.position, shading.geometric, rng, |wi| {
                        let cos = n.dot(wi).max(0.0);
                        brdf::pbr_eval(albedo, metallic, roughness, n, v, wi) * cos
                    }) * material.ao,
                );
                brdf::pbr_sample(albedo, metallic, roughness, n, v, rng)
            }
        };

        let Some(sample) = sample else { break };
        throughput = mul(throughput, sample.weight);
        if throughput.magnitude2() <= 0.0 {
            break;
        }

        if depth + 1 >= RR_DEPTH {
            let survive = throughput.x.max(throughput.y).max(throughput.z).clamp(0.05, 0.95);
            if rng.random::<f32>() >= survive {
                break;
            }
            throughput /= survive;
        }

        ray = Ray::new(shading.position + shading.geometric * RAY_EPS, sample.direction);
    }

    radiance
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitter_table_area_is_exact_for_a_unit_quad() {
        let mesh = crate::scene::mesh::generate_plane(2.0, 2.0);
        let table = EmitterTable::build(0, 0, &mesh, &Matrix4::from_scale(1.0));
        assert!((table.total_area - 4.0).abs() < 1e-4);
    }

    #[test]
    fn emitter_samples_lie_on_the_quad() {
        use rand::SeedableRng;
        let mesh = crate::scene::mesh::generate_plane(2.0, 2.0);
        let table = EmitterTable::build(0, 0, &mesh, &Matrix4::from_scale(1.0));
        let mut rng = SmallRng::seed_from_u64(3);
        for _ in 0..100 {
            let (p, n, pdf) = table.sample(&mut rng);
            assert!(p.y.abs() < 1e-5);
            assert!(p.x.abs() <= 1.0 + 1e-5 && p.z.abs() <= 1.0 + 1e-5);
            assert!((n.y.abs() - 1.0).abs() < 1e-5);
            assert!((pdf - 0.25).abs() < 1e-5);
        }
    }
}
