//! Batched progressive renderer
//!
//! Drives the whole pipeline for one render job: uploads dirty data blocks
//! into the per-frame device buffers, keeps the acceleration structures in
//! sync with the flattened scene, dispatches sample batches across a rayon
//! pool, folds each batch into the film's running average, and finally
//! denoises and writes the output image.

use std::path::PathBuf;

use bytemuck::Zeroable;
use cgmath::{InnerSpace, Vector3};
use log::{error, info, warn};
use rayon::prelude::*;

use crate::accel::AccelStructures;
use crate::core::error::EngineError;
use crate::gpu::data_block::DataBlockManager;
use crate::gpu::layouts::{light_kind, material_kind, LightBlock, MaterialBlock, ObjectDescBlock};
use crate::render::denoise::{BilateralDenoiser, Denoiser};
use crate::render::film::Film;
use crate::render::info::RenderInfo;
use crate::render::integrator::{self, EmitterTable, TraceContext};
use crate::render::{export, sampler};
use crate::scene::light::LightParams;
use crate::scene::material::MaterialParams;
use crate::scene::mesh::MeshRegistry;
use crate::scene::scene::{RenderObject, Scene};

/// Frame slots cycled between dispatches so uploads for the next batch
/// never stomp a buffer still in use.
const FRAMES_IN_FLIGHT: usize = 2;
/// Device uniform-offset alignment the block managers pad to.
const BLOCK_ALIGNMENT: usize = 256;

/// Where a render job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Idle,
    /// Tracing batch `batch` of `of` (1-based).
    Rendering { batch: u32, of: u32 },
    Denoising,
    /// The output file exists; the next job returns the tracer to `Idle`.
    Written,
}

/// The progressive path tracer and its device-side state.
pub struct PathTracer {
    pub info: RenderInfo,
    state: RenderState,
    frame_index: usize,
    materials: DataBlockManager<MaterialBlock>,
    lights: DataBlockManager<LightBlock>,
    object_descs: DataBlockManager<ObjectDescBlock>,
    accel: AccelStructures,
    denoiser: Box<dyn Denoiser>,
    /// Light slots written last sync, so removed lights get zeroed.
    live_light_slots: Vec<u32>,
}

impl PathTracer {
    /// Creates the tracer and allocates its per-frame device buffers for up
    /// to `capacity` materials, lights and object descriptors.
    pub fn new(capacity: usize) -> Result<Self, EngineError> {
        let mut materials = DataBlockManager::new("materials", BLOCK_ALIGNMENT, capacity);
        let mut lights = DataBlockManager::new("lights", BLOCK_ALIGNMENT, capacity);
        let mut object_descs = DataBlockManager::new("object descs", BLOCK_ALIGNMENT, capacity);
        materials.create_buffers(FRAMES_IN_FLIGHT)?;
        lights.create_buffers(FRAMES_IN_FLIGHT)?;
        object_descs.create_buffers(FRAMES_IN_FLIGHT)?;
        Ok(Self {
            info: RenderInfo::default(),
            state: RenderState::Idle,
            frame_index: 0,
            materials,
            lights,
            object_descs,
            accel: AccelStructures::new(),
            denoiser: Box::new(BilateralDenoiser::default()),
            live_light_slots: Vec::new(),
        })
    }

    pub fn state(&self) -> RenderState {
        self.state
    }

    pub fn set_denoiser(&mut self, denoiser: Box<dyn Denoiser>) {
        self.denoiser = denoiser;
    }

    /// Runs one full render job over `scene` and returns the path of the
    /// final image. On acceleration-structure failure the frame is skipped
    /// and the error surfaced; the tracer stays usable.
    pub fn render(
        &mut self,
        scene: &mut Scene,
        registry: &MeshRegistry,
    ) -> Result<PathBuf, EngineError> {
        // A new job leaves the previous job's terminal state behind.
        self.state = RenderState::Idle;
        if self.info.width == 0 || self.info.height == 0 {
            return Err(EngineError::device("zero-sized render target"));
        }

        scene.update();
        let render_objects = scene.flatten();

        if let Err(e) = self.accel.sync(registry, &render_objects) {
            error!("acceleration structure sync failed, skipping frame: {e}");
            self.state = RenderState::Idle;
            return Err(e);
        }

        self.upload_materials(scene);
        let (light_len, emitters) = self.upload_lights(scene, registry, &render_objects);
        self.upload_object_descs();

        let width = self.info.width;
        let height = self.info.height;
        let aspect = width as f32 / height as f32;
        let seed = self.info.seed;
        let batches = self.info.batch_count();
        let pixel_count = (width * height) as usize;
        let mut film = Film::new(width, height);

        info!(
            "render start: {}x{}, {} spp in {} batches",
            width, height, self.info.samples, batches
        );

        for batch in 0..batches {
            self.state = RenderState::Rendering { batch: batch + 1, of: batches };
            let frame = self.frame_index % FRAMES_IN_FLIGHT;
            self.materials.flush(frame);
            self.lights.flush(frame);
            self.object_descs.flush(frame);

            // Per-dispatch views read back out of the frame's buffers, the
            // same data the shading stage would see.
            let material_view = read_blocks::<MaterialBlock>(&self.materials, frame);
            let light_view = read_blocks::<LightBlock>(&self.lights, frame)
                .into_iter()
                .take(light_len)
                .collect::<Vec<_>>();
            let desc_view = read_blocks::<ObjectDescBlock>(&self.object_descs, frame);

            let ctx = TraceContext {
                accel: &self.accel,
                meshes: registry,
                materials: &material_view,
                lights: &light_view,
                descs: &desc_view,
                emitters: &emitters,
                environment: &scene.environment,
            };
            let camera = &scene.camera;

            let sample_start = film.samples_done();
            let batch_samples = self
                .info
                .batch_size
                .max(1)
                .min(self.info.samples - sample_start);

            let sums: Vec<Vector3<f64>> = (0..pixel_count)
                .into_par_iter()
                .map(|i| {
                    let x = (i as u32) % width;
                    let y = (i as u32) / width;
                    let mut rng = sampler::pixel_rng(seed, i as u64, sample_start);
                    let mut sum = Vector3::new(0.0f64, 0.0, 0.0);
                    for _ in 0..batch_samples {
                        let jx: f32 = rand::Rng::random(&mut rng);
                        let jy: f32 = rand::Rng::random(&mut rng);
                        let s = (x as f32 + jx) / width as f32;
                        let t = (y as f32 + jy) / height as f32;
                        let ray = camera.primary_ray(s, t, aspect);
                        let c = integrator::trace(&ctx, ray, &mut rng);
                        sum += Vector3::new(c.x as f64, c.y as f64, c.z as f64);
                    }
                    sum
                })
                .collect();

            film.accumulate(&sums, batch_samples);
            self.frame_index += 1;

            if self.info.write_all_files {
                let path = self.info.batch_output_path(batch + 1);
                export::write_image(
                    &path,
                    self.info.file_type,
                    width,
                    height,
                    &film.snapshot(),
                )?;
            }
        }

        let pixels = if self.info.denoise {
            self.state = RenderState::Denoising;
            self.denoiser.denoise(width, height, &film.snapshot())
        } else {
            film.snapshot()
        };

        let path = self.info.output_path();
        let written = export::write_image(&path, self.info.file_type, width, height, &pixels)?;
        self.state = RenderState::Written;
        info!("render done: {} spp", film.samples_done());
        Ok(written)
    }

    /// Pushes dirty materials into their data blocks, clearing the dirty
    /// flags. Slot index is the material's pool slot.
    fn upload_materials(&mut self, scene: &mut Scene) {
        for (slot, material) in scene.components_mut().materials_mut() {
            if !material.is_dirty() {
                continue;
            }
            self.materials.set_block(slot, material_block(material.params()));
            material.clear_dirty();
        }
    }

    /// Rebuilds the light block array from the scene, zeroing slots whose
    /// lights were removed, and builds area-sampling tables for mesh
    /// emitters. Returns the live prefix length of the light array and the
    /// emitter tables.
    fn upload_lights(
        &mut self,
        scene: &Scene,
        registry: &MeshRegistry,
        render_objects: &[RenderObject],
    ) -> (usize, Vec<EmitterTable>) {
        let mut live = Vec::new();
        let mut emitters = Vec::new();
        let mut light_len = 0usize;

        for (object, slot, light) in scene.lights() {
            let mut block = LightBlock {
                color: light.color.into(),
                kind: 0,
                vector: [0.0; 3],
                intensity: light.intensity,
                instance: 0,
                material_slot: 0,
                _padding: [0; 2],
            };
            match light.params() {
                LightParams::Point => {
                    block.kind = light_kind::POINT;
                    block.vector = object.world().w.truncate().into();
                }
                LightParams::Directional { direction } => {
                    block.kind = light_kind::DIRECTIONAL;
                    block.vector = direction.normalize().into();
                }
                LightParams::MeshEmissive => {
                    let Some(instance) = render_objects
                        .iter()
                        .position(|ro| ro.entity == object.entity)
                    else {
                        warn!("mesh light on {} has no renderable mesh, skipped", object.name);
                        continue;
                    };
                    let mesh = registry.get(render_objects[instance].mesh);
                    if mesh.triangle_count() == 0 {
                        warn!("mesh light on {} has an empty mesh, skipped", object.name);
                        continue;
                    }
                    block.kind = light_kind::MESH_EMISSIVE;
                    block.instance = instance as u32;
                    block.material_slot = render_objects[instance].material_slot;
                    emitters.push(EmitterTable::build(
                        slot as usize,
                        instance as u32,
                        mesh,
                        &render_objects[instance].transform,
                    ));
                }
            }
            self.lights.set_block(slot as usize, block);
            live.push(slot);
            light_len = light_len.max(slot as usize + 1);
        }

        for stale in &self.live_light_slots {
            if !live.contains(stale) {
                self.lights.set_block(*stale as usize, LightBlock::zeroed());
            }
        }
        self.live_light_slots = live;
        (light_len, emitters)
    }

    /// Copies the object descriptors built by the last acceleration sync
    /// into their data blocks.
    fn upload_object_descs(&mut self) {
        let descs: Vec<ObjectDescBlock> = self.accel.object_descs().to_vec();
        for (i, desc) in descs.iter().enumerate() {
            if *self.object_descs.block(i) != *desc {
                self.object_descs.set_block(i, *desc);
            }
        }
    }

    pub fn accel(&self) -> &AccelStructures {
        &self.accel
    }
}

/// Reads every block of a manager back out of one frame's device buffer.
fn read_blocks<B: bytemuck::Pod>(manager: &DataBlockManager<B>, frame: usize) -> Vec<B> {
    (0..manager.block_count())
        .map(|i| {
            let bytes = manager.block_bytes(frame, i);
            bytemuck::pod_read_unaligned(&bytes[..std::mem::size_of::<B>()])
        })
        .collect()
}

fn material_block(params: &MaterialParams) -> MaterialBlock {
    let mut block = MaterialBlock::zeroed();
    match params {
        MaterialParams::Pbr {
            albedo,
            metallic,
            roughness,
            ao,
            emissive,
        } => {
            block.kind = material_kind::PBR;
            block.albedo = (*albedo).into();
            block.metallic = *metallic;
            block.roughness = *roughness;
            block.ao = *ao;
            block.emissive = (*emissive).into();
        }
        MaterialParams::Lambert { albedo } => {
            block.kind = material_kind::LAMBERT;
            block.albedo = (*albedo).into();
        }
        MaterialParams::Volume {
            albedo,
            sigma_t,
            asymmetry,
        } => {
            block.kind = material_kind::VOLUME;
            block.albedo = (*albedo).into();
            block.sigma_t = *sigma_t;
            block.asymmetry = *asymmetry;
        }
        MaterialParams::Skybox => {
            block.kind = material_kind::SKYBOX;
        }
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;

    #[test]
    fn material_block_carries_the_variant_tag() {
        let block = material_block(&MaterialParams::Volume {
            albedo: Vector3::new(0.9, 0.8, 0.7),
            sigma_t: 2.0,
            asymmetry: 0.3,
        });
        assert_eq!(block.kind, material_kind::VOLUME);
        assert_eq!(block.sigma_t, 2.0);
        assert_eq!(block.asymmetry, 0.3);
    }

    #[test]
    fn fresh_tracer_is_idle() {
        let tracer = PathTracer::new(64).unwrap();
        assert_eq!(tracer.state(), RenderState::Idle);
    }

    #[test]
    fn next_job_leaves_the_written_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracer = PathTracer::new(8).unwrap();
        tracer.info.width = 4;
        tracer.info.height = 4;
        tracer.info.samples = 1;
        tracer.info.batch_size = 1;
        tracer.info.filename = dir.path().join("blank").display().to_string();

        let mut scene = Scene::new();
        let registry = MeshRegistry::new();
        tracer.render(&mut scene, &registry).unwrap();
        assert_eq!(tracer.state(), RenderState::Written);

        // A rejected job still moves the machine back through Idle.
        tracer.info.width = 0;
        assert!(tracer.render(&mut scene, &registry).is_err());
        assert_eq!(tracer.state(), RenderState::Idle);
    }
}
