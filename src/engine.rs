//! Engine facade
//!
//! Owns the scene, the mesh registry and the path tracer, plus a background
//! update loop on its own thread. The loop is driven over a command channel
//! (start, stop, sync, exit) instead of shared flags; scene access from
//! both sides goes through one mutex.

use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::asset;
use crate::core::error::EngineError;
use crate::ecs::EntityId;
use crate::render::renderer::{PathTracer, RenderState};
use crate::render::RenderInfo;
use crate::scene::mesh::{Mesh, MeshId, MeshRegistry};
use crate::scene::scene::Scene;

/// Update-loop tick period.
const TICK: Duration = Duration::from_millis(16);

/// Per-tick scene callback run by the update loop while it is started.
pub type UpdateFn = Box<dyn FnMut(&mut Scene, f32) + Send>;

enum LoopCommand {
    Start,
    Stop,
    /// Reply once every command sent before this one has been processed
    /// and the current tick has finished.
    Sync(Sender<()>),
    Exit,
}

/// Top-level handle: scene authoring, asset import, and rendering.
pub struct Engine {
    scene: Arc<Mutex<Scene>>,
    registry: MeshRegistry,
    tracer: PathTracer,
    update: Arc<Mutex<Option<UpdateFn>>>,
    commands: Sender<LoopCommand>,
    loop_thread: Option<JoinHandle<()>>,
}

impl Engine {
    pub fn new() -> Result<Self, EngineError> {
        Self::with_capacity(1024)
    }

    /// Creates an engine sized for `capacity` entities per component kind.
    /// Spawns the update-loop thread; it idles until [`start`](Self::start).
    pub fn with_capacity(capacity: usize) -> Result<Self, EngineError> {
        let scene = Arc::new(Mutex::new(Scene::with_capacity(capacity)));
        let update: Arc<Mutex<Option<UpdateFn>>> = Arc::new(Mutex::new(None));
        let (commands, receiver) = mpsc::channel();

        let loop_scene = Arc::clone(&scene);
        let loop_update = Arc::clone(&update);
        let loop_thread = std::thread::Builder::new()
            .name("braw-update".to_string())
            .spawn(move || update_loop(loop_scene, loop_update, receiver))?;

        Ok(Self {
            scene,
            registry: MeshRegistry::new(),
            tracer: PathTracer::new(capacity)?,
            update,
            commands,
            loop_thread: Some(loop_thread),
        })
    }

    /// Locks the scene for authoring. Held guards block the update loop's
    /// next tick, so keep them short.
    pub fn scene(&self) -> MutexGuard<'_, Scene> {
        lock_scene(&self.scene)
    }

    pub fn register_mesh(&mut self, mesh: Mesh) -> MeshId {
        self.registry.register(mesh)
    }

    pub fn meshes(&self) -> &MeshRegistry {
        &self.registry
    }

    /// Imports an OBJ file: one scene object per model.
    pub fn import_model(&mut self, path: impl AsRef<Path>) -> Result<Vec<EntityId>, EngineError> {
        let mut scene = lock_scene(&self.scene);
        asset::import_model(path.as_ref(), &mut self.registry, &mut scene)
    }

    /// Imports an equirectangular panorama as the scene environment.
    pub fn import_environment_map(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let environment = asset::import_environment(path.as_ref())?;
        lock_scene(&self.scene).environment = environment;
        Ok(())
    }

    pub fn render_info(&self) -> &RenderInfo {
        &self.tracer.info
    }

    pub fn render_info_mut(&mut self) -> &mut RenderInfo {
        &mut self.tracer.info
    }

    pub fn render_state(&self) -> RenderState {
        self.tracer.state()
    }

    /// Runs one render job over the current scene and returns the output
    /// path. The scene lock is held for the duration, so update ticks
    /// pause while the job runs.
    pub fn render(&mut self) -> Result<PathBuf, EngineError> {
        let mut scene = lock_scene(&self.scene);
        self.tracer.render(&mut scene, &self.registry)
    }

    /// Installs (or replaces) the per-tick update callback.
    pub fn set_update<F>(&self, update: F)
    where
        F: FnMut(&mut Scene, f32) + Send + 'static,
    {
        if let Ok(mut slot) = self.update.lock() {
            *slot = Some(Box::new(update));
        }
    }

    /// Starts update ticking.
    pub fn start(&self) {
        let _ = self.commands.send(LoopCommand::Start);
    }

    /// Stops update ticking; the loop thread stays alive.
    pub fn stop(&self) {
        let _ = self.commands.send(LoopCommand::Stop);
    }

    /// Blocks until the update loop has processed everything sent so far
    /// and finished its current tick.
    pub fn wait_idle(&self) {
        let (ack, done) = mpsc::channel();
        if self.commands.send(LoopCommand::Sync(ack)).is_ok() {
            let _ = done.recv();
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.commands.send(LoopCommand::Exit);
        if let Some(handle) = self.loop_thread.take() {
            if handle.join().is_err() {
                warn!("update loop thread panicked");
            }
        }
    }
}

fn lock_scene(scene: &Arc<Mutex<Scene>>) -> MutexGuard<'_, Scene> {
    // A panicked tick must not wedge the engine.
    scene.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn update_loop(
    scene: Arc<Mutex<Scene>>,
    update: Arc<Mutex<Option<UpdateFn>>>,
    commands: Receiver<LoopCommand>,
) {
    let mut running = false;
    let mut last = Instant::now();
    loop {
        match commands.recv_timeout(TICK) {
            Ok(LoopCommand::Start) => {
                debug!("update loop started");
                running = true;
                last = Instant::now();
            }
            Ok(LoopCommand::Stop) => {
                debug!("update loop stopped");
                running = false;
            }
            Ok(LoopCommand::Sync(ack)) => {
                let _ = ack.send(());
                continue;
            }
            Ok(LoopCommand::Exit) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        if running {
            let dt = last.elapsed().as_secs_f32();
            last = Instant::now();
            let mut scene = lock_scene(&scene);
            if let Ok(mut slot) = update.lock() {
                if let Some(callback) = slot.as_mut() {
                    callback(&mut scene, dt);
                }
            }
            scene.update();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::Vector3;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn update_loop_ticks_only_while_started() {
        let engine = Engine::with_capacity(16).unwrap();
        let ticks = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&ticks);
        engine.set_update(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        engine.wait_idle();
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        engine.start();
        std::thread::sleep(Duration::from_millis(100));
        engine.stop();
        engine.wait_idle();
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0);

        std::thread::sleep(Duration::from_millis(60));
        engine.wait_idle();
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn callback_mutations_are_visible_through_the_scene_lock() {
        let mut engine = Engine::with_capacity(16).unwrap();
        let mesh = engine.register_mesh(crate::scene::mesh::generate_cube(1.0));
        let entity = {
            let mut scene = engine.scene();
            scene
                .add_object("cube", mesh, crate::scene::material::Material::default())
                .unwrap()
        };

        engine.set_update(move |scene, _| {
            if let Some(transform) = scene.transform_mut(entity) {
                transform.translate(Vector3::new(0.1, 0.0, 0.0));
            }
        });
        engine.start();
        std::thread::sleep(Duration::from_millis(100));
        engine.stop();
        engine.wait_idle();

        let scene = engine.scene();
        let x = scene.object(entity).map(|o| o.transform.position().x);
        assert!(x.is_some_and(|x| x > 0.0));
    }
}
