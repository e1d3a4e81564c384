//! End-to-end render scenarios through the engine facade.

use braw::scene::light::Light;
use braw::scene::mesh::{generate_cube, generate_plane, generate_sphere};
use braw::{Engine, Environment, FileType, Material, Mesh, RenderState};
use cgmath::Vector3;
use std::path::Path;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn read_exr(path: &Path) -> (u32, u32, Vec<Vector3<f32>>) {
    let image = image::open(path).expect("readable exr").to_rgb32f();
    let (w, h) = image.dimensions();
    let pixels = image
        .pixels()
        .map(|p| Vector3::new(p.0[0], p.0[1], p.0[2]))
        .collect();
    (w, h, pixels)
}

/// Camera straight down onto a huge Lambert plane under a uniform white
/// environment. Cosine-weighted sampling makes every sample exactly the
/// albedo, so the whole image must converge to it immediately.
fn furnace_engine(dir: &Path, filename: &str, batch_size: u32) -> Engine {
    let mut engine = Engine::with_capacity(64).unwrap();
    let plane = engine.register_mesh(generate_plane(500.0, 500.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("floor", plane, Material::lambert("grey", Vector3::new(0.6, 0.6, 0.6)))
            .unwrap();
        scene.environment = Environment::constant(Vector3::new(1.0, 1.0, 1.0));
        scene.camera.position = Vector3::new(0.0, 5.0, 0.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
        scene.camera.up = Vector3::new(0.0, 0.0, -1.0);
    }
    let info = engine.render_info_mut();
    info.width = 16;
    info.height = 16;
    info.samples = 4;
    info.batch_size = batch_size;
    info.file_type = FileType::Exr;
    info.filename = dir.join(filename).display().to_string();
    engine
}

#[test]
fn furnace_plane_converges_to_albedo() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = furnace_engine(dir.path(), "furnace", 2);
    let path = engine.render().unwrap();
    assert_eq!(engine.render_state(), RenderState::Written);

    let (_, _, pixels) = read_exr(&path);
    for pixel in &pixels {
        assert!((pixel.x - 0.6).abs() < 1e-4, "got {}", pixel.x);
        assert!((pixel.y - 0.6).abs() < 1e-4);
        assert!((pixel.z - 0.6).abs() < 1e-4);
    }
}

#[test]
fn batch_split_does_not_change_the_converged_image() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let one = furnace_engine(dir.path(), "per_sample", 1).render().unwrap();
    let four = furnace_engine(dir.path(), "single_batch", 4).render().unwrap();
    let (_, _, a) = read_exr(&one);
    let (_, _, b) = read_exr(&four);
    assert_eq!(a, b);
}

fn lit_sphere_engine(dir: &Path, filename: &str, seed: u64) -> Engine {
    let mut engine = Engine::with_capacity(64).unwrap();
    let sphere = engine.register_mesh(generate_sphere(1.0, 24, 16));
    let plane = engine.register_mesh(generate_plane(40.0, 40.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("ball", sphere, Material::pbr("red", Vector3::new(0.8, 0.2, 0.2), 0.0, 0.4))
            .unwrap();
        let floor = scene
            .add_object("floor", plane, Material::lambert("floor", Vector3::new(0.5, 0.5, 0.5)))
            .unwrap();
        scene
            .transform_mut(floor)
            .unwrap()
            .translate(Vector3::new(0.0, -1.0, 0.0));
        let key = scene
            .add_light("key", Light::point(Vector3::new(1.0, 1.0, 1.0), 40.0))
            .unwrap();
        scene
            .transform_mut(key)
            .unwrap()
            .translate(Vector3::new(2.0, 4.0, 2.0));
        scene.camera.position = Vector3::new(0.0, 1.0, 5.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 32;
    info.height = 32;
    info.samples = 8;
    info.batch_size = 4;
    info.seed = seed;
    info.file_type = FileType::Exr;
    info.filename = dir.join(filename).display().to_string();
    engine
}

#[test]
fn same_seed_renders_identical_images() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let first = lit_sphere_engine(dir.path(), "seed_a", 7).render().unwrap();
    let second = lit_sphere_engine(dir.path(), "seed_b", 7).render().unwrap();
    let bytes_a = std::fs::read(&first).unwrap();
    let bytes_b = std::fs::read(&second).unwrap();
    assert_eq!(bytes_a, bytes_b);
}

#[test]
fn lit_sphere_is_red_at_the_center() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let path = lit_sphere_engine(dir.path(), "sphere", 1).render().unwrap();
    let (w, h, pixels) = read_exr(&path);
    let center = pixels[(h / 2 * w + w / 2) as usize];
    assert!(center.x.is_finite());
    assert!(center.x > 0.0);
    assert!(center.x > center.z, "sphere should be red: {center:?}");
}

#[test]
fn write_all_files_names_batches_one_based() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = furnace_engine(dir.path(), "steps", 2);
    {
        let info = engine.render_info_mut();
        info.samples = 5;
        info.file_type = FileType::Png;
        info.write_all_files = true;
    }
    engine.render().unwrap();
    for batch in ["steps1.png", "steps2.png", "steps3.png"] {
        assert!(dir.path().join(batch).exists(), "missing {batch}");
    }
    assert!(dir.path().join("steps.png").exists());
    assert!(!dir.path().join("steps0.png").exists());
    assert!(!dir.path().join("steps4.png").exists());
}

#[test]
fn denoised_render_still_matches_the_furnace_value() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = furnace_engine(dir.path(), "denoised", 2);
    engine.render_info_mut().denoise = true;
    let path = engine.render().unwrap();
    // A constant image passes through the bilateral filter unchanged.
    let (_, _, pixels) = read_exr(&path);
    for pixel in &pixels {
        assert!((pixel.x - 0.6).abs() < 1e-3);
    }
}

#[test]
fn emissive_material_lights_the_floor_through_a_bounce() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let floor_mesh = engine.register_mesh(generate_plane(20.0, 20.0));
    let panel_mesh = engine.register_mesh(generate_plane(2.0, 2.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("floor", floor_mesh, Material::lambert("floor", Vector3::new(0.7, 0.7, 0.7)))
            .unwrap();
        let mut glow = Material::pbr("glow", Vector3::new(0.0, 0.0, 0.0), 0.0, 1.0);
        glow.set_emissive(Vector3::new(4.0, 4.0, 4.0));
        let panel = scene.add_object("panel", panel_mesh, glow).unwrap();
        scene
            .transform_mut(panel)
            .unwrap()
            .translate(Vector3::new(0.0, 3.0, 0.0));
        scene.camera.position = Vector3::new(0.0, 1.5, 6.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 16;
    info.height = 16;
    info.samples = 32;
    info.batch_size = 16;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("glow").display().to_string();

    let path = engine.render().unwrap();
    let (_, _, pixels) = read_exr(&path);
    // The panel is never seen directly and there are no scene lights, so
    // everything on the floor arrives via one bounce off the emissive
    // material.
    let mean: f32 = pixels.iter().map(|p| p.x).sum::<f32>() / pixels.len() as f32;
    assert!(mean.is_finite());
    assert!(mean > 1e-3, "floor should pick up bounced emission, got {mean}");
}

#[test]
fn skybox_material_passes_the_environment_through() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let sphere = engine.register_mesh(generate_sphere(1.0, 24, 16));
    {
        let mut scene = engine.scene();
        scene.add_object("dome", sphere, Material::skybox("sky")).unwrap();
        scene.environment = Environment::constant(Vector3::new(0.2, 0.4, 0.8));
        scene.camera.position = Vector3::new(0.0, 0.0, 4.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 8;
    info.height = 8;
    info.samples = 2;
    info.batch_size = 2;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("sky").display().to_string();

    let path = engine.render().unwrap();
    let (_, _, pixels) = read_exr(&path);
    // Rays hitting the dome terminate into the environment; rays missing it
    // escape into the same environment. Every pixel is exactly that color.
    for pixel in &pixels {
        assert!((pixel.x - 0.2).abs() < 1e-5);
        assert!((pixel.y - 0.4).abs() < 1e-5);
        assert!((pixel.z - 0.8).abs() < 1e-5);
    }
}

/// Uniform white environment around a purely scattering cube. Every path
/// either transmits straight through or scatters exactly once with unit
/// albedo and escapes, so every pixel stays exactly white.
#[test]
fn scattering_volume_preserves_a_white_furnace() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let cube = engine.register_mesh(generate_cube(2.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("fog", cube, Material::volume("fog", Vector3::new(1.0, 1.0, 1.0), 1.5, 0.3))
            .unwrap();
        scene.environment = Environment::constant(Vector3::new(1.0, 1.0, 1.0));
        scene.camera.position = Vector3::new(0.0, 0.0, 5.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 8;
    info.height = 8;
    info.samples = 16;
    info.batch_size = 8;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("fog").display().to_string();

    let path = engine.render().unwrap();
    let (_, _, pixels) = read_exr(&path);
    for pixel in &pixels {
        assert!((pixel.x - 1.0).abs() < 1e-3, "got {}", pixel.x);
        assert!((pixel.y - 1.0).abs() < 1e-3);
        assert!((pixel.z - 1.0).abs() < 1e-3);
    }
}

/// Purely absorbing cube of thickness 2 with `sigma_t = 0.5` under a white
/// environment: the central pixel converges to `exp(-1)`.
#[test]
fn absorbing_volume_follows_beer_lambert_attenuation() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let cube = engine.register_mesh(generate_cube(2.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("ink", cube, Material::volume("ink", Vector3::new(0.0, 0.0, 0.0), 0.5, 0.0))
            .unwrap();
        scene.environment = Environment::constant(Vector3::new(1.0, 1.0, 1.0));
        scene.camera.position = Vector3::new(0.0, 0.0, 5.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 16;
    info.height = 16;
    info.samples = 512;
    info.batch_size = 256;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("ink").display().to_string();

    let path = engine.render().unwrap();
    let (w, h, pixels) = read_exr(&path);
    let center = pixels[(h / 2 * w + w / 2) as usize];
    let expected = (-1.0f32).exp();
    assert!(
        (center.x - expected).abs() < 0.08,
        "expected about {expected}, got {}",
        center.x
    );
}

#[test]
fn mesh_emitter_reaches_scattering_points_inside_a_volume() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let cube = engine.register_mesh(generate_cube(2.0));
    let panel_mesh = engine.register_mesh(generate_plane(2.0, 2.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("fog", cube, Material::volume("fog", Vector3::new(1.0, 1.0, 1.0), 4.0, 0.0))
            .unwrap();
        let panel = scene
            .add_object("panel", panel_mesh, Material::lambert("panel", Vector3::new(0.0, 0.0, 0.0)))
            .unwrap();
        scene
            .transform_mut(panel)
            .unwrap()
            .translate(Vector3::new(0.0, 3.0, 0.0));
        scene
            .attach_mesh_light(panel, Light::mesh_emissive(Vector3::new(1.0, 1.0, 1.0), 10.0))
            .unwrap();
        scene.camera.position = Vector3::new(0.0, 0.0, 5.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 8;
    info.height = 8;
    info.samples = 64;
    info.batch_size = 32;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("lit_fog").display().to_string();

    let path = engine.render().unwrap();
    let (w, h, pixels) = read_exr(&path);
    // The environment is black, so the only radiance comes from shadow rays
    // out of in-scattering points toward the panel.
    let center = pixels[(h / 2 * w + w / 2) as usize];
    assert!(center.x.is_finite());
    assert!(center.x > 0.0, "in-scattered light should reach the camera");
}

#[test]
fn empty_mesh_light_is_skipped_without_failing_the_render() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let floor_mesh = engine.register_mesh(generate_plane(20.0, 20.0));
    let empty = engine.register_mesh(Mesh::new("shell", vec![], vec![], vec![], vec![]));
    {
        let mut scene = engine.scene();
        scene
            .add_object("floor", floor_mesh, Material::lambert("floor", Vector3::new(0.6, 0.6, 0.6)))
            .unwrap();
        let shell = scene
            .add_object("shell", empty, Material::lambert("shell", Vector3::new(0.0, 0.0, 0.0)))
            .unwrap();
        scene
            .attach_mesh_light(shell, Light::mesh_emissive(Vector3::new(1.0, 1.0, 1.0), 5.0))
            .unwrap();
        scene.environment = Environment::constant(Vector3::new(1.0, 1.0, 1.0));
        scene.camera.position = Vector3::new(0.0, 5.0, 0.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
        scene.camera.up = Vector3::new(0.0, 0.0, -1.0);
    }
    let info = engine.render_info_mut();
    info.width = 8;
    info.height = 8;
    info.samples = 2;
    info.batch_size = 2;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("shell").display().to_string();

    engine.render().unwrap();
    assert_eq!(engine.render_state(), RenderState::Written);
}

#[test]
fn mesh_emitter_lights_the_floor() {
    init_logging();
    let dir = tempfile::tempdir().unwrap();
    let mut engine = Engine::with_capacity(64).unwrap();
    let floor_mesh = engine.register_mesh(generate_plane(20.0, 20.0));
    let panel_mesh = engine.register_mesh(generate_plane(2.0, 2.0));
    {
        let mut scene = engine.scene();
        scene
            .add_object("floor", floor_mesh, Material::lambert("floor", Vector3::new(0.7, 0.7, 0.7)))
            .unwrap();
        let panel = scene
            .add_object("panel", panel_mesh, Material::lambert("panel", Vector3::new(0.0, 0.0, 0.0)))
            .unwrap();
        scene
            .transform_mut(panel)
            .unwrap()
            .translate(Vector3::new(0.0, 3.0, 0.0));
        scene
            .attach_mesh_light(panel, Light::mesh_emissive(Vector3::new(1.0, 1.0, 1.0), 5.0))
            .unwrap();
        scene.camera.position = Vector3::new(0.0, 1.5, 6.0);
        scene.camera.target = Vector3::new(0.0, 0.0, 0.0);
    }
    let info = engine.render_info_mut();
    info.width = 32;
    info.height = 32;
    info.samples = 16;
    info.batch_size = 8;
    info.file_type = FileType::Exr;
    info.filename = dir.path().join("emitter").display().to_string();

    let path = engine.render().unwrap();
    let (w, h, pixels) = read_exr(&path);
    // Floor pixels in the lower half of the frame pick up panel light.
    let sample = pixels[((h * 3 / 4) * w + w / 2) as usize];
    assert!(sample.x > 0.0);
    assert!(sample.x.is_finite());
}
