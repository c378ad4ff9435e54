use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use erpt_bridge::{
    assembler::ResultImage,
    camera::Camera,
    config::BridgeConfig,
    content::load_obj_scene,
    engine::RenderEngine,
    scene::{LightBuilder, LightKind, ObjectData, Scene, SceneObject, Transform},
};
use glam::Vec3;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Render an obj scene with an external renderer and save the image.
#[derive(Debug, Parser)]
#[command(name = "erpt-bridge", version)]
struct Args {
    /// Wavefront obj file holding the scene geometry.
    scene: PathBuf,
    /// Bridge configuration file (TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Where to write the rendered image.
    #[arg(short, long, value_name = "FILE", default_value = "render.png")]
    output: PathBuf,
    #[arg(long)]
    width: Option<u32>,
    #[arg(long)]
    height: Option<u32>,
    /// Percentage scale applied to width and height.
    #[arg(long)]
    percentage: Option<u32>,
    /// External renderer executable, overrides the configuration.
    #[arg(short, long, value_name = "PATH")]
    renderer: Option<PathBuf>,
    /// Port to listen on, overrides the configuration.
    #[arg(short, long)]
    port: Option<u16>,
}

fn main() -> anyhow::Result<()> {
    tracing_log::LogTracer::init().context("failed to initialize LogTracer")?;

    let stdout_subscriber = tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(stdout_subscriber)
        .context("failed to install stdout global tracing subscriber")?;

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => BridgeConfig::load_from_file(path)
            .with_context(|| format!("failed to load configuration {path:?}"))?,
        None => BridgeConfig::default(),
    };

    if let Some(renderer) = args.renderer {
        config.renderer_executable = Some(renderer);
    }

    if let Some(port) = args.port {
        config.port = port;
    }

    // Build the scene.
    let mut scene = Scene::default();

    if let Some(width) = args.width {
        scene.render.resolution_x = width;
    }

    if let Some(height) = args.height {
        scene.render.resolution_y = height;
    }

    if let Some(percentage) = args.percentage {
        scene.render.resolution_percentage = percentage;
    }

    load_obj_scene(&args.scene, &mut scene)?;
    add_default_camera_and_light(&mut scene)?;

    // Render it.
    let engine = RenderEngine::new(config);
    let mut image = ResultImage::new();

    engine.render(&scene, &mut image, || false)?;

    let rgba = image
        .to_rgba_image()
        .context("renderer finished without producing an image")?;

    image::DynamicImage::ImageRgba32F(rgba)
        .to_rgba8()
        .save(&args.output)
        .with_context(|| format!("failed to save {:?}", args.output))?;

    info!("saved render to {:?}", args.output);
    Ok(())
}

/// Place a camera in front of the imported geometry looking down -Z at its
/// center, with a point light above the camera.
fn add_default_camera_and_light(scene: &mut Scene) -> anyhow::Result<()> {
    let (center, radius) = scene_bounds(scene);
    let camera = Camera::default();

    // Back off far enough for the bounding sphere to fit the field of view.
    let distance = (radius / (camera.fov() * 0.5).sin()).max(camera.clip().0 * 2.0);
    let eye = center + Vec3::Z * distance;

    let camera_key = scene.add(SceneObject::new(
        "Camera",
        Transform::from_translation(eye),
        ObjectData::Camera(camera),
    ));
    scene.set_active_camera(camera_key)?;

    scene.add(SceneObject::new(
        "Light",
        Transform::from_translation(eye + Vec3::Y * distance * 0.5),
        ObjectData::Light(LightBuilder::new(LightKind::Point).build()),
    ));

    Ok(())
}

/// Bounding sphere of every mesh in world space.
fn scene_bounds(scene: &Scene) -> (Vec3, f32) {
    let mut min = Vec3::splat(f32::MAX);
    let mut max = Vec3::splat(f32::MIN);

    for (key, object) in scene.objects() {
        let (ObjectData::Mesh(mesh), Some(world)) = (&object.data, scene.world_matrix(key)) else {
            continue;
        };

        for p in mesh.positions() {
            let p = world.transform_point3(*p);
            min = min.min(p);
            max = max.max(p);
        }
    }

    if min.cmpgt(max).any() {
        return (Vec3::ZERO, 1.0);
    }

    let center = (min + max) * 0.5;
    (center, (max - center).length().max(0.5))
}
