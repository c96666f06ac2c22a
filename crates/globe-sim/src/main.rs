//! Headless globe driver.
//!
//! Flies a camera from orbit down towards a point on a procedural globe,
//! updating the quadtree every frame and logging what the tree looks like.
//! Layer requests run on a Tokio runtime.

mod async_runtime;

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_runtime::TokioSpawner;
use clap::Parser;
use glam::DVec3;
use globe::{
    Camera, GeographicBounds, HeadlessRenderer, Layer, LayerManager, Planet, PlanetConfig,
    ProceduralElevation, ProceduralImagery,
};
use tracing::{debug, info, warn};

/// Field of view used for the scripted camera.
const FOV_Y: f64 = std::f64::consts::FRAC_PI_4;

#[derive(Parser, Debug)]
#[command(name = "globe-sim", about = "Fly a camera down onto a procedural globe")]
struct Args {
    /// Frames spent descending.
    #[arg(long, default_value_t = 240)]
    frames: u32,

    /// Extra frames allowed for the tree to settle after the descent.
    #[arg(long, default_value_t = 120)]
    settle_frames: u32,

    /// Frames per second of the simulated clock.
    #[arg(long, default_value_t = 60.0)]
    fps: f64,

    /// Starting altitude above the ellipsoid in meters.
    #[arg(long, default_value_t = 20_000_000.0)]
    start_altitude: f64,

    /// Final altitude above the ellipsoid in meters.
    #[arg(long, default_value_t = 2_000.0)]
    end_altitude: f64,

    /// Target latitude in degrees.
    #[arg(long, default_value_t = 46.5, allow_hyphen_values = true)]
    lat: f64,

    /// Target longitude in degrees.
    #[arg(long, default_value_t = 8.0, allow_hyphen_values = true)]
    lon: f64,

    /// Peak height of the procedural hills in meters.
    #[arg(long, default_value_t = 3_000.0)]
    amplitude: f64,

    /// Deepest level the procedural elevation serves natively.
    #[arg(long, default_value_t = 12)]
    elevation_max_level: u32,

    /// Skip the procedural imagery layer.
    #[arg(long)]
    no_imagery: bool,

    /// JSON file with a planet configuration; unset fields keep their defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log tree statistics every this many frames.
    #[arg(long, default_value_t = 30)]
    log_every: u32,
}

fn load_config(path: Option<&PathBuf>) -> Result<PlanetConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(PlanetConfig::default());
    };
    let text = std::fs::read_to_string(path)?;
    let config: PlanetConfig = serde_json::from_str(&text)?;
    info!(path = %path.display(), "Loaded planet configuration");
    Ok(config)
}

fn build_layers(args: &Args) -> LayerManager {
    let mut layers = LayerManager::new();
    layers.push_layer(Arc::new(Layer::elevation(
        "hills",
        GeographicBounds::WORLD,
        Arc::new(ProceduralElevation::hills(args.elevation_max_level, args.amplitude)),
    )));
    if !args.no_imagery {
        layers.push_layer(Arc::new(Layer::imagery(
            "checker",
            GeographicBounds::WORLD,
            Arc::new(ProceduralImagery::new()),
        )));
    }
    layers
}

/// Altitude after `progress` (0..=1) of the descent, interpolated geometrically.
fn altitude_at(start: f64, end: f64, progress: f64) -> f64 {
    start * (end / start).powf(progress.clamp(0.0, 1.0))
}

/// Camera at `altitude` above the target looking straight down.
fn descent_camera(planet: &Planet, lon: f64, lat: f64, altitude: f64) -> Camera {
    let ellipsoid = planet.ellipsoid();
    let position = planet.center() + ellipsoid.llh_to_cartesian(lon, lat, altitude);
    let target = planet.center() + ellipsoid.llh_to_cartesian(lon, lat, 0.0);
    // Straight down is parallel to the polar axis at the poles.
    let up = if lat.abs() > 1.5 { DVec3::X } else { DVec3::Z };
    let near = (altitude * 1e-3).max(1.0);
    let far = altitude + 2.0 * ellipsoid.semi_major_axis;
    Camera::look_at(position, target, up, FOV_Y, 16.0 / 9.0, near, far)
}

fn log_stats(frame: u32, altitude: f64, planet: &Planet, renderer: &HeadlessRenderer) {
    let stats = planet.stats();
    info!(
        frame,
        altitude = %format!("{altitude:.0}"),
        tiles = stats.tiles,
        loaded = stats.loaded,
        visible = stats.visible,
        queued = stats.queued,
        in_flight = stats.in_flight,
        max_level = stats.max_level,
        triangles = renderer.visible_triangles(),
        "Frame"
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    let layers = build_layers(&args);
    let mut planet = Planet::new(config, layers, Arc::new(TokioSpawner::current()))?;
    let mut renderer = HeadlessRenderer::new();

    let lon = args.lon.to_radians();
    let lat = args.lat.to_radians();
    let frame_time = Duration::from_secs_f64(1.0 / args.fps.max(1.0));
    let mut ticker = tokio::time::interval(frame_time);
    let log_every = args.log_every.max(1);

    info!(
        lon = args.lon,
        lat = args.lat,
        from = args.start_altitude,
        to = args.end_altitude,
        frames = args.frames,
        "Starting descent"
    );

    let descent = args.frames.max(1);
    let mut altitude = args.start_altitude;
    for frame in 0..descent {
        ticker.tick().await;
        let progress = f64::from(frame) / f64::from(descent.saturating_sub(1).max(1));
        altitude = altitude_at(args.start_altitude, args.end_altitude, progress);
        let camera = descent_camera(&planet, lon, lat, altitude);
        planet.update(&camera, &mut renderer)?;
        renderer.end_frame();
        if frame % log_every == 0 {
            log_stats(frame, altitude, &planet, &renderer);
        }
    }

    let camera = descent_camera(&planet, lon, lat, altitude);
    let mut settled = false;
    for frame in 0..args.settle_frames {
        ticker.tick().await;
        settled = planet.update(&camera, &mut renderer)?;
        renderer.end_frame();
        if settled {
            debug!(frame, "Tree settled");
            break;
        }
    }
    log_stats(descent + args.settle_frames, altitude, &planet, &renderer);
    if !settled {
        warn!(frames = args.settle_frames, "Tree still changing after the settle window");
    }

    if let Some(height) = planet.elevation_at(glam::DVec2::new(lon, lat)) {
        info!(height = %format!("{height:.1}"), "Terrain height below the camera");
    }

    planet.dispose(&mut renderer);
    info!(
        resident = renderer.resident_count(),
        uploads = renderer.uploads(),
        "Planet disposed"
    );
    Ok(())
}
