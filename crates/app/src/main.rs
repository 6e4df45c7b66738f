//! PhongView: a single-mesh Phong viewer.
//! Every flag is optional; with none the fixed asset set under `assets/` is shown.

use std::path::PathBuf;

use anyhow::Result;
use corelib::{Vec3, transform::ModelPlacement};
use platform::AppConfig;

const USAGE: &str = "\
Usage: phongview [--flag=value ...]

Scene
  --model=PATH              OBJ mesh (default assets/cube.obj)
  --vertex-shader=PATH      WGSL vertex stage (default assets/shaders/vertex.wgsl)
  --fragment-shader=PATH    WGSL fragment stage (default assets/shaders/phong.wgsl)
  --threshold=T             initial lighting threshold in [0, 1] (default 0.5)

Placement
  --fit[=EXTENT]            centre the mesh and scale its longest side to EXTENT (default 2)
  --model-scale=S           extra uniform scale (default 1)
  --model-rotation=X,Y,Z    Euler XYZ rotation in degrees

Window
  --size=WxH | --width=W --height=H   (default 1280x720)
  --gpu-backend=auto|vulkan|dx12|metal|gl
  --show-fps[=on|off]       log frames per second
  --help                    print this text

Keys: WASD move, Space/Shift rise/fall, arrows pitch/yaw, Q/E roll, [ ] threshold, Esc quit.";

const DEFAULT_FIT_EXTENT: f32 = 2.0;

/// Value of the last `--{key}=VALUE`, so later flags override earlier ones.
fn flag_value<'a>(args: &'a [String], key: &str) -> Option<&'a str> {
    let prefix = format!("--{key}=");
    args.iter().rev().find_map(|arg| arg.strip_prefix(&prefix))
}

/// `--{key}` on its own, or `--{key}=on|off`.
fn switch(args: &[String], key: &str) -> Option<bool> {
    let bare = format!("--{key}");
    args.iter().rev().find_map(|arg| {
        if *arg == bare {
            return Some(true);
        }
        let value = arg.strip_prefix(&bare)?.strip_prefix('=')?;
        Some(matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on" | "yes"))
    })
}

fn backend_from_name(name: &str) -> Option<wgpu::Backends> {
    Some(match name.to_ascii_lowercase().as_str() {
        "auto" => wgpu::Backends::all(),
        "vulkan" | "vk" => wgpu::Backends::VULKAN,
        "dx12" | "d3d12" => wgpu::Backends::DX12,
        "metal" | "mtl" => wgpu::Backends::METAL,
        "gl" | "opengl" | "gles" => wgpu::Backends::GL,
        _ => return None,
    })
}

fn parse_backend(args: &[String]) -> wgpu::Backends {
    match flag_value(args, "gpu-backend") {
        None => wgpu::Backends::all(),
        Some(name) => backend_from_name(name).unwrap_or_else(|| {
            log::warn!("Unknown GPU backend '{name}'; letting wgpu choose");
            wgpu::Backends::all()
        }),
    }
}

fn parse_dimension(args: &[String], key: &str) -> Option<u32> {
    let value = flag_value(args, key)?;
    value
        .parse()
        .map_err(|_| log::warn!("Ignoring --{key}={value}: not a whole number"))
        .ok()
}

/// `--size=WxH` first, then `--width`/`--height` refine it. Zero is bumped to 1.
fn parse_window_size(args: &[String]) -> (u32, u32) {
    let defaults = AppConfig::default();
    let (mut width, mut height) = (defaults.width, defaults.height);

    if let Some(size) = flag_value(args, "size") {
        let parsed = size
            .split_once(['x', 'X'])
            .and_then(|(w, h)| Some((w.parse::<u32>().ok()?, h.parse::<u32>().ok()?)));
        match parsed {
            Some((w, h)) => (width, height) = (w, h),
            None => log::warn!("Ignoring --size={size}: expected WIDTHxHEIGHT"),
        }
    }
    width = parse_dimension(args, "width").unwrap_or(width);
    height = parse_dimension(args, "height").unwrap_or(height);

    (width.max(1), height.max(1))
}

fn parse_path(args: &[String], key: &str) -> Option<PathBuf> {
    flag_value(args, key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_finite(args: &[String], key: &str) -> Option<f32> {
    let value = flag_value(args, key)?;
    match value.parse::<f32>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => {
            log::warn!("Ignoring --{key}={value}: not a finite number");
            None
        }
    }
}

fn parse_threshold(args: &[String]) -> f32 {
    parse_finite(args, "threshold")
        .map(|t| t.clamp(0.0, 1.0))
        .unwrap_or(platform::DEFAULT_THRESHOLD)
}

fn parse_rotation(args: &[String]) -> Vec3 {
    let Some(value) = flag_value(args, "model-rotation") else {
        return Vec3::ZERO;
    };
    let angles: Vec<f32> = value
        .split(',')
        .filter_map(|a| a.trim().parse().ok())
        .filter(|a: &f32| a.is_finite())
        .collect();
    match angles.as_slice() {
        &[x, y, z] => Vec3::new(x, y, z),
        _ => {
            log::warn!("Ignoring --model-rotation={value}: expected three angles X,Y,Z");
            Vec3::ZERO
        }
    }
}

fn parse_placement(args: &[String]) -> ModelPlacement {
    let fit_extent = match flag_value(args, "fit") {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(DEFAULT_FIT_EXTENT),
            "0" | "false" | "off" | "no" => None,
            _ => parse_finite(args, "fit").filter(|e| {
                let positive = *e > 0.0;
                if !positive {
                    log::warn!("Ignoring non-positive --fit={e}");
                }
                positive
            }),
        },
        None => args.iter().any(|a| a == "--fit").then_some(DEFAULT_FIT_EXTENT),
    };

    let scale = match parse_finite(args, "model-scale") {
        Some(s) if s > 0.0 => s,
        Some(s) => {
            log::warn!("Ignoring non-positive --model-scale={s}");
            1.0
        }
        None => 1.0,
    };

    ModelPlacement {
        scale,
        rotation_deg: parse_rotation(args),
        fit_extent,
    }
}

fn parse_config(args: &[String]) -> AppConfig {
    let (width, height) = parse_window_size(args);
    let mut config = AppConfig {
        backends: parse_backend(args),
        width,
        height,
        show_fps: switch(args, "show-fps").unwrap_or(false),
        placement: parse_placement(args),
        threshold: parse_threshold(args),
        ..AppConfig::default()
    };
    if let Some(p) = parse_path(args, "model") {
        config.scene.model = p;
    }
    if let Some(p) = parse_path(args, "vertex-shader") {
        config.scene.vertex_shader = p;
    }
    if let Some(p) = parse_path(args, "fragment-shader") {
        config.scene.fragment_shader = p;
    }
    config
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--help" || a == "-h") {
        println!("{USAGE}");
        return Ok(());
    }

    let config = parse_config(&args);
    log::info!(
        "PhongView: {} in a {}x{} window on {:?}, threshold {:.2}",
        config.scene.model.display(),
        config.width,
        config.height,
        config.backends,
        config.threshold
    );

    platform::run_with_renderer(config)?;

    log::info!("Viewer closed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn no_flags_reproduce_the_fixed_file_set() {
        let config = parse_config(&[]);
        assert_eq!(config.scene.model, PathBuf::from("assets/cube.obj"));
        assert_eq!(config.scene.vertex_shader, PathBuf::from("assets/shaders/vertex.wgsl"));
        assert_eq!(config.scene.fragment_shader, PathBuf::from("assets/shaders/phong.wgsl"));
        assert_eq!((config.width, config.height), (1280, 720));
        assert_eq!(config.backends, wgpu::Backends::all());
        assert!(!config.show_fps);
        assert_eq!(config.threshold, 0.5);
        assert_eq!(config.placement, ModelPlacement::default());
    }

    #[test]
    fn window_size_flags_combine() {
        assert_eq!(parse_window_size(&args(&["--size=800x600"])), (800, 600));
        assert_eq!(parse_window_size(&args(&["--size=800X600", "--height=500"])), (800, 500));
        assert_eq!(parse_window_size(&args(&["--width=0"])), (1, 720));
        assert_eq!(parse_window_size(&args(&["--size=oops"])), (1280, 720));
    }

    #[test]
    fn backend_names_are_case_insensitive() {
        assert_eq!(parse_backend(&args(&["--gpu-backend=Vulkan"])), wgpu::Backends::VULKAN);
        assert_eq!(parse_backend(&args(&["--gpu-backend=gles"])), wgpu::Backends::GL);
        assert_eq!(parse_backend(&args(&["--gpu-backend=nope"])), wgpu::Backends::all());
    }

    #[test]
    fn switches_accept_bare_and_valued_forms() {
        assert_eq!(switch(&args(&["--show-fps"]), "show-fps"), Some(true));
        assert_eq!(switch(&args(&["--show-fps=on"]), "show-fps"), Some(true));
        assert_eq!(switch(&args(&["--show-fps=off"]), "show-fps"), Some(false));
        assert_eq!(switch(&args(&["--show-fps-extra"]), "show-fps"), None);
    }

    #[test]
    fn paths_and_threshold_are_configurable() {
        let config = parse_config(&args(&[
            "--model=scenes/ship.obj",
            "--fragment-shader=shaders/flat.wgsl",
            "--threshold=1.7",
        ]));
        assert_eq!(config.scene.model, PathBuf::from("scenes/ship.obj"));
        assert_eq!(config.scene.fragment_shader, PathBuf::from("shaders/flat.wgsl"));
        assert_eq!(config.scene.vertex_shader, PathBuf::from("assets/shaders/vertex.wgsl"));
        assert_eq!(config.threshold, 1.0);
    }

    #[test]
    fn invalid_threshold_keeps_default() {
        assert_eq!(parse_threshold(&args(&["--threshold=bright"])), 0.5);
    }

    #[test]
    fn placement_flags_reach_the_config() {
        let config = parse_config(&args(&[
            "--fit",
            "--model-scale=0.5",
            "--model-rotation=0, 90,-45",
        ]));
        assert_eq!(config.placement.fit_extent, Some(DEFAULT_FIT_EXTENT));
        assert_eq!(config.placement.scale, 0.5);
        assert_eq!(config.placement.rotation_deg, Vec3::new(0.0, 90.0, -45.0));
    }

    #[test]
    fn fit_takes_an_explicit_extent() {
        assert_eq!(parse_placement(&args(&["--fit=5"])).fit_extent, Some(5.0));
        assert_eq!(parse_placement(&args(&["--fit=off"])).fit_extent, None);
        assert_eq!(parse_placement(&args(&["--fit=-1"])).fit_extent, None);
    }

    #[test]
    fn bad_placement_values_fall_back() {
        let placement = parse_placement(&args(&["--model-scale=-2", "--model-rotation=1,2"]));
        assert_eq!(placement, ModelPlacement::default());
    }
}
