use std::env;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use glam::Vec3;
use log::{debug, info};
use mlua::Value;
use parking_lot::RwLock;

use crown_lua::{
    register_camera, Argument, CameraSettings, InputState, KeyCode, LuaEnvironment, LuaResource,
    LuaStack, MovableCamera, Timer,
};

const USAGE: &str =
    "Usage: crown-lua <script.lua> [--frames N] [--dt SECONDS] [--hold KEY]... [--summary-only]";

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let resource = LuaResource::open(&options.path)?;

    let mut lua = LuaEnvironment::new().context("failed to create Lua environment")?;
    lua.load_libs().context("failed to load engine libraries")?;

    let camera = Arc::new(RwLock::new(MovableCamera::new(
        Vec3::new(0.0, 1.0, 5.0),
        CameraSettings::default(),
    )));
    register_camera(&lua, Arc::clone(&camera)).context("failed to register camera module")?;

    let input = InputState::new();
    for name in &options.held_keys {
        let key = KeyCode::from_name(name).ok_or_else(|| anyhow!("Unknown key: {name}"))?;
        input.set_key_down(key);
    }

    lua.execute(&resource)
        .with_context(|| format!("failed to run {}", resource.name()))?;
    println!("Loaded {}", resource.name());

    let has_update = matches!(lua.get_global("update")?.value(1), Some(Value::Function(_)));
    if !has_update {
        info!("{} defines no update function", resource.name());
    }

    let timer = Timer::new();
    let mut failed_frames = 0;
    for frame in 0..options.frames {
        lua.reset_temporaries();
        if has_update && lua.call_global("update", &[Argument::Float(options.dt)]).is_none() {
            failed_frames += 1;
        }
        camera.write().update(&input, options.dt as f32);
        if !options.summary_only {
            let position = camera.read().position();
            println!("frame {frame}: camera={}", format_vec3(position));
        }
    }
    debug!("frame loop took {} us", timer.microseconds());

    println!("Ran {} frame(s) in {} ms", options.frames, timer.milliseconds());
    if failed_frames > 0 {
        println!("update failed on {failed_frames} frame(s)");
    }
    println!("Camera position {}", format_vec3(camera.read().position()));
    let result = lua.get_global("result")?;
    if let Some(text) = describe(&result) {
        println!("result = {text}");
    }
    Ok(())
}

fn format_vec3(v: Vec3) -> String {
    format!("({:.2}, {:.2}, {:.2})", v.x, v.y, v.z)
}

fn describe(stack: &LuaStack<'_>) -> Option<String> {
    match stack.value(1)? {
        Value::Nil => None,
        Value::Boolean(b) => Some(b.to_string()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.to_string_lossy().into_owned()),
        Value::LightUserData(_) => {
            if let Some(v) = stack.get_vector3(1) {
                Some(format_vec3(v))
            } else if let Some(q) = stack.get_quaternion(1) {
                Some(format!("({:.2}, {:.2}, {:.2}, {:.2})", q.x, q.y, q.z, q.w))
            } else {
                stack.get_matrix4x4(1).map(|m| format!("{:?}", m.to_cols_array()))
            }
        }
        other => Some(other.type_name().to_string()),
    }
}

struct CliOptions {
    path: String,
    frames: u32,
    dt: f64,
    held_keys: Vec<String>,
    summary_only: bool,
}

impl CliOptions {
    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(path) = args.next() else {
            return Err(anyhow!(USAGE));
        };
        let mut options = Self {
            path,
            frames: 1,
            dt: 1.0 / 60.0,
            held_keys: Vec::new(),
            summary_only: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--frames" => {
                    let value = args.next().ok_or_else(|| anyhow!("--frames needs a value"))?;
                    options.frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value}"))?;
                }
                "--dt" => {
                    let value = args.next().ok_or_else(|| anyhow!("--dt needs a value"))?;
                    options.dt = value
                        .parse()
                        .with_context(|| format!("invalid time step {value}"))?;
                }
                "--hold" => {
                    let key = args.next().ok_or_else(|| anyhow!("--hold needs a key name"))?;
                    options.held_keys.push(key);
                }
                "--summary-only" => options.summary_only = true,
                other => {
                    return Err(anyhow!("Unknown argument: {other}. {USAGE}"));
                }
            }
        }
        Ok(options)
    }
}
