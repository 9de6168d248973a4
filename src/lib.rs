//! Embeddable Lua scripting layer for the Crown engine.
//!
//! The crate centres on [`LuaEnvironment`]: a Lua state with engine math
//! modules installed, a typed bridge for calling script globals, and pooled
//! temporaries for vectors, rotations and matrices. Around it sit the small
//! engine pieces scripts drive: a first-person camera, interpolation helpers,
//! a timer and a CPU-side vertex buffer. Windowing and GPU work stay outside
//! the crate so everything here runs headless and under test.

pub mod camera;
pub mod config;
pub mod input;
pub mod interpolation;
pub mod scripting;
pub mod timer;
pub mod vertex_buffer;

pub use camera::{CameraSettings, MovableCamera};
pub use input::{InputState, KeyCode, NamedKey};
pub use scripting::{
    register_camera, Argument, BridgeError, BridgeResult, LuaEnvironment, LuaResource, LuaStack,
    TempCount, TempHandle, TempKind, Temporaries,
};
pub use timer::Timer;
pub use vertex_buffer::{AttributeKind, VertexAttribute, VertexBuffer, VertexFormat};
