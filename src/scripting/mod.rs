//! Lua scripting bridge: one Lua state per environment, engine modules, and
//! the per-invocation temporary pools that carry math values across the
//! native/script boundary.

mod bindings;
mod environment;
mod error;
mod resource;
mod stack;
mod temporaries;

pub use bindings::register_camera;
pub use environment::{Argument, LuaEnvironment};
pub use error::{BridgeError, BridgeResult};
pub use resource::LuaResource;
pub use stack::LuaStack;
pub use temporaries::{
    TempArena, TempCount, TempHandle, TempKind, TempScope, Temporaries, MAX_POOL_CAPACITY,
};
