//! Compile-time sizing for the Lua temporary pools.
//!
//! Each constant bounds how many temporaries of that type a single top-level
//! script invocation may hold before `reset_temporaries` runs. Running out is a
//! sizing error reported as `BridgeError::PoolExhausted`, so raise the bound
//! here rather than expecting the bridge to recover.

use static_assertions::const_assert;

use crate::scripting::MAX_POOL_CAPACITY;

/// Number of temporary `Vector3` slots.
pub const MAX_LUA_VECTOR3: usize = 4096;

/// Number of temporary `Quaternion` slots.
pub const MAX_LUA_QUATERNION: usize = 4096;

/// Number of temporary `Matrix4x4` slots.
pub const MAX_LUA_MATRIX4X4: usize = 1024;

const_assert!(MAX_LUA_VECTOR3 > 0 && MAX_LUA_VECTOR3 <= MAX_POOL_CAPACITY);
const_assert!(MAX_LUA_QUATERNION > 0 && MAX_LUA_QUATERNION <= MAX_POOL_CAPACITY);
const_assert!(MAX_LUA_MATRIX4X4 > 0 && MAX_LUA_MATRIX4X4 <= MAX_POOL_CAPACITY);
