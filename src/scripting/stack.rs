use glam::{Mat4, Quat, Vec3};
use mlua::{FromLua, Lua, LuaSerdeExt, MultiValue, Value};
use serde::de::DeserializeOwned;

use super::error::BridgeResult;
use super::temporaries::{TempHandle, Temporaries};

/// Values returned by a chunk or a call, read back on the native side.
///
/// Indices follow the Lua stack convention: `1` is the first returned value
/// and negative indices count from the top, so `-1` is the last one.
/// Temporaries read through the stack are only valid until the next reset.
pub struct LuaStack<'lua> {
    lua: &'lua Lua,
    temporaries: &'lua Temporaries,
    values: Vec<Value<'lua>>,
}

impl<'lua> LuaStack<'lua> {
    pub(crate) fn new(lua: &'lua Lua, temporaries: &'lua Temporaries, values: MultiValue<'lua>) -> Self {
        Self {
            lua,
            temporaries,
            values: values.into_vec(),
        }
    }

    pub(crate) fn single(lua: &'lua Lua, temporaries: &'lua Temporaries, value: Value<'lua>) -> Self {
        Self {
            lua,
            temporaries,
            values: vec![value],
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn position(&self, index: i32) -> Option<usize> {
        let len = self.values.len() as i64;
        let index = i64::from(index);
        let position = match index {
            0 => return None,
            i if i > 0 => i - 1,
            i => len + i,
        };
        (0..len).contains(&position).then_some(position as usize)
    }

    pub fn value(&self, index: i32) -> Option<&Value<'lua>> {
        self.position(index).map(|position| &self.values[position])
    }

    /// Converts the value at `index` with `mlua`'s conversion rules.
    /// Missing indices convert from `nil`.
    pub fn get<T: FromLua<'lua>>(&self, index: i32) -> BridgeResult<T> {
        let value = self.value(index).cloned().unwrap_or(Value::Nil);
        Ok(T::from_lua(value, self.lua)?)
    }

    pub fn get_number(&self, index: i32) -> Option<f64> {
        match self.value(index)? {
            Value::Number(n) => Some(*n),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn get_bool(&self, index: i32) -> Option<bool> {
        self.value(index)?.as_boolean()
    }

    pub fn get_string(&self, index: i32) -> Option<String> {
        match self.value(index)? {
            Value::String(s) => s.to_str().ok().map(str::to_owned),
            _ => None,
        }
    }

    pub fn get_temporary(&self, index: i32) -> Option<TempHandle> {
        self.value(index)?
            .as_light_userdata()
            .and_then(TempHandle::from_light_userdata)
    }

    pub fn get_vector3(&self, index: i32) -> Option<Vec3> {
        self.temporaries.vector3(self.get_temporary(index)?)
    }

    pub fn get_quaternion(&self, index: i32) -> Option<Quat> {
        self.temporaries.quaternion(self.get_temporary(index)?)
    }

    pub fn get_matrix4x4(&self, index: i32) -> Option<Mat4> {
        self.temporaries.matrix4x4(self.get_temporary(index)?)
    }

    /// Deserializes a table or scalar at `index` into a Rust value.
    pub fn deserialize<T: DeserializeOwned>(&self, index: i32) -> BridgeResult<T> {
        let value = self.value(index).cloned().unwrap_or(Value::Nil);
        Ok(self.lua.from_value(value)?)
    }

    pub fn into_values(self) -> Vec<Value<'lua>> {
        self.values
    }
}

impl std::fmt::Debug for LuaStack<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.values.iter()).finish()
    }
}
