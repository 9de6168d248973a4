use glam::{Mat4, Quat, Vec3};
use log::{debug, error, info, warn};
use mlua::{
    FromLuaMulti, IntoLua, IntoLuaMulti, Lua, LuaOptions, MultiValue, Result as LuaResult,
    StdLib, Table, Value,
};

use super::bindings;
use super::error::{BridgeError, BridgeResult};
use super::resource::LuaResource;
use super::stack::LuaStack;
use super::temporaries::{TempCount, TempHandle, Temporaries};

/// A positional argument passed from native code to a Lua global.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Argument {
    Float(f64),
    /// A pooled vector, rotation or matrix issued by the same environment.
    Temporary(TempHandle),
}

impl<'lua> IntoLua<'lua> for Argument {
    fn into_lua(self, _: &'lua Lua) -> LuaResult<Value<'lua>> {
        Ok(match self {
            Argument::Float(value) => Value::Number(value),
            Argument::Temporary(handle) => Value::LightUserData(handle.to_light_userdata()),
        })
    }
}

/// Owns a Lua state and the temporary pools shared with its native functions.
///
/// The environment is single-threaded: `mlua::Lua` is not `Send`, so it stays
/// on the thread that created it. It is intentionally not `Clone`.
pub struct LuaEnvironment {
    lua: Lua,
    temporaries: Temporaries,
    libs_loaded: bool,
}

impl LuaEnvironment {
    pub fn new() -> BridgeResult<Self> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default()).map_err(BridgeError::Init)?;
        debug!("created Lua state");
        Ok(Self {
            lua,
            temporaries: Temporaries::new(),
            libs_loaded: false,
        })
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Capability handed to native functions that need to issue temporaries.
    pub fn temporaries(&self) -> &Temporaries {
        &self.temporaries
    }

    pub fn is_ready(&self) -> bool {
        self.libs_loaded
    }

    /// Installs the engine modules. Calling it again is a no-op.
    pub fn load_libs(&mut self) -> BridgeResult<()> {
        if self.libs_loaded {
            return Ok(());
        }
        bindings::register_libs(self)?;
        self.libs_loaded = true;
        info!("Lua engine libraries loaded");
        Ok(())
    }

    fn ensure_ready(&self) -> BridgeResult<()> {
        if self.libs_loaded {
            Ok(())
        } else {
            Err(BridgeError::NotReady)
        }
    }

    /// Runs a text or precompiled resource and returns whatever it returned.
    pub fn execute(&self, resource: &LuaResource) -> BridgeResult<LuaStack<'_>> {
        self.ensure_ready()?;
        debug!(
            "executing {} ({} bytes{})",
            resource.name(),
            resource.data().len(),
            if resource.is_bytecode() { ", bytecode" } else { "" }
        );
        let result = self
            .lua
            .load(resource.data())
            .set_name(resource.name())
            .eval::<MultiValue>();
        self.finish_chunk(resource.name(), result)
    }

    pub fn execute_string(&self, source: &str) -> BridgeResult<LuaStack<'_>> {
        self.ensure_ready()?;
        let result = self.lua.load(source).set_name("=string").eval::<MultiValue>();
        self.finish_chunk("string", result)
    }

    fn finish_chunk<'lua>(
        &'lua self,
        chunk: &str,
        result: LuaResult<MultiValue<'lua>>,
    ) -> BridgeResult<LuaStack<'lua>> {
        match result {
            Ok(values) => Ok(LuaStack::new(&self.lua, &self.temporaries, values)),
            Err(source) => {
                error!("Lua error in {chunk}: {source}");
                Err(BridgeError::Script {
                    chunk: chunk.to_owned(),
                    source,
                })
            }
        }
    }

    fn module_table(&self, module: &str) -> BridgeResult<Table<'_>> {
        let globals = self.lua.globals();
        if let Some(table) = globals.get::<_, Option<Table>>(module)? {
            return Ok(table);
        }
        let table = self.lua.create_table()?;
        globals.set(module, table.clone())?;
        Ok(table)
    }

    fn module_metatable(&self, module: &str) -> BridgeResult<Table<'_>> {
        let table = self.module_table(module)?;
        if let Some(metatable) = table.get_metatable() {
            return Ok(metatable);
        }
        let metatable = self.lua.create_table()?;
        table.set_metatable(Some(metatable.clone()));
        Ok(metatable)
    }

    /// Registers `func` as `module.name`, creating the module table if needed.
    /// A later registration under the same name replaces the earlier one.
    pub fn add_module_function<'lua, A, R, F>(
        &'lua self,
        module: &str,
        name: &str,
        func: F,
    ) -> BridgeResult<()>
    where
        A: FromLuaMulti<'lua>,
        R: IntoLuaMulti<'lua>,
        F: Fn(&'lua Lua, &Temporaries, A) -> LuaResult<R> + 'static,
    {
        let temporaries = self.temporaries.clone();
        let function = self
            .lua
            .create_function(move |lua, args: A| func(lua, &temporaries, args))?;
        self.module_table(module)?.set(name, function)?;
        Ok(())
    }

    /// Exposes the existing global function `global` as `module.name`.
    pub fn add_module_function_alias(
        &self,
        module: &str,
        name: &str,
        global: &str,
    ) -> BridgeResult<()> {
        let function = match self.lua.globals().get::<_, Value>(global)? {
            Value::Function(function) => function,
            Value::Nil => return Err(BridgeError::MissingGlobal(global.to_owned())),
            other => {
                return Err(BridgeError::NotCallable {
                    name: global.to_owned(),
                    type_name: other.type_name(),
                })
            }
        };
        self.module_table(module)?.set(name, function)?;
        Ok(())
    }

    /// Like [`add_module_function`](Self::add_module_function), but installs
    /// `func` in the module's metatable, e.g. `__call` or `__index`.
    pub fn add_module_metafunction<'lua, A, R, F>(
        &'lua self,
        module: &str,
        name: &str,
        func: F,
    ) -> BridgeResult<()>
    where
        A: FromLuaMulti<'lua>,
        R: IntoLuaMulti<'lua>,
        F: Fn(&'lua Lua, &Temporaries, A) -> LuaResult<R> + 'static,
    {
        let temporaries = self.temporaries.clone();
        let function = self
            .lua
            .create_function(move |lua, args: A| func(lua, &temporaries, args))?;
        self.module_metatable(module)?.set(name, function)?;
        Ok(())
    }

    /// Calls the global function `name` with `args` in order.
    ///
    /// Returns `None` if the global is missing, is not a function, or raised an
    /// error; the failure is logged. Use [`try_call_global`](Self::try_call_global)
    /// to inspect it instead.
    pub fn call_global(&self, name: &str, args: &[Argument]) -> Option<LuaStack<'_>> {
        match self.try_call_global(name, args) {
            Ok(stack) => Some(stack),
            Err(err) => {
                warn!("{}", err.report());
                None
            }
        }
    }

    pub fn try_call_global(&self, name: &str, args: &[Argument]) -> BridgeResult<LuaStack<'_>> {
        self.ensure_ready()?;
        let function = match self.lua.globals().get::<_, Value>(name)? {
            Value::Function(function) => function,
            Value::Nil => return Err(BridgeError::MissingGlobal(name.to_owned())),
            other => {
                return Err(BridgeError::NotCallable {
                    name: name.to_owned(),
                    type_name: other.type_name(),
                })
            }
        };
        let args = args
            .iter()
            .map(|arg| arg.into_lua(&self.lua))
            .collect::<LuaResult<Vec<_>>>()?;
        let values = function
            .call::<_, MultiValue>(MultiValue::from_vec(args))
            .map_err(|source| BridgeError::Call {
                name: name.to_owned(),
                source,
            })?;
        Ok(LuaStack::new(&self.lua, &self.temporaries, values))
    }

    /// Reads a global without calling it.
    pub fn get_global(&self, name: &str) -> BridgeResult<LuaStack<'_>> {
        self.ensure_ready()?;
        let value = self.lua.globals().get::<_, Value>(name)?;
        Ok(LuaStack::single(&self.lua, &self.temporaries, value))
    }

    pub fn temp_count(&self) -> TempCount {
        self.temporaries.count()
    }

    pub fn set_temp_count(&self, count: TempCount) -> BridgeResult<()> {
        self.temporaries.set_count(count)
    }

    /// Invalidates every temporary issued since the previous reset. Call once
    /// per top-level script invocation.
    pub fn reset_temporaries(&self) {
        self.temporaries.reset();
    }

    pub fn next_vector3(&self, value: Vec3) -> BridgeResult<TempHandle> {
        self.temporaries.next_vector3(value)
    }

    pub fn next_quaternion(&self, value: Quat) -> BridgeResult<TempHandle> {
        self.temporaries.next_quaternion(value)
    }

    pub fn next_matrix4x4(&self, value: Mat4) -> BridgeResult<TempHandle> {
        self.temporaries.next_matrix4x4(value)
    }

    pub fn is_vector3(&self, handle: TempHandle) -> bool {
        self.temporaries.is_vector3(handle)
    }

    pub fn is_quaternion(&self, handle: TempHandle) -> bool {
        self.temporaries.is_quaternion(handle)
    }

    pub fn is_matrix4x4(&self, handle: TempHandle) -> bool {
        self.temporaries.is_matrix4x4(handle)
    }
}
