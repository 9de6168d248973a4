//! Engine modules installed into every `LuaEnvironment` by `load_libs`.
//!
//! Math values reach scripts only as pooled temporaries. Arguments accept a
//! temporary or, for vectors and rotations, a plain table such as
//! `{x = 1, y = 2, z = 3}` or `{1, 2, 3}`.

use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};
use log::info;
use mlua::{FromLua, LightUserData, Lua, Result as LuaResult, Table, Value, Variadic};
use parking_lot::RwLock;

use crate::camera::MovableCamera;
use crate::interpolation;

use super::environment::LuaEnvironment;
use super::error::BridgeResult;
use super::temporaries::{TempHandle, Temporaries};

pub(super) fn register_libs(env: &LuaEnvironment) -> BridgeResult<()> {
    register_print(env.lua())?;
    register_vector3(env)?;
    register_quaternion(env)?;
    register_matrix4x4(env)?;
    register_math(env)?;
    Ok(())
}

fn register_print(lua: &Lua) -> LuaResult<()> {
    let print = lua.create_function(|lua, values: Variadic<Value>| {
        let mut out = Vec::with_capacity(values.len());
        for value in values.iter() {
            let text = match value {
                Value::Nil => "nil".to_string(),
                Value::Boolean(b) => b.to_string(),
                Value::String(s) => s.to_str()?.to_string(),
                Value::LightUserData(ud) => match TempHandle::from_light_userdata(*ud) {
                    Some(handle) => format!("{}#{}", handle.kind(), handle.index()),
                    None => format!("{:?}", value),
                },
                _ => match lua.coerce_string(value.clone())? {
                    Some(s) => s.to_str()?.to_string(),
                    None => format!("{:?}", value),
                },
            };
            out.push(text);
        }
        info!(target: "lua", "{}", out.join("\t"));
        Ok(())
    })?;
    lua.globals().set("print", print)?;
    Ok(())
}

fn register_vector3(env: &LuaEnvironment) -> BridgeResult<()> {
    const M: &str = "Vector3";
    env.add_module_metafunction(M, "__call", |lua, t, (_, args): (Table, Variadic<Value>)| {
        let value = match args.len() {
            1 => vector3_arg(t, args[0].clone())?,
            3 => Vec3::new(
                f32::from_lua(args[0].clone(), lua)?,
                f32::from_lua(args[1].clone(), lua)?,
                f32::from_lua(args[2].clone(), lua)?,
            ),
            n => {
                return Err(mlua::Error::RuntimeError(format!(
                    "Vector3 expects 3 numbers or one vector, got {n} arguments"
                )))
            }
        };
        vector3(t, value)
    })?;
    env.add_module_function(M, "x", |_, t, v: Value| Ok(vector3_arg(t, v)?.x))?;
    env.add_module_function(M, "y", |_, t, v: Value| Ok(vector3_arg(t, v)?.y))?;
    env.add_module_function(M, "z", |_, t, v: Value| Ok(vector3_arg(t, v)?.z))?;
    env.add_module_function(M, "set_x", |_, t, (v, n): (LightUserData, f32)| {
        update_vector3(t, v, |v| v.x = n)
    })?;
    env.add_module_function(M, "set_y", |_, t, (v, n): (LightUserData, f32)| {
        update_vector3(t, v, |v| v.y = n)
    })?;
    env.add_module_function(M, "set_z", |_, t, (v, n): (LightUserData, f32)| {
        update_vector3(t, v, |v| v.z = n)
    })?;
    env.add_module_function(M, "elements", |_, t, v: Value| {
        let v = vector3_arg(t, v)?;
        Ok((v.x, v.y, v.z))
    })?;
    env.add_module_function(M, "add", |_, t, (a, b): (Value, Value)| {
        let sum = vector3_arg(t, a)? + vector3_arg(t, b)?;
        vector3(t, sum)
    })?;
    env.add_module_function(M, "subtract", |_, t, (a, b): (Value, Value)| {
        let difference = vector3_arg(t, a)? - vector3_arg(t, b)?;
        vector3(t, difference)
    })?;
    env.add_module_function(M, "multiply", |_, t, (v, k): (Value, f32)| {
        let scaled = vector3_arg(t, v)? * k;
        vector3(t, scaled)
    })?;
    env.add_module_function(M, "dot", |_, t, (a, b): (Value, Value)| {
        Ok(vector3_arg(t, a)?.dot(vector3_arg(t, b)?))
    })?;
    env.add_module_function(M, "cross", |_, t, (a, b): (Value, Value)| {
        let cross = vector3_arg(t, a)?.cross(vector3_arg(t, b)?);
        vector3(t, cross)
    })?;
    env.add_module_function(M, "length", |_, t, v: Value| Ok(vector3_arg(t, v)?.length()))?;
    env.add_module_function(M, "normalize", |_, t, v: Value| {
        let unit = vector3_arg(t, v)?.normalize_or_zero();
        vector3(t, unit)
    })?;
    env.add_module_function(M, "distance", |_, t, (a, b): (Value, Value)| {
        Ok(vector3_arg(t, a)?.distance(vector3_arg(t, b)?))
    })?;
    env.add_module_function(M, "lerp", |_, t, (a, b, f): (Value, Value, f32)| {
        let blended = interpolation::linear(vector3_arg(t, a)?, vector3_arg(t, b)?, f);
        vector3(t, blended)
    })?;
    Ok(())
}

fn register_quaternion(env: &LuaEnvironment) -> BridgeResult<()> {
    const M: &str = "Quaternion";
    env.add_module_metafunction(M, "__call", |_, t, (_, axis, angle): (Table, Value, f32)| {
        let axis = vector3_arg(t, axis)?;
        let rotation = if axis.length_squared() > f32::EPSILON {
            Quat::from_axis_angle(axis.normalize(), angle)
        } else {
            Quat::IDENTITY
        };
        quaternion(t, rotation)
    })?;
    env.add_module_function(M, "from_euler", |_, t, (x, y, z): (f32, f32, f32)| {
        quaternion(t, Quat::from_euler(EulerRot::XYZ, x, y, z))
    })?;
    env.add_module_function(M, "multiply", |_, t, (a, b): (Value, Value)| {
        let product = quaternion_arg(t, a)? * quaternion_arg(t, b)?;
        quaternion(t, product)
    })?;
    env.add_module_function(M, "conjugate", |_, t, q: Value| {
        let conjugate = quaternion_arg(t, q)?.conjugate();
        quaternion(t, conjugate)
    })?;
    env.add_module_function(M, "length", |_, t, q: Value| Ok(quaternion_arg(t, q)?.length()))?;
    env.add_module_function(M, "elements", |_, t, q: Value| {
        let q = quaternion_arg(t, q)?;
        Ok((q.x, q.y, q.z, q.w))
    })?;
    env.add_module_function(M, "rotate", |_, t, (q, v): (Value, Value)| {
        let rotated = quaternion_arg(t, q)? * vector3_arg(t, v)?;
        vector3(t, rotated)
    })?;
    Ok(())
}

fn register_matrix4x4(env: &LuaEnvironment) -> BridgeResult<()> {
    const M: &str = "Matrix4x4";
    env.add_module_metafunction(M, "__call", |_, t, (_, values): (Table, Variadic<f32>)| {
        let columns: [f32; 16] = values.as_slice().try_into().map_err(|_| {
            mlua::Error::RuntimeError(format!(
                "Matrix4x4 expects 16 numbers, got {}",
                values.len()
            ))
        })?;
        matrix4x4(t, Mat4::from_cols_array(&columns))
    })?;
    env.add_module_function(M, "identity", |_, t, ()| matrix4x4(t, Mat4::IDENTITY))?;
    env.add_module_function(M, "from_quaternion", |_, t, q: Value| {
        let rotation = Mat4::from_quat(quaternion_arg(t, q)?);
        matrix4x4(t, rotation)
    })?;
    env.add_module_function(M, "from_translation", |_, t, v: Value| {
        let translation = Mat4::from_translation(vector3_arg(t, v)?);
        matrix4x4(t, translation)
    })?;
    env.add_module_function(
        M,
        "from_quaternion_translation",
        |_, t, (q, v): (Value, Value)| {
            let m = Mat4::from_rotation_translation(quaternion_arg(t, q)?, vector3_arg(t, v)?);
            matrix4x4(t, m)
        },
    )?;
    env.add_module_function(M, "multiply", |_, t, (a, b): (LightUserData, LightUserData)| {
        let product = matrix4x4_arg(t, a)? * matrix4x4_arg(t, b)?;
        matrix4x4(t, product)
    })?;
    env.add_module_function(M, "transpose", |_, t, m: LightUserData| {
        let transposed = matrix4x4_arg(t, m)?.transpose();
        matrix4x4(t, transposed)
    })?;
    env.add_module_function(M, "invert", |_, t, m: LightUserData| {
        let m = matrix4x4_arg(t, m)?;
        let inverse = m.inverse();
        if m.determinant() == 0.0 || !inverse.is_finite() {
            return Err(mlua::Error::RuntimeError(
                "Matrix4x4 is not invertible".into(),
            ));
        }
        matrix4x4(t, inverse)
    })?;
    env.add_module_function(M, "translation", |_, t, m: LightUserData| {
        let translation = matrix4x4_arg(t, m)?.w_axis.truncate();
        vector3(t, translation)
    })?;
    env.add_module_function(M, "rotation", |_, t, m: LightUserData| {
        let (_, rotation, _) = matrix4x4_arg(t, m)?.to_scale_rotation_translation();
        quaternion(t, rotation)
    })?;
    env.add_module_function(M, "transform", |_, t, (m, v): (LightUserData, Value)| {
        let point = matrix4x4_arg(t, m)?.transform_point3(vector3_arg(t, v)?);
        vector3(t, point)
    })?;
    env.add_module_function(M, "elements", |_, t, m: LightUserData| {
        Ok(Variadic::from_iter(matrix4x4_arg(t, m)?.to_cols_array()))
    })?;
    Ok(())
}

fn register_math(env: &LuaEnvironment) -> BridgeResult<()> {
    const M: &str = "Math";
    env.add_module_function(M, "lerp", |_, _, (a, b, f): (f32, f32, f32)| {
        Ok(interpolation::linear(a, b, f))
    })?;
    env.add_module_function(M, "cosine", |_, _, (a, b, f): (f32, f32, f32)| {
        Ok(interpolation::cosine(a, b, f))
    })?;
    env.add_module_function(M, "cubic", |_, _, (a, b, f): (f32, f32, f32)| {
        Ok(interpolation::cubic(a, b, f))
    })?;
    env.add_module_function(
        M,
        "bezier",
        |_, _, (p0, p1, p2, p3, f): (f32, f32, f32, f32, f32)| {
            Ok(interpolation::bezier(p0, p1, p2, p3, f))
        },
    )?;
    env.add_module_function(
        M,
        "catmull_rom",
        |_, _, (p0, p1, p2, p3, f): (f32, f32, f32, f32, f32)| {
            Ok(interpolation::catmull_rom(p0, p1, p2, p3, f))
        },
    )?;
    env.add_module_function(M, "lerp_vector3", |_, t, (a, b, f): (Value, Value, f32)| {
        let blended = interpolation::linear(vector3_arg(t, a)?, vector3_arg(t, b)?, f);
        vector3(t, blended)
    })?;
    Ok(())
}

/// Exposes `camera` to scripts as the `Camera` module.
pub fn register_camera(
    env: &LuaEnvironment,
    camera: Arc<RwLock<MovableCamera>>,
) -> BridgeResult<()> {
    const M: &str = "Camera";
    let cam = Arc::clone(&camera);
    env.add_module_function(M, "position", move |_, t, ()| {
        vector3(t, cam.read().position())
    })?;
    let cam = Arc::clone(&camera);
    env.add_module_function(M, "set_position", move |_, t, v: Value| {
        let position = vector3_arg(t, v)?;
        cam.write().set_position(position);
        Ok(())
    })?;
    let cam = Arc::clone(&camera);
    env.add_module_function(M, "rotation", move |_, t, ()| {
        quaternion(t, cam.read().rotation())
    })?;
    let cam = Arc::clone(&camera);
    env.add_module_function(M, "view", move |_, t, ()| {
        matrix4x4(t, cam.read().view_matrix())
    })?;
    let cam = Arc::clone(&camera);
    env.add_module_function(M, "speed", move |_, _, ()| Ok(cam.read().speed()))?;
    let cam = camera;
    env.add_module_function(M, "set_speed", move |_, _, speed: f32| {
        cam.write().set_speed(speed);
        Ok(())
    })?;
    Ok(())
}

fn vector3(temporaries: &Temporaries, value: Vec3) -> LuaResult<LightUserData> {
    Ok(temporaries.next_vector3(value)?.to_light_userdata())
}

fn quaternion(temporaries: &Temporaries, value: Quat) -> LuaResult<LightUserData> {
    Ok(temporaries.next_quaternion(value)?.to_light_userdata())
}

fn matrix4x4(temporaries: &Temporaries, value: Mat4) -> LuaResult<LightUserData> {
    Ok(temporaries.next_matrix4x4(value)?.to_light_userdata())
}

fn stale(to: &'static str) -> mlua::Error {
    mlua::Error::FromLuaConversionError {
        from: "lightuserdata",
        to,
        message: Some(format!("{to} temporary is stale or belongs to another pool")),
    }
}

fn vector3_arg(temporaries: &Temporaries, value: Value) -> LuaResult<Vec3> {
    match value {
        Value::LightUserData(ud) => TempHandle::from_light_userdata(ud)
            .and_then(|handle| temporaries.vector3(handle))
            .ok_or_else(|| stale("Vector3")),
        Value::Table(table) => Ok(Vec3::new(
            table_component(&table, "x", 1)?,
            table_component(&table, "y", 2)?,
            table_component(&table, "z", 3)?,
        )),
        _ => Err(mlua::Error::FromLuaConversionError {
            from: value.type_name(),
            to: "Vector3",
            message: Some("expected Vector3 temporary or table".into()),
        }),
    }
}

fn quaternion_arg(temporaries: &Temporaries, value: Value) -> LuaResult<Quat> {
    match value {
        Value::LightUserData(ud) => TempHandle::from_light_userdata(ud)
            .and_then(|handle| temporaries.quaternion(handle))
            .ok_or_else(|| stale("Quaternion")),
        Value::Table(table) => Ok(Quat::from_xyzw(
            table_component(&table, "x", 1)?,
            table_component(&table, "y", 2)?,
            table_component(&table, "z", 3)?,
            table_component(&table, "w", 4)?,
        )),
        _ => Err(mlua::Error::FromLuaConversionError {
            from: value.type_name(),
            to: "Quaternion",
            message: Some("expected Quaternion temporary or table".into()),
        }),
    }
}

fn matrix4x4_arg(temporaries: &Temporaries, value: LightUserData) -> LuaResult<Mat4> {
    TempHandle::from_light_userdata(value)
        .and_then(|handle| temporaries.matrix4x4(handle))
        .ok_or_else(|| stale("Matrix4x4"))
}

fn update_vector3(
    temporaries: &Temporaries,
    value: LightUserData,
    apply: impl FnOnce(&mut Vec3),
) -> LuaResult<()> {
    let handle = TempHandle::from_light_userdata(value).ok_or_else(|| stale("Vector3"))?;
    let mut arena = temporaries.lock();
    let slot = arena.vector3_mut(handle).ok_or_else(|| stale("Vector3"))?;
    apply(slot);
    Ok(())
}

fn table_component(table: &Table, key: &str, index: i32) -> LuaResult<f32> {
    if let Ok(value) = table.get::<_, f32>(key) {
        return Ok(value);
    }
    table.get::<_, f32>(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraSettings;
    use crate::config::MAX_LUA_VECTOR3;
    use crate::scripting::TempCount;

    fn ready_env() -> LuaEnvironment {
        let mut env = LuaEnvironment::new().unwrap();
        env.load_libs().unwrap();
        env
    }

    #[test]
    fn vector3_module_does_math_on_temporaries() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local a = Vector3(1, 2, 3)
                local b = Vector3({x = 4, y = 5, z = 6})
                local sum = Vector3.add(a, b)
                Vector3.set_y(sum, 10)
                return Vector3.dot(a, b),
                       Vector3.length(Vector3(3, 4, 0)),
                       sum,
                       Vector3.cross(Vector3(1, 0, 0), {0, 1, 0}),
                       Vector3.lerp(a, b, 0.5)
            "#,
            )
            .unwrap();
        assert_eq!(stack.get_number(1), Some(32.0));
        assert_eq!(stack.get_number(2), Some(5.0));
        assert_eq!(stack.get_vector3(3), Some(Vec3::new(5.0, 10.0, 9.0)));
        assert_eq!(stack.get_vector3(4), Some(Vec3::Z));
        assert_eq!(stack.get_vector3(5), Some(Vec3::new(2.5, 3.5, 4.5)));
        assert_eq!(env.temp_count().vector3, 7);
    }

    #[test]
    fn quaternion_rotates_vectors() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local q = Quaternion(Vector3(0, 1, 0), math.pi / 2)
                local v = Quaternion.rotate(q, Vector3(1, 0, 0))
                local c = Quaternion.conjugate(q)
                return v, Quaternion.length(q), Quaternion.multiply(q, c)
            "#,
            )
            .unwrap();
        let rotated = stack.get_vector3(1).unwrap();
        assert!(rotated.abs_diff_eq(Vec3::NEG_Z, 1e-5));
        assert!((stack.get_number(2).unwrap() - 1.0).abs() < 1e-6);
        assert!(stack.get_quaternion(3).unwrap().abs_diff_eq(Quat::IDENTITY, 1e-6));
    }

    #[test]
    fn matrix_module_composes_transforms() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local t = Matrix4x4.from_translation(Vector3(1, 2, 3))
                local r = Matrix4x4.from_quaternion(Quaternion(Vector3(0, 0, 1), math.pi))
                local m = Matrix4x4.multiply(t, r)
                local back = Matrix4x4.transform(Matrix4x4.invert(m), Vector3(1, 2, 3))
                return Matrix4x4.transform(m, Vector3(1, 0, 0)),
                       Matrix4x4.translation(m),
                       back,
                       select('#', Matrix4x4.elements(Matrix4x4.identity())),
                       Matrix4x4(1,0,0,0, 0,1,0,0, 0,0,1,0, 7,8,9,1)
            "#,
            )
            .unwrap();
        assert!(stack
            .get_vector3(1)
            .unwrap()
            .abs_diff_eq(Vec3::new(0.0, 2.0, 3.0), 1e-5));
        assert_eq!(stack.get_vector3(2), Some(Vec3::new(1.0, 2.0, 3.0)));
        assert!(stack.get_vector3(3).unwrap().abs_diff_eq(Vec3::ZERO, 1e-5));
        assert_eq!(stack.get_number(4), Some(16.0));
        assert_eq!(
            stack.get_matrix4x4(5),
            Some(Mat4::from_translation(Vec3::new(7.0, 8.0, 9.0)))
        );
    }

    #[test]
    fn vector3_constructor_accepts_numbers_tables_and_vectors() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local a = Vector3({x = 4, y = 5, z = 6})
                return a, Vector3({7, 8, 9}), Vector3(a), pcall(Vector3, 1, 2)
            "#,
            )
            .unwrap();
        assert_eq!(stack.get_vector3(1), Some(Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(stack.get_vector3(2), Some(Vec3::new(7.0, 8.0, 9.0)));
        assert_eq!(stack.get_vector3(3), Some(Vec3::new(4.0, 5.0, 6.0)));
        assert_eq!(stack.get_bool(4), Some(false));
    }

    #[test]
    fn invert_accepts_small_scale_and_rejects_singular() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local small = Matrix4x4(0.01,0,0,0, 0,0.01,0,0, 0,0,0.01,0, 0,0,0,1)
                local inverse = Matrix4x4.invert(small)
                local ok = pcall(Matrix4x4.invert, Matrix4x4(0,0,0,0, 0,0,0,0, 0,0,0,0, 0,0,0,1))
                return Matrix4x4.transform(inverse, Vector3(0.01, 0.02, 0.03)), ok
            "#,
            )
            .unwrap();
        assert!(stack
            .get_vector3(1)
            .unwrap()
            .abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-4));
        assert_eq!(stack.get_bool(2), Some(false));
    }

    #[test]
    fn matrix_constructor_requires_sixteen_numbers() {
        let env = ready_env();
        let stack = env
            .execute_string("return pcall(Matrix4x4, 1, 2, 3)")
            .unwrap();
        assert_eq!(stack.get_bool(1), Some(false));
    }

    #[test]
    fn math_module_interpolates() {
        let env = ready_env();
        let stack = env
            .execute_string(
                "return Math.lerp(0, 10, 0.25), Math.cubic(0, 1, 0.5), \
                 Math.catmull_rom(0, 1, 2, 3, 0.5), Math.bezier(0, 0, 1, 1, 1)",
            )
            .unwrap();
        assert_eq!(stack.get_number(1), Some(2.5));
        assert_eq!(stack.get_number(2), Some(0.5));
        assert_eq!(stack.get_number(3), Some(1.5));
        assert_eq!(stack.get_number(4), Some(1.0));
    }

    #[test]
    fn stale_temporaries_are_rejected_after_reset() {
        let env = ready_env();
        env.execute_string("held = Vector3(1, 2, 3)").unwrap();
        env.reset_temporaries();
        let stack = env
            .execute_string(
                r#"
                local ok, err = pcall(Vector3.x, held)
                return ok, tostring(err)
            "#,
            )
            .unwrap();
        assert_eq!(stack.get_bool(1), Some(false));
        assert!(stack.get_string(2).unwrap().contains("stale"));
    }

    #[test]
    fn wrong_pool_is_rejected() {
        let env = ready_env();
        let stack = env
            .execute_string(
                r#"
                local q = Quaternion.from_euler(0, 0, 0)
                return pcall(Vector3.x, q)
            "#,
            )
            .unwrap();
        assert_eq!(stack.get_bool(1), Some(false));
    }

    #[test]
    fn pool_exhaustion_is_a_catchable_error() {
        let env = ready_env();
        let script = format!(
            r#"
            local ok, err = pcall(function()
                for i = 1, {} do Vector3(i, 0, 0) end
            end)
            return ok, tostring(err)
            "#,
            MAX_LUA_VECTOR3 + 1
        );
        let stack = env.execute_string(&script).unwrap();
        assert_eq!(stack.get_bool(1), Some(false));
        assert!(stack.get_string(2).unwrap().contains("exhausted"));
        assert_eq!(env.temp_count().vector3 as usize, MAX_LUA_VECTOR3);
        env.reset_temporaries();
        assert_eq!(env.temp_count(), TempCount::default());
    }

    #[test]
    fn print_accepts_any_values() {
        let env = ready_env();
        env.execute_string("print('hello', 1, nil, true, {}, Vector3(0, 0, 0))")
            .unwrap();
    }

    #[test]
    fn camera_module_reads_and_moves_camera() {
        let env = ready_env();
        let camera = Arc::new(RwLock::new(MovableCamera::new(
            Vec3::new(0.0, 1.0, 5.0),
            CameraSettings::default(),
        )));
        register_camera(&env, Arc::clone(&camera)).unwrap();
        let stack = env
            .execute_string(
                r#"
                local p = Camera.position()
                Camera.set_position(Vector3.add(p, Vector3(1, 0, 0)))
                Camera.set_speed(Camera.speed() * 2)
                return Vector3.y(p), Camera.view()
            "#,
            )
            .unwrap();
        assert_eq!(stack.get_number(1), Some(1.0));
        assert_eq!(camera.read().position(), Vec3::new(1.0, 1.0, 5.0));
        assert_eq!(camera.read().speed(), 10.0);
        let view = stack.get_matrix4x4(2).unwrap();
        assert!(view
            .transform_point3(Vec3::new(1.0, 1.0, 5.0))
            .abs_diff_eq(Vec3::ZERO, 1e-5));
    }
}
