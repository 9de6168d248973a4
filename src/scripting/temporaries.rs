//! Fixed-capacity scratch pools for math values handed to Lua.
//!
//! Native functions never give scripts an owned math value. They copy it into
//! the next free slot of a pool and return a [`TempHandle`]. All handles are
//! invalidated together by [`TempArena::reset`], which only rewinds the used
//! counts and advances the arena generation; slot memory is reused as is.
//!
//! Inside Lua a handle travels as a light userdata whose address bits encode
//! `(arena, generation, kind, index)`. Nothing is dereferenced on the way
//! back, the bits are decoded and checked against the arena.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use log::{error, trace};
use mlua::LightUserData;
use parking_lot::{Mutex, MutexGuard};
use static_assertions::const_assert;

use crate::config::{MAX_LUA_MATRIX4X4, MAX_LUA_QUATERNION, MAX_LUA_VECTOR3};

use super::error::{BridgeError, BridgeResult};

const INDEX_BITS: u32 = 14;
const KIND_BITS: u32 = 2;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const KIND_MASK: u32 = (1 << KIND_BITS) - 1;
const GENERATION_SHIFT: u32 = INDEX_BITS + KIND_BITS;
const ARENA_SHIFT: u32 = 32;

// The arena id occupies the upper half of the light userdata address.
const_assert!(usize::BITS >= 64);

static NEXT_ARENA_ID: AtomicU32 = AtomicU32::new(1);

/// Largest pool capacity a [`TempHandle`] can address.
pub const MAX_POOL_CAPACITY: usize = 1 << INDEX_BITS;

/// Which pool a temporary lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TempKind {
    Vector3 = 1,
    Quaternion = 2,
    Matrix4x4 = 3,
}

impl TempKind {
    fn from_bits(bits: u32) -> Option<Self> {
        match bits {
            1 => Some(Self::Vector3),
            2 => Some(Self::Quaternion),
            3 => Some(Self::Matrix4x4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Vector3 => "Vector3",
            Self::Quaternion => "Quaternion",
            Self::Matrix4x4 => "Matrix4x4",
        }
    }

    pub fn capacity(self) -> usize {
        match self {
            Self::Vector3 => MAX_LUA_VECTOR3,
            Self::Quaternion => MAX_LUA_QUATERNION,
            Self::Matrix4x4 => MAX_LUA_MATRIX4X4,
        }
    }
}

impl fmt::Display for TempKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Reference to a slot in one of the temporary pools.
///
/// A handle is only meaningful for the arena that issued it and only until the
/// next reset. Lookups through a stale or foreign handle return `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TempHandle {
    arena: u32,
    kind: TempKind,
    index: u16,
    generation: u16,
}

impl TempHandle {
    fn new(arena: u32, kind: TempKind, index: usize, generation: u16) -> Self {
        debug_assert!(index < MAX_POOL_CAPACITY);
        Self {
            arena,
            kind,
            index: index as u16,
            generation,
        }
    }

    pub fn kind(self) -> TempKind {
        self.kind
    }

    pub fn index(self) -> usize {
        usize::from(self.index)
    }

    pub fn generation(self) -> u16 {
        self.generation
    }

    fn pack(self) -> u64 {
        (u64::from(self.arena) << ARENA_SHIFT)
            | (u64::from(self.generation) << GENERATION_SHIFT)
            | ((self.kind as u64) << INDEX_BITS)
            | u64::from(self.index)
    }

    fn unpack(bits: u64) -> Option<Self> {
        let low = bits as u32;
        let kind = TempKind::from_bits((low >> INDEX_BITS) & KIND_MASK)?;
        Some(Self {
            arena: (bits >> ARENA_SHIFT) as u32,
            kind,
            index: (low & INDEX_MASK) as u16,
            generation: (low >> GENERATION_SHIFT) as u16,
        })
    }

    /// Encodes the handle as a Lua light userdata.
    ///
    /// The kind bits are never zero, so the encoded value is never `NULL`.
    pub fn to_light_userdata(self) -> LightUserData {
        LightUserData(self.pack() as usize as *mut c_void)
    }

    /// Decodes a light userdata produced by [`TempHandle::to_light_userdata`].
    pub fn from_light_userdata(value: LightUserData) -> Option<Self> {
        Self::unpack(value.0 as usize as u64)
    }
}

/// Used-counts of the three pools, saved and restored around nested calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TempCount {
    pub vector3: u32,
    pub quaternion: u32,
    pub matrix4x4: u32,
}

impl TempCount {
    pub const fn new(vector3: u32, quaternion: u32, matrix4x4: u32) -> Self {
        Self {
            vector3,
            quaternion,
            matrix4x4,
        }
    }
}

struct TempPool<T, const N: usize> {
    slots: Box<[T]>,
    used: usize,
}

impl<T: Copy + Default, const N: usize> TempPool<T, N> {
    fn new() -> Self {
        Self {
            slots: vec![T::default(); N].into_boxed_slice(),
            used: 0,
        }
    }

    fn push(&mut self, value: T) -> Option<usize> {
        if self.used == N {
            return None;
        }
        let index = self.used;
        self.slots[index] = value;
        self.used += 1;
        Some(index)
    }

    fn get(&self, index: usize) -> Option<&T> {
        self.slots[..self.used].get(index)
    }

    fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots[..self.used].get_mut(index)
    }
}

/// The three temporary pools plus the generation shared by their handles.
///
/// Each arena carries a process-unique id, so a handle issued by one arena
/// never validates in another.
pub struct TempArena {
    vector3: TempPool<Vec3, MAX_LUA_VECTOR3>,
    quaternion: TempPool<Quat, MAX_LUA_QUATERNION>,
    matrix4x4: TempPool<Mat4, MAX_LUA_MATRIX4X4>,
    id: u32,
    generation: u16,
}

impl Default for TempArena {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TempArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempArena")
            .field("id", &self.id)
            .field("count", &self.count())
            .field("generation", &self.generation)
            .finish()
    }
}

impl TempArena {
    pub fn new() -> Self {
        Self {
            vector3: TempPool::new(),
            quaternion: TempPool::new(),
            matrix4x4: TempPool::new(),
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
        }
    }

    pub fn next_vector3(&mut self, value: Vec3) -> BridgeResult<TempHandle> {
        let index = issue(&mut self.vector3, TempKind::Vector3, value)?;
        Ok(TempHandle::new(self.id, TempKind::Vector3, index, self.generation))
    }

    pub fn next_quaternion(&mut self, value: Quat) -> BridgeResult<TempHandle> {
        let index = issue(&mut self.quaternion, TempKind::Quaternion, value)?;
        Ok(TempHandle::new(self.id, TempKind::Quaternion, index, self.generation))
    }

    pub fn next_matrix4x4(&mut self, value: Mat4) -> BridgeResult<TempHandle> {
        let index = issue(&mut self.matrix4x4, TempKind::Matrix4x4, value)?;
        Ok(TempHandle::new(self.id, TempKind::Matrix4x4, index, self.generation))
    }

    fn live_index(&self, handle: TempHandle, kind: TempKind) -> Option<usize> {
        let live = handle.arena == self.id
            && handle.kind == kind
            && handle.generation == self.generation;
        live.then(|| handle.index())
    }

    pub fn vector3(&self, handle: TempHandle) -> Option<Vec3> {
        let index = self.live_index(handle, TempKind::Vector3)?;
        self.vector3.get(index).copied()
    }

    pub fn quaternion(&self, handle: TempHandle) -> Option<Quat> {
        let index = self.live_index(handle, TempKind::Quaternion)?;
        self.quaternion.get(index).copied()
    }

    pub fn matrix4x4(&self, handle: TempHandle) -> Option<Mat4> {
        let index = self.live_index(handle, TempKind::Matrix4x4)?;
        self.matrix4x4.get(index).copied()
    }

    pub fn vector3_mut(&mut self, handle: TempHandle) -> Option<&mut Vec3> {
        let index = self.live_index(handle, TempKind::Vector3)?;
        self.vector3.get_mut(index)
    }

    pub fn quaternion_mut(&mut self, handle: TempHandle) -> Option<&mut Quat> {
        let index = self.live_index(handle, TempKind::Quaternion)?;
        self.quaternion.get_mut(index)
    }

    pub fn matrix4x4_mut(&mut self, handle: TempHandle) -> Option<&mut Mat4> {
        let index = self.live_index(handle, TempKind::Matrix4x4)?;
        self.matrix4x4.get_mut(index)
    }

    pub fn is_vector3(&self, handle: TempHandle) -> bool {
        self.vector3(handle).is_some()
    }

    pub fn is_quaternion(&self, handle: TempHandle) -> bool {
        self.quaternion(handle).is_some()
    }

    pub fn is_matrix4x4(&self, handle: TempHandle) -> bool {
        self.matrix4x4(handle).is_some()
    }

    pub fn count(&self) -> TempCount {
        TempCount {
            vector3: self.vector3.used as u32,
            quaternion: self.quaternion.used as u32,
            matrix4x4: self.matrix4x4.used as u32,
        }
    }

    /// Rewinds or advances the used-counts. Either all three apply or none do.
    pub fn set_count(&mut self, count: TempCount) -> BridgeResult<()> {
        check_count(TempKind::Vector3, count.vector3)?;
        check_count(TempKind::Quaternion, count.quaternion)?;
        check_count(TempKind::Matrix4x4, count.matrix4x4)?;
        self.vector3.used = count.vector3 as usize;
        self.quaternion.used = count.quaternion as usize;
        self.matrix4x4.used = count.matrix4x4 as usize;
        Ok(())
    }

    /// Invalidates every handle issued so far.
    pub fn reset(&mut self) {
        self.vector3.used = 0;
        self.quaternion.used = 0;
        self.matrix4x4.used = 0;
        self.generation = self.generation.wrapping_add(1);
        trace!("temporaries reset, generation {}", self.generation);
    }
}

fn issue<T: Copy + Default, const N: usize>(
    pool: &mut TempPool<T, N>,
    kind: TempKind,
    value: T,
) -> BridgeResult<usize> {
    pool.push(value).ok_or_else(|| {
        error!(
            "temporary {kind} pool exhausted ({capacity} slots); raise the limit in config.rs",
            capacity = N
        );
        BridgeError::PoolExhausted { kind, capacity: N }
    })
}

fn check_count(kind: TempKind, count: u32) -> BridgeResult<()> {
    let capacity = kind.capacity();
    if count as usize > capacity {
        return Err(BridgeError::CountOutOfRange {
            kind,
            count,
            capacity,
        });
    }
    Ok(())
}

/// Shared capability to the temporary arena of one `LuaEnvironment`.
///
/// Every native function registered through the environment receives a
/// reference to this. The lock is held for a single pool operation only, so a
/// native callback may re-enter Lua without deadlocking.
#[derive(Clone, Default)]
pub struct Temporaries {
    arena: Arc<Mutex<TempArena>>,
}

impl fmt::Debug for Temporaries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.arena.try_lock() {
            Some(arena) => f.debug_tuple("Temporaries").field(&*arena).finish(),
            None => f.write_str("Temporaries(<locked>)"),
        }
    }
}

impl Temporaries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the arena for several operations in a row.
    ///
    /// Do not call into Lua while the guard is alive.
    pub fn lock(&self) -> MutexGuard<'_, TempArena> {
        self.arena.lock()
    }

    pub fn next_vector3(&self, value: Vec3) -> BridgeResult<TempHandle> {
        self.arena.lock().next_vector3(value)
    }

    pub fn next_quaternion(&self, value: Quat) -> BridgeResult<TempHandle> {
        self.arena.lock().next_quaternion(value)
    }

    pub fn next_matrix4x4(&self, value: Mat4) -> BridgeResult<TempHandle> {
        self.arena.lock().next_matrix4x4(value)
    }

    pub fn vector3(&self, handle: TempHandle) -> Option<Vec3> {
        self.arena.lock().vector3(handle)
    }

    pub fn quaternion(&self, handle: TempHandle) -> Option<Quat> {
        self.arena.lock().quaternion(handle)
    }

    pub fn matrix4x4(&self, handle: TempHandle) -> Option<Mat4> {
        self.arena.lock().matrix4x4(handle)
    }

    pub fn is_vector3(&self, handle: TempHandle) -> bool {
        self.arena.lock().is_vector3(handle)
    }

    pub fn is_quaternion(&self, handle: TempHandle) -> bool {
        self.arena.lock().is_quaternion(handle)
    }

    pub fn is_matrix4x4(&self, handle: TempHandle) -> bool {
        self.arena.lock().is_matrix4x4(handle)
    }

    pub fn count(&self) -> TempCount {
        self.arena.lock().count()
    }

    pub fn set_count(&self, count: TempCount) -> BridgeResult<()> {
        self.arena.lock().set_count(count)
    }

    pub fn reset(&self) {
        self.arena.lock().reset();
    }

    /// Saves the current counts and restores them when the guard drops.
    ///
    /// Temporaries issued inside the scope land above the saved counts and
    /// are released on exit; those issued before it stay untouched.
    pub fn scope(&self) -> TempScope {
        TempScope {
            temporaries: self.clone(),
            saved: self.count(),
        }
    }
}

/// Guard returned by [`Temporaries::scope`].
#[must_use = "the saved counts are restored when the scope is dropped"]
pub struct TempScope {
    temporaries: Temporaries,
    saved: TempCount,
}

impl TempScope {
    pub fn saved(&self) -> TempCount {
        self.saved
    }
}

impl Drop for TempScope {
    fn drop(&mut self) {
        // Counts captured from the same arena are always within capacity.
        let _ = self.temporaries.set_count(self.saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn issued_vectors_are_distinct_and_readable() {
        let mut arena = TempArena::new();
        let mut seen = HashSet::new();
        let mut handles = Vec::new();
        for i in 0..64 {
            let handle = arena.next_vector3(Vec3::splat(i as f32)).unwrap();
            assert!(seen.insert(handle.index()));
            assert!(arena.is_vector3(handle));
            handles.push(handle);
        }
        assert_eq!(arena.count().vector3, 64);
        assert_eq!(handles[10].index(), 10);
        assert_eq!(arena.vector3(handles[10]), Some(Vec3::splat(10.0)));
    }

    #[test]
    fn reset_rewinds_counts_and_reuses_first_slot() {
        let mut arena = TempArena::new();
        let stale = arena.next_vector3(Vec3::X).unwrap();
        arena.next_quaternion(Quat::IDENTITY).unwrap();
        arena.next_matrix4x4(Mat4::IDENTITY).unwrap();

        arena.reset();
        assert_eq!(arena.count(), TempCount::default());
        assert!(!arena.is_vector3(stale));

        let fresh = arena.next_vector3(Vec3::Y).unwrap();
        assert_eq!(fresh.index(), 0);
        assert_eq!(arena.next_quaternion(Quat::IDENTITY).unwrap().index(), 0);
        assert_eq!(arena.next_matrix4x4(Mat4::IDENTITY).unwrap().index(), 0);
        assert_eq!(arena.vector3(fresh), Some(Vec3::Y));
    }

    #[test]
    fn set_count_round_trips() {
        let mut arena = TempArena::new();
        let count = TempCount::new(3, 7, 11);
        arena.set_count(count).unwrap();
        assert_eq!(arena.count(), count);
    }

    #[test]
    fn set_count_rejects_values_above_capacity() {
        let mut arena = TempArena::new();
        arena.set_count(TempCount::new(1, 1, 1)).unwrap();
        let err = arena
            .set_count(TempCount::new(0, 0, MAX_LUA_MATRIX4X4 as u32 + 1))
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::CountOutOfRange {
                kind: TempKind::Matrix4x4,
                ..
            }
        ));
        assert_eq!(arena.count(), TempCount::new(1, 1, 1));
    }

    #[test]
    fn handles_are_tagged_by_pool() {
        let mut arena = TempArena::new();
        let vector = arena.next_vector3(Vec3::ONE).unwrap();
        let rotation = arena.next_quaternion(Quat::IDENTITY).unwrap();
        let matrix = arena.next_matrix4x4(Mat4::IDENTITY).unwrap();

        assert!(arena.is_vector3(vector));
        assert!(!arena.is_vector3(rotation));
        assert!(!arena.is_vector3(matrix));
        assert!(arena.is_quaternion(rotation));
        assert!(!arena.is_quaternion(vector));
        assert!(arena.is_matrix4x4(matrix));
        assert!(!arena.is_matrix4x4(rotation));
    }

    #[test]
    fn exhausted_pool_fails_without_wrapping() {
        let mut arena = TempArena::new();
        let first = arena.next_matrix4x4(Mat4::IDENTITY).unwrap();
        for _ in 1..MAX_LUA_MATRIX4X4 {
            arena.next_matrix4x4(Mat4::IDENTITY).unwrap();
        }
        let err = arena.next_matrix4x4(Mat4::ZERO).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::PoolExhausted {
                kind: TempKind::Matrix4x4,
                capacity: MAX_LUA_MATRIX4X4,
            }
        ));
        assert_eq!(arena.matrix4x4(first), Some(Mat4::IDENTITY));
    }

    #[test]
    fn handles_survive_light_userdata_encoding() {
        let mut arena = TempArena::new();
        arena.reset();
        arena.next_quaternion(Quat::IDENTITY).unwrap();
        let handle = arena.next_quaternion(Quat::from_rotation_y(1.0)).unwrap();
        let light = handle.to_light_userdata();
        assert!(!light.0.is_null());
        assert_eq!(TempHandle::from_light_userdata(light), Some(handle));
        assert_eq!(
            TempHandle::from_light_userdata(LightUserData(std::ptr::null_mut())),
            None
        );
    }

    #[test]
    fn handles_do_not_validate_in_another_arena() {
        let mut first = TempArena::new();
        let mut second = TempArena::new();
        let from_first = first.next_vector3(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        second.next_vector3(Vec3::splat(9.0)).unwrap();

        assert!(first.is_vector3(from_first));
        assert!(!second.is_vector3(from_first));
        assert_eq!(second.vector3(from_first), None);
        assert!(second.vector3_mut(from_first).is_none());

        let decoded = TempHandle::from_light_userdata(from_first.to_light_userdata());
        assert_eq!(decoded, Some(from_first));
        assert!(!second.is_vector3(from_first));
    }

    #[test]
    fn debug_does_not_block_while_locked() {
        let temporaries = Temporaries::new();
        let guard = temporaries.lock();
        assert_eq!(format!("{temporaries:?}"), "Temporaries(<locked>)");
        drop(guard);
        assert!(format!("{temporaries:?}").starts_with("Temporaries(TempArena"));
    }

    #[test]
    fn scope_restores_outer_counts() {
        let temporaries = Temporaries::new();
        let outer = temporaries.next_vector3(Vec3::new(1.0, 2.0, 3.0)).unwrap();
        {
            let scope = temporaries.scope();
            assert_eq!(scope.saved().vector3, 1);
            let inner = temporaries.next_vector3(Vec3::ZERO).unwrap();
            assert_eq!(inner.index(), 1);
        }
        assert_eq!(temporaries.count().vector3, 1);
        assert_eq!(temporaries.vector3(outer), Some(Vec3::new(1.0, 2.0, 3.0)));
    }
}
