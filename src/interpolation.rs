//! Interpolation between scalars or `glam` vectors.
//!
//! Every function takes `t` in `[0, 1]`; values outside that range extrapolate.

use std::f32::consts::PI;
use std::ops::{Add, Mul, Sub};

/// Values that can be blended by the functions in this module.
pub trait Interpolate: Copy + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> {}

impl<T> Interpolate for T where T: Copy + Add<Output = T> + Sub<Output = T> + Mul<f32, Output = T> {}

pub fn linear<T: Interpolate>(p0: T, p1: T, t: f32) -> T {
    p0 + (p1 - p0) * t
}

/// Eases in and out along half a cosine period.
pub fn cosine<T: Interpolate>(p0: T, p1: T, t: f32) -> T {
    let g = (1.0 - (t * PI).cos()) * 0.5;
    p0 + (p1 - p0) * g
}

/// Hermite blend with zero tangents at both ends.
pub fn cubic<T: Interpolate>(p0: T, p1: T, t: f32) -> T {
    let tt = t * t;
    let ttt = tt * t;
    p0 * (2.0 * ttt - 3.0 * tt + 1.0) + p1 * (3.0 * tt - 2.0 * ttt)
}

/// Cubic Bezier curve through `p0` and `p3` with control points `p1`, `p2`.
pub fn bezier<T: Interpolate>(p0: T, p1: T, p2: T, p3: T, t: f32) -> T {
    let u = 1.0 - t;
    let tt = t * t;
    let uu = u * u;
    p0 * (uu * u) + p1 * (3.0 * uu * t) + p2 * (3.0 * u * tt) + p3 * (tt * t)
}

/// Catmull-Rom spline segment between `p1` and `p2`.
pub fn catmull_rom<T: Interpolate>(p0: T, p1: T, p2: T, p3: T, t: f32) -> T {
    let tt = t * t;
    let ttt = tt * t;
    let a = p1 * 2.0;
    let b = (p2 - p0) * t;
    let c = (p0 * 2.0 - p1 * 5.0 + p2 * 4.0 - p3) * tt;
    let d = (p1 * 3.0 - p0 - p2 * 3.0 + p3) * ttt;
    (a + b + c + d) * 0.5
}
