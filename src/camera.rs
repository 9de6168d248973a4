use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::input::{InputState, KeyCode, NamedKey};

const PITCH_LIMIT: f32 = FRAC_PI_2 - 0.01;

/// Tuning for a [`MovableCamera`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    /// Units per second.
    pub speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensibility: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.1,
            far: 1000.0,
            speed: 5.0,
            mouse_sensibility: 0.002,
        }
    }
}

/// First-person camera: WASD or the arrow keys move and strafe, the mouse turns.
///
/// Yaw rotates around world +Y, pitch around the camera's local X. With both at
/// zero the camera looks down -Z.
#[derive(Debug, Clone)]
pub struct MovableCamera {
    position: Vec3,
    yaw: f32,
    pitch: f32,
    settings: CameraSettings,
    active: bool,
}

impl MovableCamera {
    pub fn new(position: Vec3, settings: CameraSettings) -> Self {
        Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            settings,
            active: true,
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn speed(&self) -> f32 {
        self.settings.speed
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.settings.speed = speed.max(0.0);
    }

    pub fn mouse_sensibility(&self) -> f32 {
        self.settings.mouse_sensibility
    }

    pub fn set_mouse_sensibility(&mut self, sensibility: f32) {
        self.settings.mouse_sensibility = sensibility;
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        self.settings.aspect = aspect.max(0.01);
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// An inactive camera ignores input but still renders.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn rotation(&self) -> Quat {
        Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(self.pitch)
    }

    pub fn forward(&self) -> Vec3 {
        self.rotation() * Vec3::NEG_Z
    }

    pub fn right(&self) -> Vec3 {
        self.rotation() * Vec3::X
    }

    /// Turns the camera by a mouse motion in pixels.
    pub fn look(&mut self, delta: Vec2) {
        let sensibility = self.settings.mouse_sensibility;
        self.yaw -= delta.x * sensibility;
        self.pitch = (self.pitch - delta.y * sensibility).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Applies one frame of input. `dt` is in seconds.
    pub fn update(&mut self, input: &InputState, dt: f32) {
        if !self.active {
            return;
        }
        self.look(input.take_mouse_delta());

        let pressed = |named: NamedKey, letter: char| {
            input.is_key_down(KeyCode::Named(named)) || input.is_key_down(KeyCode::Character(letter))
        };
        let mut direction = Vec3::ZERO;
        if pressed(NamedKey::Up, 'W') {
            direction += self.forward();
        }
        if pressed(NamedKey::Down, 'S') {
            direction -= self.forward();
        }
        if pressed(NamedKey::Left, 'A') {
            direction -= self.right();
        }
        if pressed(NamedKey::Right, 'D') {
            direction += self.right();
        }
        self.position += direction.normalize_or_zero() * self.settings.speed * dt;
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, self.forward(), Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh_gl(
            self.settings.fov.to_radians(),
            self.settings.aspect,
            self.settings.near,
            self.settings.far,
        )
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}
