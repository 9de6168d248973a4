use std::collections::HashSet;

use glam::Vec2;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = NamedKey::from_name(name) {
            return Some(Self::Named(key));
        }
        let mut chars = name.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphanumeric() => {
                Some(Self::Character(ch.to_ascii_uppercase()))
            }
            _ => None,
        }
    }
}

/// Non-character keys the camera and the runner react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Up,
    Down,
    Left,
    Right,
    Space,
    LeftShift,
    Escape,
}

impl NamedKey {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Up" => Self::Up,
            "Down" => Self::Down,
            "Left" => Self::Left,
            "Right" => Self::Right,
            "Space" => Self::Space,
            "LeftShift" | "LShift" => Self::LeftShift,
            "Escape" | "Esc" => Self::Escape,
            _ => return None,
        })
    }
}

/// Keyboard and mouse snapshot shared between the event loop and consumers
/// such as [`MovableCamera`](crate::camera::MovableCamera).
#[derive(Debug, Default)]
pub struct InputState {
    keys: RwLock<HashSet<KeyCode>>,
    mouse: RwLock<MouseState>,
}

#[derive(Debug, Default)]
struct MouseState {
    position: Vec2,
    delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_key_down(&self, key: KeyCode) {
        self.keys.write().insert(key);
    }

    pub fn set_key_up(&self, key: KeyCode) {
        self.keys.write().remove(&key);
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.read().contains(&key)
    }

    /// Looks a key up by name, e.g. `"W"` or `"Space"`. Unknown names read as up.
    pub fn is_key_down_by_name(&self, name: &str) -> bool {
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    /// Moves the cursor and accumulates the motion until the next
    /// [`take_mouse_delta`](Self::take_mouse_delta).
    pub fn set_mouse_position(&self, position: Vec2) {
        let mut mouse = self.mouse.write();
        let delta = position - mouse.position;
        mouse.delta += delta;
        mouse.position = position;
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse.read().position
    }

    pub fn take_mouse_delta(&self) -> Vec2 {
        std::mem::take(&mut self.mouse.write().delta)
    }
}
