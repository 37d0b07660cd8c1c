//! Polled input state, fed by events.

use glam::Vec2;
use hashbrown::HashSet;
use winit::keyboard::KeyCode;

use crate::dispatcher::EventListener;
use crate::event::InputEvent;

/// Which keys are down, and which went down this frame.
#[derive(Debug, Default)]
pub struct KeyboardState {
    held: HashSet<KeyCode>,
    pressed: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, key: KeyCode) {
        if self.held.insert(key) {
            self.pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        self.held.remove(&key);
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    /// Whether `key` went down since the last [`end_frame`](Self::end_frame).
    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn end_frame(&mut self) {
        self.pressed.clear();
    }

    pub fn clear(&mut self) {
        self.held.clear();
        self.pressed.clear();
    }
}

/// Keyboard state plus mouse motion accumulated over a frame.
#[derive(Debug, Default)]
pub struct InputState {
    keyboard: KeyboardState,
    mouse_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::KeyPressed(key) => self.keyboard.press(key),
            InputEvent::KeyReleased(key) => self.keyboard.release(key),
            InputEvent::MouseMotion(delta) => self.mouse_delta += delta,
        }
    }

    pub const fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.keyboard.is_held(key)
    }

    pub fn was_pressed(&self, key: KeyCode) -> bool {
        self.keyboard.was_pressed(key)
    }

    pub const fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Reset per-frame state. Call once per frame after reading it.
    pub fn end_frame(&mut self) {
        self.keyboard.end_frame();
        self.mouse_delta = Vec2::ZERO;
    }
}

impl EventListener for InputState {
    fn on_event(&mut self, event: &InputEvent) {
        self.apply(event);
    }
}
