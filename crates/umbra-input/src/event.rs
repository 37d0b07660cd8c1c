//! Engine input events.

use glam::Vec2;
use winit::event::{DeviceEvent, ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// An input event as seen by listeners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    KeyPressed(KeyCode),
    KeyReleased(KeyCode),
    /// Raw mouse motion in device units.
    MouseMotion(Vec2),
}

impl InputEvent {
    /// Translate a keyboard window event. Key repeats and keys without a
    /// physical code are dropped.
    pub fn from_window_event(event: &WindowEvent) -> Option<Self> {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return None;
        };
        let PhysicalKey::Code(code) = event.physical_key else {
            return None;
        };
        match event.state {
            ElementState::Pressed if event.repeat => None,
            ElementState::Pressed => Some(Self::KeyPressed(code)),
            ElementState::Released => Some(Self::KeyReleased(code)),
        }
    }

    /// Translate raw mouse motion.
    pub fn from_device_event(event: &DeviceEvent) -> Option<Self> {
        match event {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => {
                Some(Self::MouseMotion(Vec2::new(*dx as f32, *dy as f32)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_motion_translates() {
        let event = DeviceEvent::MouseMotion { delta: (3.0, -1.5) };
        assert_eq!(
            InputEvent::from_device_event(&event),
            Some(InputEvent::MouseMotion(Vec2::new(3.0, -1.5)))
        );
    }

    #[test]
    fn other_events_are_ignored() {
        assert_eq!(
            InputEvent::from_device_event(&DeviceEvent::Added),
            None
        );
        assert_eq!(
            InputEvent::from_window_event(&WindowEvent::Focused(true)),
            None
        );
    }
}
