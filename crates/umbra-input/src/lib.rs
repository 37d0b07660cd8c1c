//! Input handling for the Umbra engine.
//!
//! Window and device events are translated into [`InputEvent`]s and pushed
//! through an [`EventDispatcher`] to every attached [`EventListener`], in
//! attachment order. [`InputState`] is a listener that keeps the current
//! keyboard state and the mouse motion accumulated since the last frame.

mod dispatcher;
mod event;
mod state;

pub use dispatcher::{EventDispatcher, EventListener, ListenerId};
pub use event::InputEvent;
pub use state::{InputState, KeyboardState};

pub use winit::event::{DeviceEvent, WindowEvent};
pub use winit::keyboard::KeyCode;
