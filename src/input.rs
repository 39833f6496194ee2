// Operator input state
//
// Input events arrive on the input collaborator's thread; the control loop
// reads a copy once per tick. Both sides go through the same mutex so a tick
// never sees a half-applied event.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

/// Directional bindings understood by the control loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Binding {
    Up,
    Down,
    Forward,
    Backward,
    Left,
    Right,
    RotateLeft,
    RotateRight,
}

const BINDING_COUNT: usize = 8;

impl Binding {
    pub const ALL: [Binding; BINDING_COUNT] = [
        Binding::Up,
        Binding::Down,
        Binding::Forward,
        Binding::Backward,
        Binding::Left,
        Binding::Right,
        Binding::RotateLeft,
        Binding::RotateRight,
    ];

    /// Parse a binding name as sent by input sources
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Binding::Up),
            "down" => Some(Binding::Down),
            "forward" => Some(Binding::Forward),
            "backward" => Some(Binding::Backward),
            "left" => Some(Binding::Left),
            "right" => Some(Binding::Right),
            "rotate_left" => Some(Binding::RotateLeft),
            "rotate_right" => Some(Binding::RotateRight),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Binding::Up => "up",
            Binding::Down => "down",
            Binding::Forward => "forward",
            Binding::Backward => "backward",
            Binding::Left => "left",
            Binding::Right => "right",
            Binding::RotateLeft => "rotate_left",
            Binding::RotateRight => "rotate_right",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One flag per binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pressed: [bool; BINDING_COUNT],
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_press(&mut self, binding: Binding) {
        self.pressed[binding.index()] = true;
    }

    pub fn on_release(&mut self, binding: Binding) {
        self.pressed[binding.index()] = false;
    }

    /// Apply a named event; unknown names are ignored
    pub fn apply(&mut self, name: &str, pressed: bool) {
        match Binding::from_name(name) {
            Some(binding) if pressed => self.on_press(binding),
            Some(binding) => self.on_release(binding),
            None => debug!("Ignoring unknown binding {:?}", name),
        }
    }

    pub fn is_pressed(&self, binding: Binding) -> bool {
        self.pressed[binding.index()]
    }

    /// Release everything
    pub fn clear(&mut self) {
        self.pressed = Default::default();
    }

    /// Net direction of one axis: +1, -1, or 0 when both or neither are held
    pub fn resolve(&self, positive: Binding, negative: Binding) -> i8 {
        match (self.is_pressed(positive), self.is_pressed(negative)) {
            (true, false) => 1,
            (false, true) => -1,
            _ => 0,
        }
    }

    pub fn lift(&self) -> i8 {
        self.resolve(Binding::Up, Binding::Down)
    }

    pub fn forward(&self) -> i8 {
        self.resolve(Binding::Forward, Binding::Backward)
    }

    pub fn strafe(&self) -> i8 {
        self.resolve(Binding::Left, Binding::Right)
    }

    pub fn rotate(&self) -> i8 {
        self.resolve(Binding::RotateLeft, Binding::RotateRight)
    }
}

/// Handle to the input state shared between the input source and the control loop
#[derive(Debug, Clone, Default)]
pub struct SharedInput {
    inner: Arc<Mutex<InputState>>,
}

impl SharedInput {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, InputState> {
        // Flags are plain bools; a panic mid-update cannot leave them inconsistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn press(&self, binding: Binding) {
        self.lock().on_press(binding);
    }

    pub fn release(&self, binding: Binding) {
        self.lock().on_release(binding);
    }

    /// Entry point for `(binding, pressed)` events from input sources
    pub fn apply(&self, name: &str, pressed: bool) {
        self.lock().apply(name, pressed);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Copy of the current flags
    pub fn snapshot(&self) -> InputState {
        *self.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release_idempotent() {
        let mut state = InputState::new();
        state.on_press(Binding::Forward);
        state.on_press(Binding::Forward);
        assert!(state.is_pressed(Binding::Forward));
        state.on_release(Binding::Forward);
        state.on_release(Binding::Forward);
        assert!(!state.is_pressed(Binding::Forward));
    }

    #[test]
    fn test_resolve_axis() {
        let mut state = InputState::new();
        assert_eq!(state.lift(), 0);

        state.on_press(Binding::Up);
        assert_eq!(state.lift(), 1);

        state.on_press(Binding::Down);
        assert_eq!(state.lift(), 0, "opposite directions must cancel");

        state.on_release(Binding::Up);
        assert_eq!(state.lift(), -1);
    }

    #[test]
    fn test_axes_are_independent() {
        let mut state = InputState::new();
        state.on_press(Binding::Forward);
        state.on_press(Binding::Backward);
        state.on_press(Binding::RotateRight);
        state.on_press(Binding::Left);

        assert_eq!(state.forward(), 0);
        assert_eq!(state.rotate(), -1);
        assert_eq!(state.strafe(), 1);
        assert_eq!(state.lift(), 0);
    }

    #[test]
    fn test_unknown_binding_ignored() {
        let mut state = InputState::new();
        state.apply("jump", true);
        assert_eq!(state, InputState::new());

        state.apply("rotate_left", true);
        assert!(state.is_pressed(Binding::RotateLeft));
        state.apply("rotate_left", false);
        assert!(!state.is_pressed(Binding::RotateLeft));
    }

    #[test]
    fn test_binding_names_round_trip() {
        for binding in Binding::ALL {
            assert_eq!(Binding::from_name(binding.name()), Some(binding));
        }
    }

    #[test]
    fn test_shared_input_across_threads() {
        let shared = SharedInput::new();
        let writer = shared.clone();

        std::thread::spawn(move || {
            writer.apply("forward", true);
            writer.apply("right", true);
        })
        .join()
        .unwrap();

        let snapshot = shared.snapshot();
        assert_eq!(snapshot.forward(), 1);
        assert_eq!(snapshot.strafe(), -1);

        shared.clear();
        assert_eq!(shared.snapshot(), InputState::new());
    }
}
