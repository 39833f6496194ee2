// Keyboard teleop input: WASD move, Z/X rotate, U/J lift, Q/Esc/Ctrl-C quit
//
// Runs on its own thread and feeds press/release events into `SharedInput`.
// Terminals that support the kitty keyboard protocol report real key releases;
// elsewhere a key counts as released once it stops auto-repeating.

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, KeyboardEnhancementFlags,
    PopKeyboardEnhancementFlags, PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{self, disable_raw_mode, enable_raw_mode};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::input::{Binding, SharedInput};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

// Without release events, treat a key as released after this long with no repeat
const HOLD_TIMEOUT: Duration = Duration::from_millis(100);

/// Key bindings of the AlohaMini teleop scripts
pub fn binding_for(code: KeyCode) -> Option<Binding> {
    let KeyCode::Char(c) = code else {
        return None;
    };
    match c.to_ascii_lowercase() {
        'w' => Some(Binding::Forward),
        's' => Some(Binding::Backward),
        'a' => Some(Binding::Left),
        'd' => Some(Binding::Right),
        'z' => Some(Binding::RotateLeft),
        'x' => Some(Binding::RotateRight),
        'u' => Some(Binding::Up),
        'j' => Some(Binding::Down),
        _ => None,
    }
}

fn is_quit(key: &KeyEvent) -> bool {
    match key.code {
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => true,
        KeyCode::Char('c') => key.modifiers.contains(KeyModifiers::CONTROL),
        _ => false,
    }
}

/// Tracks held keys when the terminal only reports presses and repeats
#[derive(Debug, Default)]
struct HoldTracker {
    last_seen: HashMap<Binding, Instant>,
}

impl HoldTracker {
    fn touch(&mut self, binding: Binding, now: Instant) {
        self.last_seen.insert(binding, now);
    }

    /// Bindings whose last press is older than the hold timeout
    fn expire(&mut self, now: Instant) -> Vec<Binding> {
        let expired: Vec<Binding> = self
            .last_seen
            .iter()
            .filter(|&(_, &seen)| now.duration_since(seen) > HOLD_TIMEOUT)
            .map(|(&binding, _)| binding)
            .collect();
        for binding in &expired {
            self.last_seen.remove(binding);
        }
        expired
    }
}

/// Raw-mode keyboard reader on a background thread
pub struct KeyboardListener {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl KeyboardListener {
    /// Put the terminal in raw mode and start forwarding keys
    ///
    /// `quit` is set to `true` when the operator asks to leave.
    pub fn spawn(input: SharedInput, quit: watch::Sender<bool>) -> io::Result<Self> {
        enable_raw_mode()?;
        let release_events = terminal::supports_keyboard_enhancement().unwrap_or(false);
        if release_events {
            execute!(
                io::stdout(),
                PushKeyboardEnhancementFlags(KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
            )?;
        } else {
            warn!(
                "Terminal does not report key releases; keys release {}ms after the last repeat",
                HOLD_TIMEOUT.as_millis()
            );
        }

        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("keyboard".to_string())
            .spawn(move || {
                if let Err(e) = read_keys(&input, &quit, &flag, release_events) {
                    warn!("Keyboard input failed: {}", e);
                    let _ = quit.send(true);
                }
                input.clear();
            })?;

        info!("Controls: W/S forward/back, A/D strafe, Z/X rotate, U/J lift, Q or Esc to quit");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }
}

fn read_keys(
    input: &SharedInput,
    quit: &watch::Sender<bool>,
    running: &AtomicBool,
    release_events: bool,
) -> io::Result<()> {
    let mut holds = HoldTracker::default();

    while running.load(Ordering::Relaxed) {
        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if is_quit(&key) && key.kind != KeyEventKind::Release {
                    info!("Quit requested from keyboard");
                    let _ = quit.send(true);
                    return Ok(());
                }

                if let Some(binding) = binding_for(key.code) {
                    match key.kind {
                        KeyEventKind::Press | KeyEventKind::Repeat => {
                            input.press(binding);
                            if !release_events {
                                holds.touch(binding, Instant::now());
                            }
                        }
                        KeyEventKind::Release => input.release(binding),
                    }
                    debug!("Key {:?} {:?}", binding, key.kind);
                }
            }
        }

        if !release_events {
            for binding in holds.expire(Instant::now()) {
                input.release(binding);
            }
        }
    }

    Ok(())
}

impl Drop for KeyboardListener {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        let _ = execute!(io::stdout(), PopKeyboardEnhancementFlags);
        if let Err(e) = disable_raw_mode() {
            warn!("Failed to restore terminal: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_bindings() {
        assert_eq!(binding_for(KeyCode::Char('w')), Some(Binding::Forward));
        assert_eq!(binding_for(KeyCode::Char('W')), Some(Binding::Forward));
        assert_eq!(binding_for(KeyCode::Char('j')), Some(Binding::Down));
        assert_eq!(binding_for(KeyCode::Char('p')), None);
        assert_eq!(binding_for(KeyCode::Up), None);
    }

    #[test]
    fn test_quit_keys() {
        assert!(is_quit(&KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
    }

    #[test]
    fn test_hold_tracker_expires_stale_keys() {
        let mut holds = HoldTracker::default();
        let start = Instant::now();
        holds.touch(Binding::Forward, start);
        holds.touch(Binding::Left, start + Duration::from_millis(80));

        let expired = holds.expire(start + Duration::from_millis(150));
        assert_eq!(expired, vec![Binding::Forward]);
        assert!(holds.expire(start + Duration::from_millis(150)).is_empty());
        assert_eq!(
            holds.expire(start + Duration::from_millis(300)),
            vec![Binding::Left]
        );
    }
}
