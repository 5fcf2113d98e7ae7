use crate::{
    backend::{InputBackend, SyntheticEvent, WindowHandle},
    keys::VirtualKey,
    MacroError,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, thread, time::Duration};
use tracing::{debug, warn};

/// Represents a position on the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Represents the type of mouse button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    pub fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "Left",
            MouseButton::Right => "Right",
        }
    }
}

impl fmt::Display for MouseButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MouseButton {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("left") {
            Ok(MouseButton::Left)
        } else if s.eq_ignore_ascii_case("right") {
            Ok(MouseButton::Right)
        } else {
            Err(format!("unknown mouse button '{}'", s))
        }
    }
}

/// The action a macro line performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MacroAction {
    SendKey,
    PressKey,
    ReleaseKey,
    PressButton,
    ReleaseButton,
    Wait,
}

impl MacroAction {
    pub const ALL: [MacroAction; 6] = [
        MacroAction::SendKey,
        MacroAction::PressKey,
        MacroAction::ReleaseKey,
        MacroAction::PressButton,
        MacroAction::ReleaseButton,
        MacroAction::Wait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MacroAction::SendKey => "SendKey",
            MacroAction::PressKey => "PressKey",
            MacroAction::ReleaseKey => "ReleaseKey",
            MacroAction::PressButton => "PressButton",
            MacroAction::ReleaseButton => "ReleaseButton",
            MacroAction::Wait => "Wait",
        }
    }
}

impl fmt::Display for MacroAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MacroAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MacroAction::ALL
            .into_iter()
            .find(|action| action.as_str().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

/// Parameters of the key actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTarget {
    pub key: String,
    pub code: VirtualKey,
    pub window: String,
}

/// Parameters of the button actions. `point` is in screen coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonTarget {
    pub button: MouseButton,
    pub point: Point,
    pub window: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemKind {
    SendKey(KeyTarget),
    PressKey(KeyTarget),
    ReleaseKey(KeyTarget),
    PressButton(ButtonTarget),
    ReleaseButton(ButtonTarget),
    Wait { milliseconds: u64 },
}

/// A single step of a macro.
///
/// Key names are resolved when the item is built; the target window is only
/// looked up when the item executes, so a whole sequence can be loaded before
/// any window exists. `last_error` holds the platform error code of the last
/// failed `execute` (0 when there is none or the failure was an unknown key).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroItem {
    kind: ItemKind,
    last_error: i32,
}

impl MacroItem {
    fn key(window: &str, key: &str) -> KeyTarget {
        let code = VirtualKey::resolve(key);
        if !code.is_resolved() {
            warn!("Key '{}' does not resolve to a virtual key; the item will fail on execute", key);
        }
        KeyTarget {
            key: key.to_string(),
            code,
            window: window.to_string(),
        }
    }

    fn button(window: &str, button: MouseButton, point: Point) -> ButtonTarget {
        ButtonTarget {
            button,
            point,
            window: window.to_string(),
        }
    }

    fn from_kind(kind: ItemKind) -> Self {
        Self { kind, last_error: 0 }
    }

    pub fn send_key(window: &str, key: &str) -> Self {
        Self::from_kind(ItemKind::SendKey(Self::key(window, key)))
    }

    pub fn press_key(window: &str, key: &str) -> Self {
        Self::from_kind(ItemKind::PressKey(Self::key(window, key)))
    }

    pub fn release_key(window: &str, key: &str) -> Self {
        Self::from_kind(ItemKind::ReleaseKey(Self::key(window, key)))
    }

    pub fn press_button(window: &str, button: MouseButton, point: Point) -> Self {
        Self::from_kind(ItemKind::PressButton(Self::button(window, button, point)))
    }

    pub fn release_button(window: &str, button: MouseButton, point: Point) -> Self {
        Self::from_kind(ItemKind::ReleaseButton(Self::button(window, button, point)))
    }

    pub fn wait(milliseconds: u64) -> Self {
        Self::from_kind(ItemKind::Wait { milliseconds })
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }

    pub fn action(&self) -> MacroAction {
        match self.kind {
            ItemKind::SendKey(_) => MacroAction::SendKey,
            ItemKind::PressKey(_) => MacroAction::PressKey,
            ItemKind::ReleaseKey(_) => MacroAction::ReleaseKey,
            ItemKind::PressButton(_) => MacroAction::PressButton,
            ItemKind::ReleaseButton(_) => MacroAction::ReleaseButton,
            ItemKind::Wait { .. } => MacroAction::Wait,
        }
    }

    /// The window this item sends input to, `None` for Wait
    pub fn target_window(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::SendKey(k) | ItemKind::PressKey(k) | ItemKind::ReleaseKey(k) => Some(&k.window),
            ItemKind::PressButton(b) | ItemKind::ReleaseButton(b) => Some(&b.window),
            ItemKind::Wait { .. } => None,
        }
    }

    /// The key name of a key item, `None` for buttons and Wait
    pub fn key_name(&self) -> Option<&str> {
        match &self.kind {
            ItemKind::SendKey(k) | ItemKind::PressKey(k) | ItemKind::ReleaseKey(k) => Some(&k.key),
            _ => None,
        }
    }

    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    /// Run the item against the backend.
    ///
    /// Returns false on the first failing step; nothing is injected after that.
    pub fn execute(&mut self, backend: &dyn InputBackend) -> bool {
        let outcome = match &self.kind {
            ItemKind::Wait { milliseconds } => {
                thread::sleep(Duration::from_millis(*milliseconds));
                Ok(())
            }
            ItemKind::SendKey(target) => execute_key(backend, target, |window, code| {
                backend.post_event(window, SyntheticEvent::KeyDown(code))?;
                let pause = rand::thread_rng().gen_range(70..130);
                thread::sleep(Duration::from_millis(pause));
                backend.post_event(window, SyntheticEvent::KeyUp(code))
            }),
            ItemKind::PressKey(target) => execute_key(backend, target, |window, code| {
                backend.post_event(window, SyntheticEvent::KeyDown(code))
            }),
            ItemKind::ReleaseKey(target) => execute_key(backend, target, |window, code| {
                backend.post_event(window, SyntheticEvent::KeyUp(code))
            }),
            ItemKind::PressButton(target) => execute_button(backend, target, |button, point| {
                SyntheticEvent::ButtonDown { button, point }
            }),
            ItemKind::ReleaseButton(target) => execute_button(backend, target, |button, point| {
                SyntheticEvent::ButtonUp { button, point }
            }),
        };

        match outcome {
            Ok(()) => {
                self.last_error = 0;
                true
            }
            Err(e) => {
                debug!("{} failed: {}", self, e);
                self.last_error = e.platform_code();
                false
            }
        }
    }
}

/// Failure that is not a platform error: the key name never resolved
fn unresolved_key(target: &KeyTarget) -> MacroError {
    MacroError::ConfigurationError(format!("key '{}' is not a known key", target.key))
}

fn focus_window(backend: &dyn InputBackend, title: &str) -> crate::Result<WindowHandle> {
    let window = backend.find_window(title)?;
    backend.bring_to_foreground(window)?;
    Ok(window)
}

fn execute_key(
    backend: &dyn InputBackend,
    target: &KeyTarget,
    inject: impl FnOnce(WindowHandle, VirtualKey) -> crate::Result<()>,
) -> crate::Result<()> {
    if !target.code.is_resolved() {
        return Err(unresolved_key(target));
    }
    let window = focus_window(backend, &target.window)?;
    inject(window, target.code)
}

fn execute_button(
    backend: &dyn InputBackend,
    target: &ButtonTarget,
    event: impl FnOnce(MouseButton, Point) -> SyntheticEvent,
) -> crate::Result<()> {
    let window = focus_window(backend, &target.window)?;
    let client = backend.screen_to_client(window, target.point)?;
    backend.post_event(window, event(target.button, client))
}

/// Renders the item as one macro file line
impl fmt::Display for MacroItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = self.action();
        match &self.kind {
            ItemKind::SendKey(k) | ItemKind::PressKey(k) | ItemKind::ReleaseKey(k) => {
                write!(f, "{} {}", action, k.key)
            }
            ItemKind::PressButton(b) | ItemKind::ReleaseButton(b) => {
                write!(f, "{} {} {} {}", action, b.button, b.point.x, b.point.y)
            }
            ItemKind::Wait { milliseconds } => write!(f, "{} {}", action, milliseconds),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{
        fake::{ERROR_ACCESS_DENIED, ERROR_INVALID_PARAMETER, ERROR_INVALID_WINDOW_HANDLE},
        FakeBackend,
    };

    #[test]
    fn test_action_parsing_is_case_insensitive() {
        assert_eq!("presskey".parse::<MacroAction>(), Ok(MacroAction::PressKey));
        assert_eq!("WAIT".parse::<MacroAction>(), Ok(MacroAction::Wait));
        assert_eq!("Fly".parse::<MacroAction>(), Err(()));
        assert_eq!("right".parse::<MouseButton>(), Ok(MouseButton::Right));
        assert!("middle".parse::<MouseButton>().is_err());
    }

    #[test]
    fn test_items_render_as_macro_lines() {
        assert_eq!(MacroItem::send_key("Notepad", "Enter").to_string(), "SendKey Enter");
        assert_eq!(MacroItem::release_key("Notepad", "a").to_string(), "ReleaseKey a");
        assert_eq!(
            MacroItem::press_button("Notepad", MouseButton::Right, Point::new(10, -4)).to_string(),
            "PressButton Right 10 -4"
        );
        assert_eq!(MacroItem::wait(250).to_string(), "Wait 250");
    }

    #[test]
    fn test_wait_always_succeeds_and_clears_error() {
        let backend = FakeBackend::new();
        let mut item = MacroItem::wait(1);
        item.last_error = 42;

        assert!(item.execute(&backend));
        assert_eq!(item.last_error(), 0);
        assert!(item.execute(&backend));
        assert_eq!(item.last_error(), 0);
        assert!(backend.posted_events().is_empty());
    }

    #[test]
    fn test_press_key_focuses_and_posts() {
        let backend = FakeBackend::new();
        let window = backend.add_window("Notepad", Point::new(0, 0));
        let mut item = MacroItem::press_key("Notepad", "enter");

        assert!(item.execute(&backend));
        assert_eq!(backend.foreground(), Some(window));
        assert_eq!(
            backend.posted_events(),
            vec![(window, SyntheticEvent::KeyDown(VirtualKey::ENTER))]
        );
    }

    #[test]
    fn test_send_key_posts_down_then_up() {
        let backend = FakeBackend::new();
        let window = backend.add_window("Notepad", Point::new(0, 0));
        let mut item = MacroItem::send_key("Notepad", "x");

        assert!(item.execute(&backend));
        assert_eq!(
            backend.posted_events(),
            vec![
                (window, SyntheticEvent::KeyDown(VirtualKey(0x58))),
                (window, SyntheticEvent::KeyUp(VirtualKey(0x58))),
            ]
        );
    }

    #[test]
    fn test_unknown_key_fails_fast_without_platform_error() {
        let backend = FakeBackend::new();
        backend.add_window("Notepad", Point::new(0, 0));
        let mut item = MacroItem::press_key("Notepad", "hyper");

        assert!(!item.execute(&backend));
        assert_eq!(item.last_error(), 0);
        assert_eq!(backend.foreground(), None);
        assert!(backend.posted_events().is_empty());
    }

    #[test]
    fn test_missing_window_records_platform_error() {
        let backend = FakeBackend::new();
        let mut item = MacroItem::release_key("Calculator", "A");

        assert!(!item.execute(&backend));
        assert_eq!(item.last_error(), ERROR_INVALID_WINDOW_HANDLE);
    }

    #[test]
    fn test_foreground_failure_stops_before_injection() {
        let backend = FakeBackend::new();
        backend.add_window("Notepad", Point::new(0, 0));
        backend.deny_foreground(true);
        let mut item = MacroItem::press_key("Notepad", "A");

        assert!(!item.execute(&backend));
        assert_eq!(item.last_error(), ERROR_ACCESS_DENIED);
        assert!(backend.posted_events().is_empty());
    }

    #[test]
    fn test_failed_client_translation_stops_before_injection() {
        let backend = FakeBackend::new();
        let window = backend.add_window("Paint", Point::new(100, 50));
        backend.deny_client_translation(true);
        let mut press = MacroItem::press_button("Paint", MouseButton::Right, Point::new(130, 75));

        assert!(!press.execute(&backend));
        assert_eq!(press.last_error(), ERROR_INVALID_PARAMETER);
        assert_eq!(backend.foreground(), Some(window));
        assert!(backend.posted_events().is_empty());
    }

    #[test]
    fn test_button_coordinates_are_translated_to_client_space() {
        let backend = FakeBackend::new();
        let window = backend.add_window("Paint", Point::new(100, 50));
        let mut press = MacroItem::press_button("Paint", MouseButton::Left, Point::new(130, 75));
        let mut release = MacroItem::release_button("Paint", MouseButton::Left, Point::new(140, 80));

        assert!(press.execute(&backend));
        assert!(release.execute(&backend));
        assert_eq!(
            backend.posted_events(),
            vec![
                (
                    window,
                    SyntheticEvent::ButtonDown { button: MouseButton::Left, point: Point::new(30, 25) }
                ),
                (
                    window,
                    SyntheticEvent::ButtonUp { button: MouseButton::Left, point: Point::new(40, 30) }
                ),
            ]
        );
    }

    #[test]
    fn test_success_clears_previous_error() {
        let backend = FakeBackend::new();
        let mut item = MacroItem::press_key("Notepad", "A");
        assert!(!item.execute(&backend));
        assert_ne!(item.last_error(), 0);

        backend.add_window("Notepad", Point::new(0, 0));
        assert!(item.execute(&backend));
        assert_eq!(item.last_error(), 0);
    }
}
