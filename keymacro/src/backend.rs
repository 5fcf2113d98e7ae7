use crate::{keys::VirtualKey, MouseButton, Point, Result};
use std::{sync::Arc, time::Duration};

pub mod fake;
#[cfg(target_os = "windows")]
mod windows;

pub use self::fake::FakeBackend;
#[cfg(target_os = "windows")]
pub use self::windows::WindowsBackend;

/// Opaque handle to a top-level window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub isize);

/// Opaque handle to an installed input hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HookHandle(pub u64);

/// Mouse buttons as reported by the hook. Only Left and Right are ever recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerButton {
    Left,
    Right,
    Middle,
    X1,
    X2,
}

impl PointerButton {
    pub fn recordable(self) -> Option<MouseButton> {
        match self {
            PointerButton::Left => Some(MouseButton::Left),
            PointerButton::Right => Some(MouseButton::Right),
            _ => None,
        }
    }
}

/// A raw input message observed by the global hook
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    KeyDown { key: VirtualKey, system: bool },
    KeyUp { key: VirtualKey, system: bool },
    ButtonDown { button: PointerButton, point: Point },
    ButtonUp { button: PointerButton, point: Point },
    MouseMove { point: Point },
    Wheel { point: Point, delta: i32 },
}

/// A raw input message plus its timestamp in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawInputEvent {
    pub timestamp: u64,
    pub kind: RawEventKind,
}

impl RawInputEvent {
    pub fn new(timestamp: u64, kind: RawEventKind) -> Self {
        Self { timestamp, kind }
    }
}

/// An event injected into a target window. Button points are client coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticEvent {
    KeyDown(VirtualKey),
    KeyUp(VirtualKey),
    ButtonDown { button: MouseButton, point: Point },
    ButtonUp { button: MouseButton, point: Point },
}

/// Invoked synchronously by the backend for every raw input event.
/// The backend forwards the event to normal processing afterwards.
pub type HookCallback = Arc<dyn Fn(&RawInputEvent) + Send + Sync + 'static>;

/// The common trait that all platform-specific input backends must implement
pub trait InputBackend: Send + Sync {
    /// Locate a top-level window by its exact title
    fn find_window(&self, title: &str) -> Result<WindowHandle>;

    /// Make the window the foreground window
    fn bring_to_foreground(&self, window: WindowHandle) -> Result<()>;

    /// Translate a screen point into the window's client coordinates
    fn screen_to_client(&self, window: WindowHandle, point: Point) -> Result<Point>;

    /// Post a synthetic input event to the window
    fn post_event(&self, window: WindowHandle, event: SyntheticEvent) -> Result<()>;

    /// Titles of all visible top-level windows
    fn list_windows(&self) -> Result<Vec<String>>;

    /// Install a global low-level key and mouse hook
    fn install_hook(&self, callback: HookCallback) -> Result<HookHandle>;

    /// Dispatch pending input messages, waiting at most `timeout`.
    /// Returns true if anything was dispatched.
    fn pump_events(&self, timeout: Duration) -> bool;

    /// Remove a hook installed by `install_hook`
    fn uninstall(&self, handle: HookHandle) -> Result<()>;
}

/// Create the input backend for the current platform
pub fn create_backend() -> Result<Arc<dyn InputBackend>> {
    #[cfg(target_os = "windows")]
    {
        Ok(Arc::new(WindowsBackend::new()))
    }
    #[cfg(not(target_os = "windows"))]
    {
        Err(crate::MacroError::UnsupportedPlatform(
            "Window input injection is only supported on Windows".to_string(),
        ))
    }
}
