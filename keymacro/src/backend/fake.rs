//! In-memory input backend.
//!
//! Windows are registered by title, raw events are queued and delivered to the
//! installed hook on `pump_events`, and every injected event is kept so callers
//! can inspect what playback would have sent.

use super::{
    HookCallback, HookHandle, InputBackend, RawInputEvent, SyntheticEvent, WindowHandle,
};
use crate::{MacroError, Point, Result};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};
use tracing::debug;

/// Failure codes the fake reports, mirroring common Win32 errors
pub const ERROR_INVALID_WINDOW_HANDLE: i32 = 1400;
pub const ERROR_ACCESS_DENIED: i32 = 5;
pub const ERROR_INVALID_PARAMETER: i32 = 87;

#[derive(Debug, Clone)]
struct FakeWindow {
    handle: WindowHandle,
    title: String,
    client_origin: Point,
}

#[derive(Default)]
struct FakeState {
    windows: Vec<FakeWindow>,
    posted: Vec<(WindowHandle, SyntheticEvent)>,
    pending: VecDeque<RawInputEvent>,
    hooks: HashMap<HookHandle, HookCallback>,
    foreground: Option<WindowHandle>,
    deny_foreground: bool,
    deny_client_translation: bool,
    uninstalled: Vec<HookHandle>,
}

#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
    next_id: AtomicU64,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a window whose client area starts at `client_origin` on screen
    pub fn add_window(&self, title: &str, client_origin: Point) -> WindowHandle {
        let handle = WindowHandle(self.next_id.fetch_add(1, Ordering::SeqCst) as isize + 1);
        self.lock().windows.push(FakeWindow {
            handle,
            title: title.to_string(),
            client_origin,
        });
        handle
    }

    pub fn remove_window(&self, title: &str) {
        self.lock().windows.retain(|w| w.title != title);
    }

    /// Make `bring_to_foreground` fail with `ERROR_ACCESS_DENIED`
    pub fn deny_foreground(&self, deny: bool) {
        self.lock().deny_foreground = deny;
    }

    /// Make `screen_to_client` fail with `ERROR_INVALID_PARAMETER`
    pub fn deny_client_translation(&self, deny: bool) {
        self.lock().deny_client_translation = deny;
    }

    /// Queue a raw event for delivery on the next `pump_events`
    pub fn queue_event(&self, event: RawInputEvent) {
        self.lock().pending.push_back(event);
    }

    pub fn queue_events(&self, events: impl IntoIterator<Item = RawInputEvent>) {
        self.lock().pending.extend(events);
    }

    /// Deliver a raw event to every installed hook right away
    pub fn emit(&self, event: &RawInputEvent) {
        let callbacks: Vec<HookCallback> = self.lock().hooks.values().cloned().collect();
        for callback in callbacks {
            callback(event);
        }
    }

    pub fn posted_events(&self) -> Vec<(WindowHandle, SyntheticEvent)> {
        self.lock().posted.clone()
    }

    pub fn foreground(&self) -> Option<WindowHandle> {
        self.lock().foreground
    }

    pub fn installed_hooks(&self) -> usize {
        self.lock().hooks.len()
    }

    pub fn uninstalled_hooks(&self) -> Vec<HookHandle> {
        self.lock().uninstalled.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn window(&self, handle: WindowHandle) -> Result<FakeWindow> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.handle == handle)
            .cloned()
            .ok_or_else(|| MacroError::platform("Window lookup", ERROR_INVALID_WINDOW_HANDLE))
    }
}

impl InputBackend for FakeBackend {
    fn find_window(&self, title: &str) -> Result<WindowHandle> {
        self.lock()
            .windows
            .iter()
            .find(|w| w.title == title)
            .map(|w| w.handle)
            .ok_or_else(|| MacroError::platform(format!("FindWindow(\"{}\")", title), ERROR_INVALID_WINDOW_HANDLE))
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<()> {
        self.window(window)?;
        let mut state = self.lock();
        if state.deny_foreground {
            return Err(MacroError::platform("SetForegroundWindow", ERROR_ACCESS_DENIED));
        }
        state.foreground = Some(window);
        Ok(())
    }

    fn screen_to_client(&self, window: WindowHandle, point: Point) -> Result<Point> {
        let window = self.window(window)?;
        if self.lock().deny_client_translation {
            return Err(MacroError::platform("ScreenToClient", ERROR_INVALID_PARAMETER));
        }
        Ok(Point {
            x: point.x - window.client_origin.x,
            y: point.y - window.client_origin.y,
        })
    }

    fn post_event(&self, window: WindowHandle, event: SyntheticEvent) -> Result<()> {
        self.window(window)?;
        debug!("Fake backend posting {:?} to {:?}", event, window);
        self.lock().posted.push((window, event));
        Ok(())
    }

    fn list_windows(&self) -> Result<Vec<String>> {
        Ok(self.lock().windows.iter().map(|w| w.title.clone()).collect())
    }

    fn install_hook(&self, callback: HookCallback) -> Result<HookHandle> {
        let handle = HookHandle(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.lock().hooks.insert(handle, callback);
        Ok(handle)
    }

    fn pump_events(&self, _timeout: Duration) -> bool {
        let (event, callbacks) = {
            let mut state = self.lock();
            match state.pending.pop_front() {
                Some(event) => (event, state.hooks.values().cloned().collect::<Vec<_>>()),
                None => return false,
            }
        };
        for callback in callbacks {
            callback(&event);
        }
        true
    }

    fn uninstall(&self, handle: HookHandle) -> Result<()> {
        let mut state = self.lock();
        if state.hooks.remove(&handle).is_none() {
            return Err(MacroError::platform("UnhookWindowsHookEx", ERROR_INVALID_WINDOW_HANDLE));
        }
        state.uninstalled.push(handle);
        Ok(())
    }
}
