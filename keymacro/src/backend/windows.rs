use super::{
    HookCallback, HookHandle, InputBackend, PointerButton, RawEventKind, RawInputEvent,
    SyntheticEvent, WindowHandle,
};
use crate::{keys::VirtualKey, MacroError, MouseButton, Point, Result};
use std::{
    collections::HashMap,
    ffi::c_void,
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};
use tracing::{debug, info, warn};
use windows::core::{BOOL, HSTRING, PCWSTR};
use windows::Win32::Foundation::{GetLastError, HWND, LPARAM, LRESULT, POINT, WPARAM};
use windows::Win32::Graphics::Gdi::ScreenToClient;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, EnumWindows, FindWindowW, GetWindowTextLengthW,
    GetWindowTextW, IsWindowVisible, PeekMessageW, PostMessageW, SetForegroundWindow,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, HHOOK, KBDLLHOOKSTRUCT, MSG,
    MSLLHOOKSTRUCT, PM_REMOVE, WH_KEYBOARD_LL, WH_MOUSE_LL, WM_KEYDOWN, WM_KEYUP,
    WM_LBUTTONDOWN, WM_LBUTTONUP, WM_MBUTTONDOWN, WM_MBUTTONUP, WM_MOUSEMOVE, WM_MOUSEWHEEL,
    WM_RBUTTONDOWN, WM_RBUTTONUP, WM_SYSKEYDOWN, WM_SYSKEYUP, WM_XBUTTONDOWN, WM_XBUTTONUP,
};

const MK_LBUTTON: usize = 0x0001;
const MK_RBUTTON: usize = 0x0002;
const XBUTTON1: u32 = 0x0001;

/// Callbacks of every installed hook. Low-level hook procedures receive no
/// user data, so they look their callbacks up here.
static HOOK_CALLBACKS: Mutex<Vec<(u64, HookCallback)>> = Mutex::new(Vec::new());

/// The Win32 input backend
pub struct WindowsBackend {
    next_id: AtomicU64,
    /// Keyboard and mouse hook handles per installed hook
    hooks: Mutex<HashMap<u64, (isize, isize)>>,
}

impl WindowsBackend {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            hooks: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for WindowsBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn last_error(operation: &str) -> MacroError {
    let code = unsafe { GetLastError() }.0 as i32;
    MacroError::platform(operation, code)
}

fn hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

fn dispatch(event: RawInputEvent) {
    let callbacks: Vec<HookCallback> = HOOK_CALLBACKS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .iter()
        .map(|(_, callback)| callback.clone())
        .collect();
    for callback in callbacks {
        callback(&event);
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = unsafe { &*(lparam.0 as *const KBDLLHOOKSTRUCT) };
        let key = VirtualKey(info.vkCode);
        let kind = match wparam.0 as u32 {
            WM_KEYDOWN => Some(RawEventKind::KeyDown { key, system: false }),
            WM_SYSKEYDOWN => Some(RawEventKind::KeyDown { key, system: true }),
            WM_KEYUP => Some(RawEventKind::KeyUp { key, system: false }),
            WM_SYSKEYUP => Some(RawEventKind::KeyUp { key, system: true }),
            _ => None,
        };
        if let Some(kind) = kind {
            dispatch(RawInputEvent::new(now_millis(), kind));
        }
    }
    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

unsafe extern "system" fn mouse_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let info = unsafe { &*(lparam.0 as *const MSLLHOOKSTRUCT) };
        let point = Point::new(info.pt.x, info.pt.y);
        let xbutton = if (info.mouseData >> 16) & 0xFFFF == XBUTTON1 {
            PointerButton::X1
        } else {
            PointerButton::X2
        };
        let kind = match wparam.0 as u32 {
            WM_LBUTTONDOWN => Some(RawEventKind::ButtonDown { button: PointerButton::Left, point }),
            WM_LBUTTONUP => Some(RawEventKind::ButtonUp { button: PointerButton::Left, point }),
            WM_RBUTTONDOWN => Some(RawEventKind::ButtonDown { button: PointerButton::Right, point }),
            WM_RBUTTONUP => Some(RawEventKind::ButtonUp { button: PointerButton::Right, point }),
            WM_MBUTTONDOWN => Some(RawEventKind::ButtonDown { button: PointerButton::Middle, point }),
            WM_MBUTTONUP => Some(RawEventKind::ButtonUp { button: PointerButton::Middle, point }),
            WM_XBUTTONDOWN => Some(RawEventKind::ButtonDown { button: xbutton, point }),
            WM_XBUTTONUP => Some(RawEventKind::ButtonUp { button: xbutton, point }),
            WM_MOUSEMOVE => Some(RawEventKind::MouseMove { point }),
            WM_MOUSEWHEEL => Some(RawEventKind::Wheel {
                point,
                delta: ((info.mouseData >> 16) as u16) as i16 as i32,
            }),
            _ => None,
        };
        if let Some(kind) = kind {
            dispatch(RawInputEvent::new(now_millis(), kind));
        }
    }
    unsafe { CallNextHookEx(None, code, wparam, lparam) }
}

unsafe extern "system" fn collect_title(window: HWND, lparam: LPARAM) -> BOOL {
    let titles = unsafe { &mut *(lparam.0 as *mut Vec<String>) };
    if unsafe { IsWindowVisible(window) }.as_bool() {
        let len = unsafe { GetWindowTextLengthW(window) };
        if len > 0 {
            let mut buffer = vec![0u16; len as usize + 1];
            let copied = unsafe { GetWindowTextW(window, &mut buffer) };
            if copied > 0 {
                titles.push(String::from_utf16_lossy(&buffer[..copied as usize]));
            }
        }
    }
    BOOL(1)
}

fn unhook(raw: isize) -> Result<()> {
    unsafe { UnhookWindowsHookEx(HHOOK(raw as *mut c_void)) }
        .map_err(|_| last_error("UnhookWindowsHookEx"))
}

/// Pack client coordinates the way WM_*BUTTON* messages expect them
fn point_lparam(point: Point) -> LPARAM {
    let packed = ((point.y as u16 as u32) << 16) | (point.x as u16 as u32);
    LPARAM(packed as isize)
}

impl InputBackend for WindowsBackend {
    fn find_window(&self, title: &str) -> Result<WindowHandle> {
        let window = unsafe { FindWindowW(PCWSTR::null(), &HSTRING::from(title)) }
            .map_err(|_| last_error(&format!("FindWindow(\"{}\")", title)))?;
        if window.is_invalid() {
            return Err(last_error(&format!("FindWindow(\"{}\")", title)));
        }
        Ok(WindowHandle(window.0 as isize))
    }

    fn bring_to_foreground(&self, window: WindowHandle) -> Result<()> {
        if unsafe { SetForegroundWindow(hwnd(window)) }.as_bool() {
            Ok(())
        } else {
            Err(last_error("SetForegroundWindow"))
        }
    }

    fn screen_to_client(&self, window: WindowHandle, point: Point) -> Result<Point> {
        let mut p = POINT { x: point.x, y: point.y };
        if unsafe { ScreenToClient(hwnd(window), &mut p) }.as_bool() {
            Ok(Point::new(p.x, p.y))
        } else {
            Err(last_error("ScreenToClient"))
        }
    }

    fn post_event(&self, window: WindowHandle, event: SyntheticEvent) -> Result<()> {
        let (message, wparam, lparam) = match event {
            SyntheticEvent::KeyDown(key) => (WM_KEYDOWN, WPARAM(key.code() as usize), LPARAM(0)),
            SyntheticEvent::KeyUp(key) => (WM_KEYUP, WPARAM(key.code() as usize), LPARAM(0)),
            SyntheticEvent::ButtonDown { button, point } => match button {
                MouseButton::Left => (WM_LBUTTONDOWN, WPARAM(MK_LBUTTON), point_lparam(point)),
                MouseButton::Right => (WM_RBUTTONDOWN, WPARAM(MK_RBUTTON), point_lparam(point)),
            },
            SyntheticEvent::ButtonUp { button, point } => match button {
                MouseButton::Left => (WM_LBUTTONUP, WPARAM(MK_LBUTTON), point_lparam(point)),
                MouseButton::Right => (WM_RBUTTONUP, WPARAM(MK_RBUTTON), point_lparam(point)),
            },
        };
        unsafe { PostMessageW(Some(hwnd(window)), message, wparam, lparam) }
            .map_err(|_| last_error("PostMessage"))
    }

    fn list_windows(&self) -> Result<Vec<String>> {
        let mut titles: Vec<String> = Vec::new();
        unsafe {
            EnumWindows(
                Some(collect_title),
                LPARAM(&mut titles as *mut Vec<String> as isize),
            )
        }
        .map_err(|_| last_error("EnumWindows"))?;
        debug!("Enumerated {} visible windows", titles.len());
        Ok(titles)
    }

    fn install_hook(&self, callback: HookCallback) -> Result<HookHandle> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }
            .map_err(|_| last_error("GetModuleHandle"))?;

        HOOK_CALLBACKS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((id, callback));
        let forget_callback = || {
            HOOK_CALLBACKS
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .retain(|(hook_id, _)| *hook_id != id);
        };

        let keyboard = match unsafe {
            SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), Some(module.into()), 0)
        } {
            Ok(hook) => hook,
            Err(_) => {
                let error = last_error("SetWindowsHookEx(WH_KEYBOARD_LL)");
                forget_callback();
                return Err(error);
            }
        };
        let mouse = match unsafe {
            SetWindowsHookExW(WH_MOUSE_LL, Some(mouse_proc), Some(module.into()), 0)
        } {
            Ok(hook) => hook,
            Err(_) => {
                let error = last_error("SetWindowsHookEx(WH_MOUSE_LL)");
                let _ = unhook(keyboard.0 as isize);
                forget_callback();
                return Err(error);
            }
        };

        self.hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(id, (keyboard.0 as isize, mouse.0 as isize));
        info!("Installed low-level keyboard and mouse hooks ({})", id);
        Ok(HookHandle(id))
    }

    fn pump_events(&self, _timeout: Duration) -> bool {
        let mut msg = MSG::default();
        let dispatched = unsafe { PeekMessageW(&mut msg, None, 0, 0, PM_REMOVE) }.as_bool();
        if dispatched {
            unsafe {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        dispatched
    }

    fn uninstall(&self, handle: HookHandle) -> Result<()> {
        let hooks = self
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&handle.0);
        HOOK_CALLBACKS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|(id, _)| *id != handle.0);

        let (keyboard, mouse) = hooks.ok_or_else(|| {
            MacroError::ConfigurationError(format!("hook {} is not installed", handle.0))
        })?;
        let keyboard_result = unhook(keyboard);
        let mouse_result = unhook(mouse);
        info!("Uninstalled low-level hooks ({})", handle.0);
        keyboard_result.and(mouse_result)
    }
}

impl Drop for WindowsBackend {
    fn drop(&mut self) {
        let remaining: Vec<u64> = self
            .hooks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect();
        for id in remaining {
            if let Err(e) = self.uninstall(HookHandle(id)) {
                warn!("Failed to release hook {} on shutdown: {}", id, e);
            }
        }
    }
}
