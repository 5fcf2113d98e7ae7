//! Virtual-key tables and key-name resolution.
//!
//! The tables are plain `const` data, so they are immutable for the whole
//! process lifetime and can be read from any thread.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A platform virtual-key code. Code 0 is the "unresolved" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VirtualKey(pub u32);

/// Canonical key names and their virtual-key codes
const VIRTUAL_KEYS: &[(&str, u32)] = &[
    // Control keys
    ("Back", 0x08),
    ("Tab", 0x09),
    ("Enter", 0x0D),
    ("Shift", 0x10),
    ("Control", 0x11),
    ("Alt", 0x12),
    ("Pause", 0x13),
    ("CapsLock", 0x14),
    ("Escape", 0x1B),
    ("Space", 0x20),
    // Navigation keys
    ("PageUp", 0x21),
    ("PageDown", 0x22),
    ("End", 0x23),
    ("Home", 0x24),
    ("LeftArrow", 0x25),
    ("UpArrow", 0x26),
    ("RightArrow", 0x27),
    ("DownArrow", 0x28),
    ("PrintScreen", 0x2C),
    ("Insert", 0x2D),
    ("Delete", 0x2E),
    // Number row
    ("D0", 0x30),
    ("D1", 0x31),
    ("D2", 0x32),
    ("D3", 0x33),
    ("D4", 0x34),
    ("D5", 0x35),
    ("D6", 0x36),
    ("D7", 0x37),
    ("D8", 0x38),
    ("D9", 0x39),
    // Letters
    ("A", 0x41),
    ("B", 0x42),
    ("C", 0x43),
    ("D", 0x44),
    ("E", 0x45),
    ("F", 0x46),
    ("G", 0x47),
    ("H", 0x48),
    ("I", 0x49),
    ("J", 0x4A),
    ("K", 0x4B),
    ("L", 0x4C),
    ("M", 0x4D),
    ("N", 0x4E),
    ("O", 0x4F),
    ("P", 0x50),
    ("Q", 0x51),
    ("R", 0x52),
    ("S", 0x53),
    ("T", 0x54),
    ("U", 0x55),
    ("V", 0x56),
    ("W", 0x57),
    ("X", 0x58),
    ("Y", 0x59),
    ("Z", 0x5A),
    ("LeftWindows", 0x5B),
    ("RightWindows", 0x5C),
    ("Apps", 0x5D),
    // Numpad
    ("NumPad0", 0x60),
    ("NumPad1", 0x61),
    ("NumPad2", 0x62),
    ("NumPad3", 0x63),
    ("NumPad4", 0x64),
    ("NumPad5", 0x65),
    ("NumPad6", 0x66),
    ("NumPad7", 0x67),
    ("NumPad8", 0x68),
    ("NumPad9", 0x69),
    ("Multiply", 0x6A),
    ("Add", 0x6B),
    ("Subtract", 0x6D),
    ("Decimal", 0x6E),
    ("Divide", 0x6F),
    // Function keys
    ("F1", 0x70),
    ("F2", 0x71),
    ("F3", 0x72),
    ("F4", 0x73),
    ("F5", 0x74),
    ("F6", 0x75),
    ("F7", 0x76),
    ("F8", 0x77),
    ("F9", 0x78),
    ("F10", 0x79),
    ("F11", 0x7A),
    ("F12", 0x7B),
    ("NumLock", 0x90),
    ("ScrollLock", 0x91),
    // Low-level hooks report the sided modifier codes
    ("LeftShift", 0xA0),
    ("RightShift", 0xA1),
    ("LeftControl", 0xA2),
    ("RightControl", 0xA3),
    ("LeftAlt", 0xA4),
    ("RightAlt", 0xA5),
    // OEM punctuation (US layout)
    ("Semicolon", 0xBA),
    ("Equal", 0xBB),
    ("Comma", 0xBC),
    ("Minus", 0xBD),
    ("Period", 0xBE),
    ("Slash", 0xBF),
    ("Grave", 0xC0),
    ("LeftBracket", 0xDB),
    ("Backslash", 0xDC),
    ("RightBracket", 0xDD),
    ("Quote", 0xDE),
];

/// Map common spellings onto a canonical table name
fn normalize_alias(lowercase: &str) -> Option<&'static str> {
    let canonical = match lowercase {
        "enter" | "return" => "Enter",
        "space" | "spacebar" => "Space",
        "ctrl" | "control" => "Control",
        "alt" => "Alt",
        "shift" => "Shift",
        "esc" | "escape" => "Escape",
        "tab" => "Tab",
        "backspace" | "back" => "Back",
        "delete" | "del" => "Delete",
        "insert" | "ins" => "Insert",
        "home" => "Home",
        "end" => "End",
        "pageup" | "pgup" => "PageUp",
        "pagedown" | "pgdn" => "PageDown",
        "leftarrow" | "left" => "LeftArrow",
        "rightarrow" | "right" => "RightArrow",
        "uparrow" | "up" => "UpArrow",
        "downarrow" | "down" => "DownArrow",
        "win" | "lwin" => "LeftWindows",
        "rwin" => "RightWindows",
        "0" => "D0",
        "1" => "D1",
        "2" => "D2",
        "3" => "D3",
        "4" => "D4",
        "5" => "D5",
        "6" => "D6",
        "7" => "D7",
        "8" => "D8",
        "9" => "D9",
        _ => return None,
    };
    Some(canonical)
}

impl VirtualKey {
    pub const UNRESOLVED: VirtualKey = VirtualKey(0);
    pub const ENTER: VirtualKey = VirtualKey(0x0D);
    pub const ESCAPE: VirtualKey = VirtualKey(0x1B);

    /// Resolve a key name as written in a macro file.
    ///
    /// Aliases are tried first, then the canonical table (case-insensitive),
    /// then single ASCII letters/digits, then `0x`-prefixed hex codes.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.is_empty() {
            return None;
        }

        let lowercase = name.to_ascii_lowercase();
        let lookup = normalize_alias(&lowercase).unwrap_or(name);

        if let Some((_, code)) = VIRTUAL_KEYS
            .iter()
            .find(|(canonical, _)| canonical.eq_ignore_ascii_case(lookup))
        {
            return Some(Self(*code));
        }

        let mut chars = lookup.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            let c = c.to_ascii_uppercase();
            if c.is_ascii_uppercase() || c.is_ascii_digit() {
                return Some(Self(c as u32));
            }
        }

        lowercase
            .strip_prefix("0x")
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .filter(|code| *code != 0)
            .map(Self)
    }

    /// Resolve a key name, returning the sentinel when it is unknown
    pub fn resolve(name: &str) -> Self {
        Self::from_name(name).unwrap_or(Self::UNRESOLVED)
    }

    /// The canonical name of this key, if it is in the table
    pub fn name(self) -> Option<&'static str> {
        VIRTUAL_KEYS
            .iter()
            .find(|(_, code)| *code == self.0)
            .map(|(name, _)| *name)
    }

    /// Whether a key reported by the hook counts as this key. The generic
    /// Shift/Control/Alt codes also match their left and right variants, since
    /// low-level hooks only ever report the sided codes.
    pub fn matches(self, reported: VirtualKey) -> bool {
        if self == reported {
            return true;
        }
        match self.0 {
            0x10 => matches!(reported.0, 0xA0 | 0xA1),
            0x11 => matches!(reported.0, 0xA2 | 0xA3),
            0x12 => matches!(reported.0, 0xA4 | 0xA5),
            _ => false,
        }
    }

    pub fn code(self) -> u32 {
        self.0
    }

    pub fn is_resolved(self) -> bool {
        self.0 != 0
    }
}

/// Renders the canonical name, or a hex literal that `from_name` accepts back
impl fmt::Display for VirtualKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{:#04X}", self.0),
        }
    }
}
