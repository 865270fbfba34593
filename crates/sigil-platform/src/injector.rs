//! Input injection implementations.

use crate::{PlatformError, PlatformResult};
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use sigil_core::{ActionExecutor, Actuation, KeyPhase, MouseButton};
use std::sync::Mutex;
use tracing::debug;

/// Logs actuations instead of performing them (`--dry-run`).
pub struct NoopInjector;

impl ActionExecutor for NoopInjector {
    fn execute(&self, action: &Actuation) -> Result<(), String> {
        debug!(?action, "NoopInjector: would inject action");
        Ok(())
    }
}

/// Real input injector using the `enigo` crate.
pub struct EnigoInjector {
    enigo: Mutex<Enigo>,
}

impl EnigoInjector {
    pub fn new() -> PlatformResult<Self> {
        crate::display::ensure_physical_pixels();
        let enigo = Enigo::new(&Settings::default()).map_err(|e| {
            PlatformError::InjectionFailed(format!("failed to create Enigo: {e}"))
        })?;
        Ok(Self {
            enigo: Mutex::new(enigo),
        })
    }

    pub fn inject(&self, action: &Actuation) -> PlatformResult<()> {
        let mut enigo = self.enigo.lock().unwrap_or_else(|p| p.into_inner());
        let failed = |e: enigo::InputError| PlatformError::InjectionFailed(e.to_string());

        match action {
            Actuation::MoveTo { x, y } => {
                enigo.move_mouse(*x, *y, Coordinate::Abs).map_err(failed)?;
            }

            Actuation::Button { button, phase } => {
                debug!(?button, ?phase, "injecting mouse button");
                enigo
                    .button(to_enigo_button(*button), to_direction(*phase))
                    .map_err(failed)?;
            }

            Actuation::DoubleClick { button } => {
                debug!(?button, "injecting double click");
                let btn = to_enigo_button(*button);
                enigo.button(btn, Direction::Click).map_err(failed)?;
                enigo.button(btn, Direction::Click).map_err(failed)?;
            }

            Actuation::Wheel { delta } => {
                debug!(delta, "injecting wheel");
                // Hook deltas are positive away from the user; enigo scrolls down for positive lengths.
                enigo.scroll(-*delta, Axis::Vertical).map_err(failed)?;
            }

            Actuation::Key { key, phase } => {
                debug!(key, ?phase, "injecting key");
                let k = parse_key(key)?;
                enigo.key(k, to_direction(*phase)).map_err(failed)?;
            }
        }

        Ok(())
    }

    /// Current cursor position as reported by the OS.
    pub fn cursor_location(&self) -> PlatformResult<(i32, i32)> {
        let enigo = self.enigo.lock().unwrap_or_else(|p| p.into_inner());
        enigo
            .location()
            .map_err(|e| PlatformError::Display(e.to_string()))
    }
}

impl ActionExecutor for EnigoInjector {
    fn execute(&self, action: &Actuation) -> Result<(), String> {
        self.inject(action).map_err(|e| e.to_string())
    }
}

fn to_enigo_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_direction(phase: KeyPhase) -> Direction {
    match phase {
        KeyPhase::Down => Direction::Press,
        KeyPhase::Up => Direction::Release,
    }
}

/// Parse a recorded key name back into an enigo key.
///
/// Accepts the listener's names (`ControlLeft`, `UpArrow`, `a`, `7`, ...)
/// and common aliases, case-insensitively.
pub fn parse_key(key: &str) -> PlatformResult<Key> {
    let mut chars = key.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return Ok(Key::Unicode(c));
    }

    let lower = key.to_lowercase();
    let parsed = match lower.as_str() {
        "f1" => Key::F1,
        "f2" => Key::F2,
        "f3" => Key::F3,
        "f4" => Key::F4,
        "f5" => Key::F5,
        "f6" => Key::F6,
        "f7" => Key::F7,
        "f8" => Key::F8,
        "f9" => Key::F9,
        "f10" => Key::F10,
        "f11" => Key::F11,
        "f12" => Key::F12,

        "shift" | "shiftleft" => Key::Shift,
        "shiftright" => Key::RShift,
        "control" | "ctrl" | "controlleft" => Key::Control,
        "controlright" => Key::RControl,
        // enigo does not tell left and right Alt apart.
        "alt" | "altgr" => Key::Alt,
        "meta" | "metaleft" | "metaright" | "super" | "cmd" => Key::Meta,

        "up" | "uparrow" => Key::UpArrow,
        "down" | "downarrow" => Key::DownArrow,
        "left" | "leftarrow" => Key::LeftArrow,
        "right" | "rightarrow" => Key::RightArrow,
        "home" => Key::Home,
        "end" => Key::End,
        "pageup" => Key::PageUp,
        "pagedown" => Key::PageDown,

        "backspace" => Key::Backspace,
        "delete" | "kpdelete" => Key::Delete,
        "insert" => Key::Insert,
        "enter" | "return" | "kpreturn" => Key::Return,
        "tab" => Key::Tab,
        "escape" | "esc" => Key::Escape,
        "space" => Key::Space,
        "capslock" => Key::CapsLock,
        "printscreen" => Key::PrintScr,
        "pause" => Key::Pause,
        "numlock" => Key::Numlock,
        "scrolllock" => return native_key(key, SCROLL_LOCK),
        "function" | "fn" => return native_key(key, FUNCTION),

        "backquote" => Key::Unicode('`'),
        "minus" | "kpminus" => Key::Unicode('-'),
        "equal" => Key::Unicode('='),
        "kpplus" => Key::Unicode('+'),
        "kpmultiply" => Key::Unicode('*'),
        "kpdivide" | "slash" => Key::Unicode('/'),
        "leftbracket" => Key::Unicode('['),
        "rightbracket" => Key::Unicode(']'),
        "semicolon" => Key::Unicode(';'),
        "quote" => Key::Unicode('\''),
        "backslash" | "intlbackslash" => Key::Unicode('\\'),
        "comma" => Key::Unicode(','),
        "dot" => Key::Unicode('.'),

        other => {
            if let Some(d) = other.strip_prefix("kp").and_then(|d| d.parse::<u8>().ok()) {
                if d < 10 {
                    return Ok(Key::Unicode(char::from(b'0' + d)));
                }
            }
            let raw = other
                .strip_prefix("unknown(")
                .and_then(|rest| rest.strip_suffix(')'))
                .and_then(|code| code.parse::<u32>().ok());
            return native_key(key, raw.filter(|_| RAW_CODES_MATCH));
        }
    };

    Ok(parsed)
}

// Native codes for keys enigo has no variant for. On Windows and macOS rdev
// reports unknown keys with the same code enigo injects; on X11 rdev gives a
// keycode while enigo expects a keysym.
#[cfg(target_os = "windows")]
const SCROLL_LOCK: Option<u32> = Some(0x91);
#[cfg(target_os = "macos")]
const SCROLL_LOCK: Option<u32> = None;
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const SCROLL_LOCK: Option<u32> = Some(0xff14);

#[cfg(target_os = "macos")]
const FUNCTION: Option<u32> = Some(0x3f);
#[cfg(not(target_os = "macos"))]
const FUNCTION: Option<u32> = None;

const RAW_CODES_MATCH: bool = cfg!(any(target_os = "windows", target_os = "macos"));

fn native_key(name: &str, code: Option<u32>) -> PlatformResult<Key> {
    code.map(Key::Other)
        .ok_or_else(|| PlatformError::InvalidKey(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_single_char() {
        assert!(matches!(parse_key("a").unwrap(), Key::Unicode('a')));
        assert!(matches!(parse_key("7").unwrap(), Key::Unicode('7')));
    }

    #[test]
    fn test_parse_key_listener_names() {
        assert!(matches!(parse_key("ControlLeft").unwrap(), Key::Control));
        assert!(matches!(parse_key("ShiftRight").unwrap(), Key::RShift));
        assert!(matches!(parse_key("AltGr").unwrap(), Key::Alt));
        assert!(matches!(parse_key("UpArrow").unwrap(), Key::UpArrow));
        assert!(matches!(parse_key("Return").unwrap(), Key::Return));
        assert!(matches!(parse_key("F10").unwrap(), Key::F10));
        assert!(matches!(parse_key("SemiColon").unwrap(), Key::Unicode(';')));
        assert!(matches!(parse_key("Kp4").unwrap(), Key::Unicode('4')));
    }

    #[test]
    fn test_parse_key_unknown() {
        assert!(matches!(parse_key("Hyper"), Err(PlatformError::InvalidKey(_))));
        assert!(parse_key("").is_err());
        if RAW_CODES_MATCH {
            assert!(matches!(parse_key("Unknown(42)").unwrap(), Key::Other(42)));
        } else {
            assert!(matches!(parse_key("Unknown(42)"), Err(PlatformError::InvalidKey(_))));
        }
    }

    #[test]
    fn test_listener_names_parse_back() {
        use crate::listener::key_name;
        use rdev::Key as K;

        let mut keys = vec![
            K::Alt, K::AltGr, K::Backspace, K::CapsLock, K::ControlLeft, K::ControlRight,
            K::Delete, K::DownArrow, K::End, K::Escape, K::F1, K::F5, K::F9, K::F10, K::F12,
            K::Home, K::LeftArrow, K::MetaLeft, K::MetaRight, K::PageDown, K::PageUp,
            K::Return, K::RightArrow, K::ShiftLeft, K::ShiftRight, K::Space, K::Tab,
            K::UpArrow, K::PrintScreen, K::Pause, K::NumLock, K::BackQuote, K::Num1,
            K::Num0, K::Minus, K::Equal, K::KeyQ, K::KeyZ, K::LeftBracket, K::RightBracket,
            K::SemiColon, K::Quote, K::BackSlash, K::IntlBackslash, K::Comma, K::Dot,
            K::Slash, K::Insert, K::KpReturn, K::KpMinus, K::KpPlus, K::KpMultiply,
            K::KpDivide, K::Kp0, K::Kp9, K::KpDelete,
        ];
        if SCROLL_LOCK.is_some() {
            keys.push(K::ScrollLock);
        }
        if FUNCTION.is_some() {
            keys.push(K::Function);
        }

        for key in keys {
            let name = key_name(key);
            assert!(parse_key(&name).is_ok(), "{name} does not parse back");
        }
    }
}
