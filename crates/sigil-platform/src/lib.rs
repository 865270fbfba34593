//! sigil-platform: OS boundary for sigil.
//!
//! - `listener` - one shared global input listener (rdev) implementing [`sigil_core::InputHook`]
//! - `injector` - input injection via enigo, implementing [`sigil_core::ActionExecutor`]
//! - `display` - monitor enumeration (display-info), cursor queries and the
//!   shared physical pixel space

mod display;
mod error;
mod injector;
mod listener;

pub use display::{ensure_physical_pixels, list_monitors, SystemDesktop};
pub use error::{PlatformError, PlatformResult};
pub use injector::{parse_key, EnigoInjector, NoopInjector};
pub use listener::{key_name, last_cursor_position, RdevHook};
