//! Monitor enumeration and cursor queries.

use crate::error::{PlatformError, PlatformResult};
use crate::injector::EnigoInjector;
use crate::listener::last_cursor_position;
use display_info::DisplayInfo;
use sigil_core::{Desktop, Monitor};
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Make hook positions, monitor rectangles and injected moves share one
/// pixel space. Returns whether that space is physical pixels.
///
/// Windows scales coordinates for DPI-unaware processes, so the process opts
/// into Per-Monitor V2 awareness the first time any OS surface is touched.
/// Other platforms report consistent coordinates already.
pub fn ensure_physical_pixels() -> bool {
    static PHYSICAL: OnceLock<bool> = OnceLock::new();
    *PHYSICAL.get_or_init(|| {
        let physical = request_physical_pixels();
        if physical {
            debug!("Using physical pixel coordinates");
        } else {
            warn!("Process is not DPI aware, monitor and cursor coordinates may disagree");
        }
        physical
    })
}

#[cfg(target_os = "windows")]
fn request_physical_pixels() -> bool {
    const PER_MONITOR_AWARE_V2: isize = -4;

    #[link(name = "user32")]
    extern "system" {
        fn SetProcessDpiAwarenessContext(value: isize) -> i32;
        fn IsProcessDPIAware() -> i32;
    }

    // Fails when awareness was already fixed, e.g. by the manifest.
    unsafe { SetProcessDpiAwarenessContext(PER_MONITOR_AWARE_V2) != 0 || IsProcessDPIAware() != 0 }
}

#[cfg(not(target_os = "windows"))]
fn request_physical_pixels() -> bool {
    true
}

/// Enumerate attached displays in virtual-desktop coordinates.
pub fn list_monitors() -> PlatformResult<Vec<Monitor>> {
    ensure_physical_pixels();
    let displays = DisplayInfo::all().map_err(|e| PlatformError::Display(e.to_string()))?;
    let monitors: Vec<Monitor> = displays
        .into_iter()
        .map(|d| Monitor {
            x: d.x,
            y: d.y,
            width: d.width as i32,
            height: d.height as i32,
            is_primary: d.is_primary,
        })
        .collect();
    debug!(count = monitors.len(), "Enumerated monitors");
    Ok(monitors)
}

/// [`Desktop`] over the live display topology.
///
/// The cursor comes from enigo when available, otherwise from the last
/// position the global listener saw.
pub struct SystemDesktop {
    injector: Option<EnigoInjector>,
}

impl SystemDesktop {
    pub fn new() -> Self {
        ensure_physical_pixels();
        let injector = match EnigoInjector::new() {
            Ok(injector) => Some(injector),
            Err(e) => {
                warn!(error = %e, "Cursor queries will rely on the input listener");
                None
            }
        };
        Self { injector }
    }
}

impl Default for SystemDesktop {
    fn default() -> Self {
        Self::new()
    }
}

impl Desktop for SystemDesktop {
    fn monitors(&self) -> Vec<Monitor> {
        list_monitors().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to enumerate monitors");
            Vec::new()
        })
    }

    fn cursor_position(&self) -> Option<(i32, i32)> {
        let from_os = self.injector.as_ref().and_then(|i| match i.cursor_location() {
            Ok(pos) => Some(pos),
            Err(e) => {
                debug!(error = %e, "Cursor query failed");
                None
            }
        });
        from_os.or_else(last_cursor_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_space_is_decided_once() {
        let first = ensure_physical_pixels();
        assert_eq!(ensure_physical_pixels(), first);
        #[cfg(not(target_os = "windows"))]
        assert!(first);
    }
}
