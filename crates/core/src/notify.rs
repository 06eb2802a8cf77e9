//! Observer hook for user-facing events.
//!
//! The core only emits [`Event`]s; how they reach the user (log line, toast,
//! tray balloon) is up to the [`Notifier`] implementation.

use std::sync::Arc;
use tracing::{error, info};
#[cfg(target_os = "windows")]
use tracing::warn;

/// Something a user may want to hear about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Monitoring started.
    Started { games: usize },
    /// Device handle acquired.
    Connected { vid: u16, pid: u16, path: String },
    /// A watched process appeared; the game rate is about to be applied.
    GameDetected { game: String, rate: u32 },
    /// No watched process remains; the default rate is about to be applied.
    GameClosed { rate: u32 },
    /// A rate command was accepted by the device.
    RateChanged { rate: u32 },
    Error { title: String, message: String },
}

/// Receives events from the watcher and the CLI.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &Event);
}

/// A notifier shared between threads.
pub type SharedNotifier = Arc<dyn Notifier>;

/// Writes events to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &Event) {
        match event {
            Event::Started { games } => info!(games, "Monitoring games"),
            Event::Connected { vid, pid, path } => info!(
                vid = format_args!("0x{vid:04X}"),
                pid = format_args!("0x{pid:04X}"),
                path = %path,
                "Mouse connected"
            ),
            Event::GameDetected { game, rate } => {
                info!(game = %game, rate, "Game detected, switching to {rate}Hz")
            }
            Event::GameClosed { rate } => info!(rate, "No game detected, switching to {rate}Hz"),
            Event::RateChanged { rate } => info!(rate, "Polling rate is now {rate}Hz"),
            Event::Error { title, message } => error!(title = %title, "{message}"),
        }
    }
}

/// Title and body of a desktop notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub title: String,
    pub body: String,
    pub is_error: bool,
}

/// The desktop notification shown for `event`. Connection and rate
/// confirmations stay in the log only.
pub fn toast_text(event: &Event) -> Option<Toast> {
    let (title, body, is_error) = match event {
        Event::Started { games } => (
            "LAMZU Automator".to_string(),
            format!("Watching {games} games"),
            false,
        ),
        Event::GameDetected { game, rate } => (
            "Game detected".to_string(),
            format!("{game} is running, polling rate set to {rate}Hz"),
            false,
        ),
        Event::GameClosed { rate } => (
            "Game closed".to_string(),
            format!("Polling rate restored to {rate}Hz"),
            false,
        ),
        Event::Error { title, message } => (title.clone(), message.clone(), true),
        Event::Connected { .. } | Event::RateChanged { .. } => return None,
    };
    Some(Toast {
        title,
        body,
        is_error,
    })
}

/// Notifier for the current platform: tray balloons on Windows, the log
/// everywhere else or when the tray icon cannot be created.
pub fn platform_notifier() -> SharedNotifier {
    #[cfg(target_os = "windows")]
    {
        match desktop::DesktopNotifier::new() {
            Ok(n) => return Arc::new(n),
            Err(e) => warn!(error = %e, "Desktop notifications unavailable, logging only"),
        }
    }
    Arc::new(LogNotifier)
}

/// Copy `text` into a fixed UTF-16 buffer, truncated so a NUL always fits.
#[cfg(any(target_os = "windows", test))]
fn copy_wide(dst: &mut [u16], text: &str) {
    let Some(max) = dst.len().checked_sub(1) else {
        return;
    };
    let mut n = 0;
    for unit in text.encode_utf16().take(max) {
        dst[n] = unit;
        n += 1;
    }
    // don't leave half a surrogate pair at the cut
    if n == max && n > 0 && (0xD800..0xDC00).contains(&dst[n - 1]) {
        n -= 1;
    }
    dst[n] = 0;
}

#[cfg(target_os = "windows")]
mod desktop {
    use super::{copy_wide, toast_text, Event, LogNotifier, Notifier};
    use crate::error::{Error, Result};
    use parking_lot::Mutex;
    use std::mem;
    use std::ptr;
    use winapi::shared::windef::HWND;
    use winapi::um::libloaderapi::GetModuleHandleW;
    use winapi::um::shellapi::{
        Shell_NotifyIconW, NIF_ICON, NIF_INFO, NIF_TIP, NIIF_ERROR, NIIF_INFO, NIM_ADD,
        NIM_DELETE, NIM_MODIFY, NOTIFYICONDATAW,
    };
    use winapi::um::winuser::{
        CreateWindowExW, DestroyWindow, LoadIconW, HWND_MESSAGE, IDI_APPLICATION,
    };

    const ICON_ID: u32 = 1;

    /// Tray icon owned by a message-only window.
    struct TrayIcon {
        hwnd: HWND,
    }

    // SAFETY: the window is only touched through Shell_NotifyIconW and
    // DestroyWindow, both callable from any thread, and always under the mutex.
    unsafe impl Send for TrayIcon {}

    impl TrayIcon {
        fn data(&self) -> NOTIFYICONDATAW {
            // SAFETY: plain-old-data struct; cbSize is set before use.
            let mut data: NOTIFYICONDATAW = unsafe { mem::zeroed() };
            data.cbSize = mem::size_of::<NOTIFYICONDATAW>() as u32;
            data.hWnd = self.hwnd;
            data.uID = ICON_ID;
            data
        }
    }

    impl Drop for TrayIcon {
        fn drop(&mut self) {
            let mut data = self.data();
            // SAFETY: hwnd was created by us and is destroyed exactly once.
            unsafe {
                Shell_NotifyIconW(NIM_DELETE, &mut data);
                DestroyWindow(self.hwnd);
            }
        }
    }

    /// Shows tray balloons (toasts on Windows 10+) and logs every event.
    pub struct DesktopNotifier {
        icon: Mutex<TrayIcon>,
        log: LogNotifier,
    }

    impl DesktopNotifier {
        pub fn new() -> Result<Self> {
            let class: Vec<u16> = "STATIC\0".encode_utf16().collect();
            let title: Vec<u16> = "LAMZU Automator\0".encode_utf16().collect();

            // SAFETY: null-terminated strings outlive the call; HWND_MESSAGE
            // creates a window that is never shown.
            let hwnd = unsafe {
                CreateWindowExW(
                    0,
                    class.as_ptr(),
                    title.as_ptr(),
                    0,
                    0,
                    0,
                    0,
                    0,
                    HWND_MESSAGE,
                    ptr::null_mut(),
                    GetModuleHandleW(ptr::null()),
                    ptr::null_mut(),
                )
            };
            if hwnd.is_null() {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }
            let icon = TrayIcon { hwnd };

            let mut data = icon.data();
            data.uFlags = NIF_ICON | NIF_TIP;
            // SAFETY: IDI_APPLICATION is a stock icon resource.
            data.hIcon = unsafe { LoadIconW(ptr::null_mut(), IDI_APPLICATION) };
            copy_wide(&mut data.szTip, "LAMZU Automator");

            // SAFETY: data is fully initialised and sized.
            if unsafe { Shell_NotifyIconW(NIM_ADD, &mut data) } == 0 {
                return Err(Error::Io(std::io::Error::last_os_error()));
            }

            Ok(Self {
                icon: Mutex::new(icon),
                log: LogNotifier,
            })
        }
    }

    impl Notifier for DesktopNotifier {
        fn notify(&self, event: &Event) {
            self.log.notify(event);
            let Some(toast) = toast_text(event) else {
                return;
            };

            let icon = self.icon.lock();
            let mut data = icon.data();
            data.uFlags = NIF_INFO;
            data.dwInfoFlags = if toast.is_error { NIIF_ERROR } else { NIIF_INFO };
            copy_wide(&mut data.szInfoTitle, &toast.title);
            copy_wide(&mut data.szInfo, &toast.body);

            // SAFETY: data refers to the icon added in new().
            if unsafe { Shell_NotifyIconW(NIM_MODIFY, &mut data) } == 0 {
                tracing::debug!(title = %toast.title, "Balloon notification was not shown");
            }
        }
    }
}

#[cfg(target_os = "windows")]
pub use desktop::DesktopNotifier;
