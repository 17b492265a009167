//! Logging facilities for pusher-client.
//!
//! Two layers are provided:
//!
//! - Structured diagnostics through the `tracing` crate, under the target
//!   names in [`targets`]. Install a subscriber in your application to see
//!   them.
//! - A process-wide *log hook*: a plain `Fn(&str)` that receives a
//!   human-readable line for every connection attempt and every raw inbound
//!   frame. The default hook writes to stderr. Replace it with
//!   [`set_log_hook`] and restore the default with [`reset_log_hook`].
//!
//! ```
//! use std::sync::Arc;
//! use pusher_client_core::logging;
//!
//! logging::set_log_hook(Arc::new(|line: &str| {
//!     let _ = line; // forward to your own sink
//! }));
//! logging::log("connecting to wss://ws-mt1.pusher.com:443/app/key");
//! logging::reset_log_hook();
//! ```

use std::sync::Arc;

use parking_lot::RwLock;

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Event emitter target.
    pub const EMITTER: &str = "pusher_client_core::emitter";
    /// Log hook target.
    pub const HOOK: &str = "pusher_client_core::logging";
    /// Connection state machine target.
    pub const CONNECTION: &str = "pusher_client::connection";
    /// Channel handshake and dispatch target.
    pub const CHANNEL: &str = "pusher_client::channel";
    /// Socket transport target.
    pub const TRANSPORT: &str = "pusher_client::transport";
    /// Channel authentication target.
    pub const AUTH: &str = "pusher_client::auth";
}

/// A log hook receiving one line per call.
pub type LogFn = Arc<dyn Fn(&str) + Send + Sync>;

static LOG_HOOK: RwLock<Option<LogFn>> = parking_lot::const_rwlock(None);

/// Replace the process-wide log hook.
pub fn set_log_hook(hook: LogFn) {
    *LOG_HOOK.write() = Some(hook);
}

/// Restore the default hook, which writes to stderr.
pub fn reset_log_hook() {
    *LOG_HOOK.write() = None;
}

/// Send `line` to the process-wide log hook.
pub fn log(line: &str) {
    // Clone out so a hook that replaces itself does not deadlock.
    let hook = LOG_HOOK.read().clone();
    match hook {
        Some(hook) => hook(line),
        None => default_hook(line),
    }
}

fn default_hook(line: &str) {
    tracing::trace!(target: targets::HOOK, "{}", line);
    eprintln!("{line}");
}
