//! Core primitives for pusher-client.
//!
//! This crate holds the pieces shared by every object of the client:
//!
//! - [`EventEmitter`] - name-keyed listener sets with isolated broadcast
//! - [`logging`] - the process-wide log hook and tracing target names
//!
//! # Example
//!
//! ```
//! use pusher_client_core::{listener, EventEmitter};
//!
//! let emitter = EventEmitter::<String>::new();
//! let on_greet = listener(|name: Option<&String>| {
//!     println!("hello {}", name.map(String::as_str).unwrap_or("stranger"));
//! });
//!
//! emitter.bind("greet", &on_greet);
//! emitter.broadcast("greet", Some(&"world".to_string()));
//! emitter.unbind("greet", &on_greet);
//! ```

mod emitter;
pub mod logging;

pub use emitter::{EventEmitter, Listener, listener};
pub use logging::{LogFn, log, reset_log_hook, set_log_hook};
