//! Liveview: server-driven, stateful UI over a persistent connection.
//!
//! The server holds authoritative per-client state, renders it to markup and
//! pushes re-renders over a WebSocket; the browser forwards interactions back
//! as named operation invocations instead of running its own business logic.
//! Server-side modules compile for native targets; the [`client`] module is
//! the browser half, compiled for `wasm32` only.
//!
//! # A counter
//!
//! ```no_run
//! use liveview::ops::OperationRegistry;
//! use liveview::server::LiveServer;
//! use liveview::state::ReactiveState;
//! use liveview::view::{LiveScope, LiveView};
//!
//! struct Counter;
//!
//! impl LiveView for Counter {
//!     fn operations(&self, ops: &mut OperationRegistry) {
//!         ops.register("increment", |state| {
//!             let count = state.get_i64("count").unwrap_or(0);
//!             state.set("count", count + 1);
//!         });
//!     }
//!
//!     fn render(&self, state: &ReactiveState) -> String {
//!         format!(
//!             r#"<div><p>Count = {}</p><button data-live-click="increment">+</button></div>"#,
//!             state.get_i64("count").unwrap_or(0)
//!         )
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), liveview::error::LiveError> {
//!     let mut scope = LiveScope::new();
//!     scope.view(
//!         "/counter",
//!         || Counter,
//!         |ctx| {
//!             let initial = ctx
//!                 .parameter("initial")
//!                 .and_then(|v| v.parse::<i64>().ok())
//!                 .unwrap_or(0);
//!             ReactiveState::new().with("count", initial)
//!         },
//!     );
//!
//!     LiveServer::new(scope).serve(([127, 0, 0, 1], 3000).into()).await
//! }
//! ```
//!
//! A plain `GET /counter?initial=5` returns the rendered document; the page
//! then connects to `/live`, sends the handshake, and every `increment`
//! click round-trips through the server, which pushes a fresh render.

pub mod error;
pub mod ops;
pub mod protocol;
pub mod state;
pub mod view;

#[cfg(not(target_arch = "wasm32"))]
pub mod server;
#[cfg(not(target_arch = "wasm32"))]
pub mod session;

#[cfg(target_arch = "wasm32")]
pub mod client;

pub use error::LiveError;
pub use ops::OperationRegistry;
pub use protocol::{ClientEvent, Connect, ServerUpdate};
pub use state::{ReactiveState, SubscriptionId};
pub use view::{LiveContext, LiveScope, LiveView, MountContext, ViewInstance};

#[cfg(not(target_arch = "wasm32"))]
pub use server::LiveServer;
#[cfg(not(target_arch = "wasm32"))]
pub use session::{SessionPhase, ViewSession};
