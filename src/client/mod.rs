//! The browser half of the protocol, compiled for `wasm32` only.
//!
//! [`setup`] is the usual entry point: it waits for DOM readiness, resolves
//! the socket endpoint against the page location, and opens the connection.
//! A [`View`] then binds a root element to the socket.

pub mod binding;
pub mod socket;
pub mod view;

pub use socket::{HandlerId, Socket, SocketEvent, SocketState};
pub use view::{Morphdom, Reconcile, View};

use std::rc::Rc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{console, DocumentReadyState, Url};

/// Resolve `endpoint` against the page location, mapping the scheme to
/// `ws:`/`wss:`.
pub fn resolve_endpoint(endpoint: &str) -> Result<String, JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let location = window.location();

    let base = location.href()?;
    let url = Url::new_with_base(endpoint, &base)?;
    let protocol = if location.protocol()? == "https:" {
        "wss:"
    } else {
        "ws:"
    };
    url.set_protocol(protocol);

    Ok(url.href())
}

/// Open a socket to `endpoint` immediately.
pub fn connect(endpoint: &str) -> Result<Rc<Socket>, JsValue> {
    let socket = Rc::new(Socket::new(&resolve_endpoint(endpoint)?));
    socket.connect()?;
    Ok(socket)
}

/// Open a socket to `endpoint` once the document is ready.
pub fn setup(endpoint: &str) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("no window"))?;
    let document = window
        .document()
        .ok_or_else(|| JsValue::from_str("no document"))?;

    if document.ready_state() == DocumentReadyState::Loading {
        let endpoint = endpoint.to_string();
        let once = Closure::once_into_js(move || match connect(&endpoint) {
            // The connection lives for the rest of the page.
            Ok(socket) => std::mem::forget(socket),
            Err(e) => console::error_2(&"[live] connect failed:".into(), &e),
        });
        document
            .add_event_listener_with_callback("DOMContentLoaded", once.unchecked_ref())?;
    } else {
        std::mem::forget(connect(endpoint)?);
    }

    Ok(())
}
