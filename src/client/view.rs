//! Browser view: binds interactive elements to outgoing invoke messages and
//! applies incoming renders to the live document.
//!
//! The actual tree diff/patch is delegated to an external reconciler; the
//! provided [`Morphdom`] binds the `morphdom` module and is assumed correct.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::prelude::wasm_bindgen;
use wasm_bindgen::JsCast;
use web_sys::{console, Element, Event, MessageEvent};

use crate::client::binding;
use crate::client::socket::{HandlerId, Socket, SocketEvent};
use crate::protocol::{ClientEvent, Connect, ServerUpdate};

/// The external DOM-reconciliation collaborator: mutate `root` to match
/// `html` while preserving node identity, focus and scroll where possible.
pub trait Reconcile {
    fn apply(&self, root: &Element, html: &str);
}

#[wasm_bindgen(module = "morphdom")]
extern "C" {
    #[wasm_bindgen(js_name = default)]
    fn morphdom(from: &Element, to: &str);
}

/// The default reconciler, backed by the `morphdom` module.
pub struct Morphdom;

impl Reconcile for Morphdom {
    fn apply(&self, root: &Element, html: &str) {
        morphdom(root, html);
    }
}

/// One live view in the page: a root element, the socket it speaks through,
/// and the parameters it hands the server at connect time.
pub struct View {
    socket: Rc<Socket>,
    root: Element,
    parameters: IndexMap<String, String>,
    reconciler: Rc<dyn Reconcile>,
    bindings: RefCell<Vec<(Element, Closure<dyn FnMut(Event)>)>>,
    handlers: RefCell<Vec<(SocketEvent, HandlerId)>>,
}

impl View {
    pub fn new(socket: Rc<Socket>, root: Element, parameters: IndexMap<String, String>) -> Self {
        Self::with_reconciler(socket, root, parameters, Rc::new(Morphdom))
    }

    pub fn with_reconciler(
        socket: Rc<Socket>,
        root: Element,
        parameters: IndexMap<String, String>,
        reconciler: Rc<dyn Reconcile>,
    ) -> Self {
        Self {
            socket,
            root,
            parameters,
            reconciler,
            bindings: RefCell::new(Vec::new()),
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// Attach to the socket and wire up the interaction bindings. Call once,
    /// before or after `socket.connect()`.
    pub fn join(&self) {
        self.bind_interactions();

        let socket = self.socket.clone();
        let parameters = self.parameters.clone();
        let open = self.socket.on(SocketEvent::Open, move |_| {
            let path = web_sys::window()
                .and_then(|w| w.location().pathname().ok())
                .unwrap_or_else(|| "/".to_string());
            let connect = Connect {
                path,
                parameters: parameters.clone(),
            };
            match connect.encode() {
                Ok(text) => {
                    if let Err(e) = socket.send(&text) {
                        console::error_2(&"[live] handshake send failed:".into(), &e);
                    }
                }
                Err(e) => console::error_1(&format!("[live] handshake encode failed: {e}").into()),
            }
        });

        let root = self.root.clone();
        let reconciler = self.reconciler.clone();
        let message = self.socket.on(SocketEvent::Message, move |event| {
            let Some(event) = event.dyn_ref::<MessageEvent>() else {
                return;
            };
            let Some(text) = event.data().as_string() else {
                return;
            };
            match ServerUpdate::decode(&text) {
                Ok(ServerUpdate::Render { html }) => reconciler.apply(&root, &html),
                Err(e) => console::error_1(&format!("[live] undecodable update: {e}").into()),
            }
        });

        // No automatic recovery: the page simply goes static. The embedding
        // application may reconnect from its own Close handler.
        let close = self.socket.on(SocketEvent::Close, move |_| {
            console::warn_1(&"[live] connection closed; page is now static".into());
        });

        let mut handlers = self.handlers.borrow_mut();
        handlers.push((SocketEvent::Open, open));
        handlers.push((SocketEvent::Message, message));
        handlers.push((SocketEvent::Close, close));
    }

    /// Detach from the socket and drop the interaction bindings.
    pub fn leave(&self) {
        for (event, id) in self.handlers.borrow_mut().drain(..) {
            self.socket.off(event, id);
        }
        for (element, closure) in self.bindings.borrow_mut().drain(..) {
            let _ = element.remove_event_listener_with_callback(
                "click",
                closure.as_ref().unchecked_ref(),
            );
        }
    }

    /// Scan the root for `data-live-click` carriers and attach listeners
    /// that serialize and send an invoke message.
    fn bind_interactions(&self) {
        let mut bindings = self.bindings.borrow_mut();
        for element in binding::all(&self.root, "click") {
            let Some(identifier) = binding::attr(&element, "click") else {
                continue;
            };
            let socket = self.socket.clone();
            let closure = Closure::<dyn FnMut(Event)>::wrap(Box::new(move |_: Event| {
                let invoke = ClientEvent::Invoke {
                    identifier: identifier.clone(),
                };
                match invoke.encode() {
                    Ok(text) => {
                        if let Err(e) = socket.send(&text) {
                            console::error_2(&"[live] invoke send failed:".into(), &e);
                        }
                    }
                    Err(e) => console::error_1(&format!("[live] invoke encode failed: {e}").into()),
                }
            }));
            let _ = element
                .add_event_listener_with_callback("click", closure.as_ref().unchecked_ref());
            bindings.push((element, closure));
        }
    }
}

impl Drop for View {
    fn drop(&mut self) {
        self.leave();
    }
}
