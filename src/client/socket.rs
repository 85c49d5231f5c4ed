//! Browser transport wrapper: a thin state machine over the host WebSocket
//! plus a small publish/subscribe surface for its four event channels.
//!
//! Reconnection on an unexpected drop is deliberately not performed here;
//! `connect()` is safe to call again at any time (it tears down any existing
//! transport first), and the embedding page owns the retry policy through
//! the `Close` event.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

/// Connection state, derived directly from the transport's readiness signal.
/// `Initial` means no transport is currently held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Initial,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// The four event channels a consumer can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketEvent {
    Open,
    Close,
    Error,
    Message,
}

/// Token returned by [`Socket::on`], used to detach a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

type Handler = Rc<dyn Fn(&Event)>;

#[derive(Default)]
struct Emitter {
    handlers: HashMap<SocketEvent, Vec<(u64, Handler)>>,
    next: u64,
}

impl Emitter {
    fn on(&mut self, event: SocketEvent, handler: Handler) -> HandlerId {
        let id = self.next;
        self.next += 1;
        self.handlers.entry(event).or_default().push((id, handler));
        HandlerId(id)
    }

    fn off(&mut self, event: SocketEvent, id: HandlerId) {
        if let Some(list) = self.handlers.get_mut(&event) {
            list.retain(|(handler_id, _)| *handler_id != id.0);
        }
    }

    fn snapshot(&self, event: SocketEvent) -> Vec<Handler> {
        self.handlers
            .get(&event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

fn emit(events: &Rc<RefCell<Emitter>>, event: SocketEvent, payload: &Event) {
    // Snapshot first so a handler may (un)subscribe without re-entrancy.
    let handlers = events.borrow().snapshot(event);
    for handler in handlers {
        handler(payload);
    }
}

/// The listener closures wired into the current transport. Kept alive for
/// exactly as long as the transport they are attached to.
struct Hooks {
    onopen: Closure<dyn FnMut(Event)>,
    onclose: Closure<dyn FnMut(CloseEvent)>,
    onerror: Closure<dyn FnMut(Event)>,
    onmessage: Closure<dyn FnMut(MessageEvent)>,
}

/// Wrapper around the browser WebSocket.
pub struct Socket {
    uri: String,
    socket: RefCell<Option<WebSocket>>,
    hooks: RefCell<Option<Hooks>>,
    events: Rc<RefCell<Emitter>>,
}

impl Socket {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            socket: RefCell::new(None),
            hooks: RefCell::new(None),
            events: Rc::new(RefCell::new(Emitter::default())),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn state(&self) -> SocketState {
        match &*self.socket.borrow() {
            Some(socket) => match socket.ready_state() {
                WebSocket::CONNECTING => SocketState::Connecting,
                WebSocket::OPEN => SocketState::Open,
                WebSocket::CLOSING => SocketState::Closing,
                _ => SocketState::Closed,
            },
            None => SocketState::Initial,
        }
    }

    /// Open a new transport, tearing down any existing one first.
    pub fn connect(&self) -> Result<(), JsValue> {
        if self.socket.borrow().is_some() {
            self.disconnect();
        }

        let socket = WebSocket::new(&self.uri)?;

        let events = self.events.clone();
        let onopen = Closure::<dyn FnMut(Event)>::wrap(Box::new(move |event: Event| {
            emit(&events, SocketEvent::Open, &event);
        }));
        let events = self.events.clone();
        let onclose = Closure::<dyn FnMut(CloseEvent)>::wrap(Box::new(move |event: CloseEvent| {
            emit(&events, SocketEvent::Close, event.as_ref());
        }));
        let events = self.events.clone();
        let onerror = Closure::<dyn FnMut(Event)>::wrap(Box::new(move |event: Event| {
            emit(&events, SocketEvent::Error, &event);
        }));
        let events = self.events.clone();
        let onmessage =
            Closure::<dyn FnMut(MessageEvent)>::wrap(Box::new(move |event: MessageEvent| {
                emit(&events, SocketEvent::Message, event.as_ref());
            }));

        socket.set_onopen(Some(onopen.as_ref().unchecked_ref()));
        socket.set_onclose(Some(onclose.as_ref().unchecked_ref()));
        socket.set_onerror(Some(onerror.as_ref().unchecked_ref()));
        socket.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));

        *self.hooks.borrow_mut() = Some(Hooks {
            onopen,
            onclose,
            onerror,
            onmessage,
        });
        *self.socket.borrow_mut() = Some(socket);
        Ok(())
    }

    /// Unregister the event channels and close the transport, returning to
    /// `Initial`. Idempotent: calling with no transport held is a no-op.
    pub fn disconnect(&self) {
        if let Some(socket) = self.socket.borrow_mut().take() {
            socket.set_onopen(None);
            socket.set_onclose(None);
            socket.set_onerror(None);
            socket.set_onmessage(None);
            let _ = socket.close();
        }
        self.hooks.borrow_mut().take();
    }

    /// Forward `data` unmodified, or do nothing if no transport is held.
    pub fn send(&self, data: &str) -> Result<(), JsValue> {
        match &*self.socket.borrow() {
            Some(socket) => socket.send_with_str(data),
            None => Ok(()),
        }
    }

    pub fn on(&self, event: SocketEvent, handler: impl Fn(&Event) + 'static) -> HandlerId {
        self.events.borrow_mut().on(event, Rc::new(handler))
    }

    pub fn off(&self, event: SocketEvent, id: HandlerId) {
        self.events.borrow_mut().off(event, id);
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.disconnect();
    }
}
