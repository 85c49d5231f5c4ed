//! Views, their factories, and the path registry.
//!
//! A view is the per-connection stateful entity that turns its
//! [`ReactiveState`] into markup. Each registered path carries two factory
//! functions: `init` builds fresh state from the request context (query
//! parameters for the plain-HTTP render, handshake parameters for a live
//! session — the same function either way, so the two starting states agree
//! by construction), and `make` builds the view object itself.

use std::time::Duration;

use indexmap::IndexMap;

use crate::error::LiveError;
use crate::ops::OperationRegistry;
use crate::state::ReactiveState;

/// Request context handed to a route's init function.
///
/// `connected` is false for the plain-HTTP render and true when a live
/// session is being mounted over the socket.
#[derive(Debug, Clone)]
pub struct LiveContext {
    pub connected: bool,
    pub parameters: IndexMap<String, String>,
}

impl LiveContext {
    pub fn new(connected: bool, parameters: IndexMap<String, String>) -> Self {
        Self {
            connected,
            parameters,
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&str> {
        self.parameters.get(key).map(String::as_str)
    }
}

/// A periodic invocation registered during mount.
#[derive(Debug, Clone)]
pub(crate) struct Timer {
    pub(crate) period: Duration,
    pub(crate) identifier: String,
}

/// Mount-time capabilities: initial state writes and, when connected,
/// periodic operation dispatch.
pub struct MountContext<'a> {
    pub connected: bool,
    pub state: &'a mut ReactiveState,
    timers: &'a mut Vec<Timer>,
}

impl MountContext<'_> {
    /// Dispatch `identifier` through the operation registry every `period`
    /// for as long as the session lives. Timers registered during a
    /// non-connected mount (the plain-HTTP render) are discarded, since no
    /// session exists to drive them.
    pub fn every(&mut self, period: Duration, identifier: &str) {
        self.timers.push(Timer {
            period,
            identifier: identifier.to_string(),
        });
    }
}

/// A server-side view: operation table, one-time mount, and rendering.
pub trait LiveView: Send {
    /// Populate the operation-dispatch table. Called once at construction.
    fn operations(&self, _ops: &mut OperationRegistry) {}

    /// One-time setup. May write initial state and register timers.
    fn mount(&mut self, _ctx: &mut MountContext<'_>) {}

    /// Produce the full markup for the view root from the current state.
    fn render(&self, state: &ReactiveState) -> String;
}

type InitFn = Box<dyn Fn(&LiveContext) -> ReactiveState + Send + Sync>;
type MakeFn = Box<dyn Fn() -> Box<dyn LiveView> + Send + Sync>;

/// Per-path view factory pair.
pub struct ViewRoute {
    path: String,
    init: InitFn,
    make: MakeFn,
}

impl ViewRoute {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Build a fresh, not-yet-mounted view instance for one request or
    /// connection.
    pub fn instantiate(&self, ctx: &LiveContext) -> ViewInstance {
        let state = (self.init)(ctx);
        let view = (self.make)();
        let mut ops = OperationRegistry::new();
        view.operations(&mut ops);
        ViewInstance {
            view,
            state,
            ops,
            timers: Vec::new(),
            connected: ctx.connected,
        }
    }
}

/// One view bound to its state, operation table and mount-time timers.
/// Exactly one instance exists per connected client (or per plain-HTTP
/// request); it is never shared and never reused.
pub struct ViewInstance {
    view: Box<dyn LiveView>,
    state: ReactiveState,
    ops: OperationRegistry,
    timers: Vec<Timer>,
    connected: bool,
}

impl ViewInstance {
    /// Run the view's mount routine.
    pub fn mount(&mut self) {
        let mut ctx = MountContext {
            connected: self.connected,
            state: &mut self.state,
            timers: &mut self.timers,
        };
        self.view.mount(&mut ctx);
    }

    pub fn render(&self) -> String {
        self.view.render(&self.state)
    }

    /// Dispatch an operation identifier through the registry.
    pub fn dispatch(&mut self, identifier: &str) -> Result<(), LiveError> {
        self.ops.invoke(&mut self.state, identifier)
    }

    pub fn state(&self) -> &ReactiveState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ReactiveState {
        &mut self.state
    }

    pub fn connected(&self) -> bool {
        self.connected
    }

    pub(crate) fn timers(&self) -> &[Timer] {
        &self.timers
    }
}

/// The routing table passed into server startup: path → view factory, plus
/// the socket endpoint and the render-coalescing delay.
///
/// This is an explicit object handed to [`crate::server::LiveServer`], not a
/// process-wide singleton.
pub struct LiveScope {
    endpoint: String,
    render_delay: Duration,
    routes: IndexMap<String, ViewRoute>,
}

impl Default for LiveScope {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveScope {
    pub fn new() -> Self {
        Self {
            endpoint: "/live".to_string(),
            render_delay: Duration::ZERO,
            routes: IndexMap::new(),
        }
    }

    /// Change the socket endpoint path (default `/live`).
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.to_string();
        self
    }

    /// Widen the render-coalescing window. Zero (the default) already
    /// collapses same-tick mutation bursts, because the flush yields to the
    /// scheduler before sending.
    pub fn with_render_delay(mut self, delay: Duration) -> Self {
        self.render_delay = delay;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn render_delay(&self) -> Duration {
        self.render_delay
    }

    /// Register a view under `path`.
    pub fn view<V: LiveView + 'static>(
        &mut self,
        path: &str,
        make: impl Fn() -> V + Send + Sync + 'static,
        init: impl Fn(&LiveContext) -> ReactiveState + Send + Sync + 'static,
    ) {
        self.routes.insert(
            path.to_string(),
            ViewRoute {
                path: path.to_string(),
                init: Box::new(init),
                make: Box::new(move || Box::new(make())),
            },
        );
    }

    /// Handshake-time (and HTTP-time) lookup.
    pub fn resolve(&self, path: &str) -> Option<&ViewRoute> {
        self.routes.get(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct Counter;

    impl LiveView for Counter {
        fn operations(&self, ops: &mut OperationRegistry) {
            ops.register("increment", |state| {
                let count = state.get_i64("count").unwrap_or(0);
                state.set("count", count + 1);
            });
        }

        fn render(&self, state: &ReactiveState) -> String {
            format!("<p>Count = {}</p>", state.get_i64("count").unwrap_or(0))
        }
    }

    struct Clock;

    impl LiveView for Clock {
        fn operations(&self, ops: &mut OperationRegistry) {
            ops.register("tick", |state| {
                let t = state.get_i64("ticks").unwrap_or(0);
                state.set("ticks", t + 1);
            });
        }

        fn mount(&mut self, ctx: &mut MountContext<'_>) {
            ctx.state.set("ticks", 0);
            if ctx.connected {
                ctx.every(Duration::from_secs(1), "tick");
            }
        }

        fn render(&self, state: &ReactiveState) -> String {
            format!("<p>{} ticks</p>", state.get_i64("ticks").unwrap_or(0))
        }
    }

    fn scope() -> LiveScope {
        let mut scope = LiveScope::new();
        scope.view(
            "/counter",
            || Counter,
            |ctx| {
                let initial = ctx
                    .parameter("initial")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                ReactiveState::new().with("count", initial)
            },
        );
        scope.view("/clock", || Clock, |_| ReactiveState::new());
        scope
    }

    #[test]
    fn init_derives_state_from_parameters() {
        let scope = scope();
        let mut params = IndexMap::new();
        params.insert("initial".to_string(), "5".to_string());
        let ctx = LiveContext::new(false, params);

        let instance = scope.resolve("/counter").unwrap().instantiate(&ctx);
        assert_eq!(instance.render(), "<p>Count = 5</p>");
    }

    #[test]
    fn dispatch_mutates_state_through_the_registry() {
        let scope = scope();
        let ctx = LiveContext::new(true, IndexMap::new());
        let mut instance = scope.resolve("/counter").unwrap().instantiate(&ctx);

        instance.dispatch("increment").unwrap();
        instance.dispatch("increment").unwrap();
        assert_eq!(instance.render(), "<p>Count = 2</p>");
    }

    #[test]
    fn unresolved_path_is_none() {
        assert!(scope().resolve("/missing").is_none());
    }

    #[test]
    fn timers_register_only_when_connected() {
        let scope = scope();
        let route = scope.resolve("/clock").unwrap();

        let mut over_http = route.instantiate(&LiveContext::new(false, IndexMap::new()));
        over_http.mount();
        assert!(over_http.timers().is_empty());

        let mut over_socket = route.instantiate(&LiveContext::new(true, IndexMap::new()));
        over_socket.mount();
        assert_eq!(over_socket.timers().len(), 1);
        assert_eq!(over_socket.timers()[0].identifier, "tick");
    }

    #[test]
    fn mount_writes_initial_state() {
        let scope = scope();
        let route = scope.resolve("/clock").unwrap();
        let mut instance = route.instantiate(&LiveContext::new(false, IndexMap::new()));
        instance.mount();
        assert_eq!(instance.render(), "<p>0 ticks</p>");
    }
}
