//! Operation registry: named server-side actions a client may invoke.
//!
//! Identifiers are plain strings, unique within one view instance. The table
//! is populated once when the view is constructed and never grows afterwards.
//! Actions receive the view's state mutably; from the wire's perspective they
//! are zero-argument.

use crate::error::LiveError;
use crate::state::ReactiveState;
use indexmap::IndexMap;

type Action = Box<dyn FnMut(&mut ReactiveState) + Send>;
type Fallback = Box<dyn FnMut(&mut ReactiveState, &str) + Send>;

/// Maps operation identifiers to actions.
///
/// The default policy for an unknown identifier is a hard
/// [`LiveError::OperationNotFound`], which terminates the session. A view may
/// install a catch-all with [`OperationRegistry::on_unhandled`] to recover
/// locally instead (log-and-ignore, for example).
#[derive(Default)]
pub struct OperationRegistry {
    actions: IndexMap<String, Action>,
    fallback: Option<Fallback>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an action under `identifier`. Registering the same identifier
    /// again replaces the previous action.
    pub fn register(
        &mut self,
        identifier: &str,
        action: impl FnMut(&mut ReactiveState) + Send + 'static,
    ) {
        self.actions.insert(identifier.to_string(), Box::new(action));
    }

    /// Replace the failure policy for unknown identifiers.
    pub fn on_unhandled(
        &mut self,
        fallback: impl FnMut(&mut ReactiveState, &str) + Send + 'static,
    ) {
        self.fallback = Some(Box::new(fallback));
    }

    /// Look up `identifier` and run its action exactly once against `state`.
    pub fn invoke(&mut self, state: &mut ReactiveState, identifier: &str) -> Result<(), LiveError> {
        match self.actions.get_mut(identifier) {
            Some(action) => {
                action(state);
                Ok(())
            }
            None => match self.fallback.as_mut() {
                Some(fallback) => {
                    fallback(state, identifier);
                    Ok(())
                }
                None => Err(LiveError::OperationNotFound(identifier.to_string())),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Registered identifiers, in registration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for OperationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationRegistry")
            .field("identifiers", &self.actions.keys().collect::<Vec<_>>())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
