//! The server-side view session: one actor per accepted connection.
//!
//! A session owns the connection's view instance outright (moving the
//! instance in is what enforces the one-listener invariant: a view can never
//! be joined to two sessions). Within the session a single control flow
//! multiplexes the inbound frame stream, state-change notifications, the
//! pending coalesced render, and any timers the view registered at mount.
//!
//! Render coalescing: a state change never sends from the notifying call.
//! It schedules a flush; a newer change cancels and replaces the scheduled
//! flush, so bursts of rapid mutation collapse into a single network write
//! carrying the markup for the latest state. At most one render is
//! outstanding per session at any time, and no state is ever rendered out of
//! order. Inbound frames are drained ahead of the flush, so back-to-back
//! invokes settle before anything is sent.

use std::pin::Pin;
use std::time::Duration;

use futures_util::stream::SelectAll;
use futures_util::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{sleep, MissedTickBehavior, Sleep};
use tokio_stream::wrappers::IntervalStream;
use tokio_tungstenite::WebSocketStream;
use tungstenite::Message;
use uuid::Uuid;

use crate::error::LiveError;
use crate::protocol::{ClientEvent, ServerUpdate};
use crate::state::SubscriptionId;
use crate::view::ViewInstance;

/// Session lifecycle. `Closed` is terminal; sessions are never reused, a
/// reconnecting client gets a brand-new view and session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Joining,
    Mounted,
    Active,
    Closed,
}

type TimerStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// The live binding between one view instance and one open connection.
pub struct ViewSession<S> {
    id: Uuid,
    socket: WebSocketStream<S>,
    instance: ViewInstance,
    subscription: SubscriptionId,
    notify_rx: mpsc::UnboundedReceiver<()>,
    pending: Option<Pin<Box<Sleep>>>,
    delay: Duration,
    timers: SelectAll<TimerStream>,
    phase: SessionPhase,
}

impl<S: AsyncRead + AsyncWrite + Unpin> ViewSession<S> {
    /// Bind a freshly instantiated (not yet mounted) view to an open socket.
    /// `delay` is the render-coalescing window; zero still collapses
    /// same-tick bursts because the flush yields to the scheduler first.
    pub fn new(socket: WebSocketStream<S>, mut instance: ViewInstance, delay: Duration) -> Self {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let subscription = instance.state_mut().subscribe(move |_| {
            // Receiver gone means the session is tearing down; nothing to do.
            let _ = notify_tx.send(());
        });

        Self {
            id: Uuid::new_v4(),
            socket,
            instance,
            subscription,
            notify_rx,
            pending: None,
            delay,
            timers: SelectAll::new(),
            phase: SessionPhase::Joining,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Drive the session to completion. Teardown (unsubscribe, cancel the
    /// pending render, close the socket) runs on every exit path; a normal
    /// peer disconnect is `Ok`.
    pub async fn run(mut self) -> Result<(), LiveError> {
        let result = self.drive().await;
        self.teardown().await;
        match result {
            Err(e) if e.is_disconnect() => Ok(()),
            other => other,
        }
    }

    async fn drive(&mut self) -> Result<(), LiveError> {
        // Joining -> Mounted: run the view's mount routine and start any
        // timers it registered.
        self.instance.mount();
        self.start_timers();
        self.phase = SessionPhase::Mounted;

        // Mounted -> Active: push the first render. Mount-time writes are
        // already part of it, so notifications they produced are stale.
        self.push_render().await?;
        while self.notify_rx.try_recv().is_ok() {}
        self.phase = SessionPhase::Active;

        let has_timers = !self.timers.is_empty();
        loop {
            tokio::select! {
                biased;

                frame = self.socket.next() => match frame {
                    None => return Err(LiveError::ConnectionClosed),
                    Some(Err(e)) => return Err(e.into()),
                    Some(Ok(message)) => {
                        if let Some(event) = Self::decode(message)? {
                            self.handle(event).await?;
                        }
                    }
                },

                Some(()) = self.notify_rx.recv() => {
                    while self.notify_rx.try_recv().is_ok() {}
                    self.schedule_render();
                }

                () = flush_ready(&mut self.pending) => {
                    self.pending = None;
                    self.push_render().await?;
                }

                Some(identifier) = self.timers.next(), if has_timers => {
                    self.instance.dispatch(&identifier)?;
                }
            }
        }
    }

    async fn handle(&mut self, event: ClientEvent) -> Result<(), LiveError> {
        match event {
            ClientEvent::Invoke { identifier } => self.instance.dispatch(&identifier),
            ClientEvent::Refresh => {
                // Forced render: whatever was scheduled is superseded.
                self.pending = None;
                self.push_render().await
            }
        }
    }

    fn decode(message: Message) -> Result<Option<ClientEvent>, LiveError> {
        match message {
            Message::Text(text) => ClientEvent::decode(&text).map(Some),
            Message::Binary(_) => Err(LiveError::BinaryFrame),
            Message::Close(_) => Err(LiveError::ConnectionClosed),
            // Liveness is the transport's concern.
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Ok(None),
        }
    }

    /// Cancel-and-replace: installing a new flush handle drops whichever one
    /// was pending, so only the latest state ever reaches the wire.
    fn schedule_render(&mut self) {
        self.pending = Some(Box::pin(sleep(self.delay)));
    }

    async fn push_render(&mut self) -> Result<(), LiveError> {
        let update = ServerUpdate::Render {
            html: self.instance.render(),
        };
        self.socket.send(Message::Text(update.encode()?)).await?;
        Ok(())
    }

    fn start_timers(&mut self) {
        for timer in self.instance.timers() {
            let identifier = timer.identifier.clone();
            let mut interval = tokio::time::interval(timer.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick of a tokio interval is immediate; skip it so a
            // timer fires one full period after mount.
            let ticks = IntervalStream::new(interval)
                .skip(1)
                .map(move |_| identifier.clone());
            self.timers.push(Box::pin(ticks));
        }
    }

    async fn teardown(&mut self) {
        self.instance.state_mut().unsubscribe(self.subscription);
        self.pending = None;
        self.timers = SelectAll::new();
        let _ = self.socket.close(None).await;
        self.phase = SessionPhase::Closed;
    }
}

/// Resolves when the pending render is due; never resolves while none is
/// scheduled.
async fn flush_ready(pending: &mut Option<Pin<Box<Sleep>>>) {
    match pending.as_mut() {
        Some(flush) => flush.await,
        None => std::future::pending().await,
    }
}
