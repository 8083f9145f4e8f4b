//! Per-stream consumer state and the registry that demultiplexes inbound
//! `StreamUpdate` frames to the right consumer.
//!
//! There is no dedicated task per stream (see DESIGN.md): state is guarded
//! by a plain mutex and waiters park on a [`tokio::sync::Notify`] instead of
//! each stream running its own actor loop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tracing::warn;

use crate::codec::{self, TypeDescriptor, Value};
use crate::connection::Connection;
use crate::error::Error;

/// The value most recently pushed for a stream, or the remote error the
/// server reported in its place.
pub(crate) type RawResult = Result<Bytes, Error>;

pub(crate) struct StreamInner {
    id: u64,
    descriptor: TypeDescriptor,
    connection: Connection,
    state: StdMutex<StreamState>,
    notify: Notify,
}

struct StreamState {
    latest: Option<RawResult>,
    bonds: std::collections::HashSet<u64>,
    next_bond_id: u64,
    subscribers: Vec<Subscriber>,
    next_subscriber_id: u64,
    shutdown_scheduled: bool,
}

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<RawResult>,
    remove_after_delivery: bool,
}

/// Maps `stream_id -> consumer`, shared between stream creation (via the RPC
/// connection) and the stream connection's demultiplexer.
#[derive(Clone, Default)]
pub(crate) struct StreamRegistry {
    streams: Arc<StdMutex<HashMap<u64, Arc<StreamInner>>>>,
}

impl StreamRegistry {
    pub(crate) fn lookup(&self, id: u64) -> Option<Arc<StreamInner>> {
        self.streams.lock().expect("stream registry poisoned").get(&id).cloned()
    }

    /// Finds the existing consumer for `id`, or registers a freshly built
    /// one. Returns the consumer either way, so dedup is transparent to the
    /// caller.
    fn get_or_insert(&self, id: u64, descriptor: &TypeDescriptor, connection: &Connection) -> Arc<StreamInner> {
        let mut streams = self.streams.lock().expect("stream registry poisoned");
        streams
            .entry(id)
            .or_insert_with(|| {
                Arc::new(StreamInner {
                    id,
                    descriptor: descriptor.clone(),
                    connection: connection.clone(),
                    state: StdMutex::new(StreamState {
                        latest: None,
                        bonds: std::collections::HashSet::new(),
                        next_bond_id: 0,
                        subscribers: Vec::new(),
                        next_subscriber_id: 0,
                        shutdown_scheduled: false,
                    }),
                    notify: Notify::new(),
                })
            })
            .clone()
    }

    fn unregister(&self, id: u64) {
        self.streams.lock().expect("stream registry poisoned").remove(&id);
    }

    /// Delivers an inbound update to the registered consumer for `id`.
    /// Unknown ids are dropped with a warning, per the demux contract.
    pub(crate) fn deliver(&self, id: u64, result: RawResult) {
        match self.lookup(id) {
            Some(inner) => inner.deliver(result),
            None => warn!(stream_id = id, "dropping update for unknown stream id"),
        }
    }

    /// Tears every live stream down with `err`, used when the connection
    /// group fails.
    pub(crate) fn fail_all(&self, err: &Error) {
        let streams = self.streams.lock().expect("stream registry poisoned");
        for inner in streams.values() {
            inner.deliver(Err(clone_error(err)));
        }
    }
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::ConnectionClosed => Error::ConnectionClosed,
        other => Error::Protocol(other.to_string()),
    }
}

impl StreamInner {
    fn deliver(&self, result: RawResult) {
        let mut state = self.state.lock().expect("stream state poisoned");

        let is_distinct = match (&state.latest, &result) {
            (Some(Ok(prev)), Ok(next)) => prev != next,
            _ => true,
        };

        state.subscribers.retain_mut(|sub| {
            let delivered = sub.tx.send(clone_raw(&result)).is_ok();
            delivered && !sub.remove_after_delivery
        });

        state.latest = Some(result);
        drop(state);

        if is_distinct {
            self.notify.notify_waiters();
        }
    }

    fn add_bond(&self) -> u64 {
        let mut state = self.state.lock().expect("stream state poisoned");
        let bond_id = state.next_bond_id;
        state.next_bond_id += 1;
        state.bonds.insert(bond_id);
        state.shutdown_scheduled = false;
        bond_id
    }

    /// Drops `bond_id`; if the bond set is now empty, schedules the
    /// two-phase shutdown check described in the stream lifecycle section.
    fn release_bond(self: &Arc<Self>, bond_id: u64) {
        let became_empty = {
            let mut state = self.state.lock().expect("stream state poisoned");
            state.bonds.remove(&bond_id);
            let empty = state.bonds.is_empty();
            if empty {
                state.shutdown_scheduled = true;
            }
            empty
        };
        if became_empty {
            let this = Arc::clone(self);
            tokio::spawn(async move {
                // Yield once so a late `create` racing against this removal
                // has a chance to add a fresh bond before we commit to
                // tearing the stream down.
                tokio::task::yield_now().await;
                this.run_shutdown_check().await;
            });
        }
    }

    async fn run_shutdown_check(self: Arc<Self>) {
        let still_empty = {
            let state = self.state.lock().expect("stream state poisoned");
            state.bonds.is_empty() && state.shutdown_scheduled
        };
        if !still_empty {
            return;
        }
        self.connection.registry().unregister(self.id);
        let _ = self.connection.remove_stream_cast(self.id).await;
    }
}

fn clone_raw(result: &RawResult) -> RawResult {
    match result {
        Ok(b) => Ok(b.clone()),
        Err(e) => Err(clone_error(e)),
    }
}

/// A handle to a server-side stream. Dropping it without calling
/// [`Stream::remove`] still releases the bond, so a forgotten handle cannot
/// leak one.
pub struct Stream {
    inner: Arc<StreamInner>,
    bond_id: u64,
    removed: bool,
}

/// Options for [`Stream::subscribe`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SubscribeOptions {
    /// Deliver the current cached value (if any) immediately on subscribe.
    pub immediate: bool,
    /// Release this bond after the first delivery, for single-shot use.
    pub remove: bool,
}

/// A push-style subscription to a stream's raw, undecoded updates.
pub struct Subscription {
    inner: Arc<StreamInner>,
    id: u64,
    rx: mpsc::UnboundedReceiver<RawResult>,
}

impl Subscription {
    pub async fn next(&mut self) -> Option<RawResult> {
        self.rx.recv().await
    }

    /// Removes this subscription from the stream's subscriber set. A
    /// single-shot subscription (`opts.remove = true`) already drops itself
    /// after its first delivery; calling this beforehand is also fine, it is
    /// just a no-op the next time the subscriber list is touched.
    pub fn unsubscribe(self) {
        let mut state = self.inner.state.lock().expect("stream state poisoned");
        state.subscribers.retain(|sub| sub.id != self.id);
    }
}

/// Lets a [`Subscription`] be driven with `futures_util::StreamExt` (`.next()`
/// via the trait, `.filter_map()`, etc.) instead of only its own inherent
/// `next` method, for callers that already work in terms of the `Stream`
/// trait.
impl futures_util::Stream for Subscription {
    type Item = RawResult;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.get_mut().rx.poll_recv(cx)
    }
}

impl Stream {
    pub(crate) fn bind(
        registry: &StreamRegistry,
        id: u64,
        descriptor: TypeDescriptor,
        connection: &Connection,
    ) -> Stream {
        let inner = registry.get_or_insert(id, &descriptor, connection);
        let bond_id = inner.add_bond();
        Stream {
            inner,
            bond_id,
            removed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Returns the latest cached value, blocking up to `timeout` if none has
    /// arrived yet.
    pub async fn get(&self, wait_timeout: Duration) -> Result<Value, Error> {
        let raw = self
            .wait_for(wait_timeout, |latest| latest.as_ref().map(clone_raw))
            .await?;
        self.decode(raw)
    }

    /// Parks until the next *distinct* update (see DESIGN.md), or up to
    /// `wait_timeout`.
    pub async fn wait(&self, wait_timeout: Duration) -> Result<Value, Error> {
        let baseline: Option<RawResult> = {
            let state = self.inner.state.lock().expect("stream state poisoned");
            state.latest.as_ref().map(clone_raw)
        };
        let raw = timeout(wait_timeout, async {
            loop {
                // `enable()` registers this waiter with the `Notify` before
                // the state is checked, so a `deliver()` landing between the
                // check and the `.await` below still wakes it — without it,
                // `notify_waiters()` only wakes futures already polled, and a
                // notification arriving in that window would be lost.
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let state = self.inner.state.lock().expect("stream state poisoned");
                    if let Some(latest) = &state.latest {
                        let changed = match (&baseline, latest) {
                            (Some(Ok(prev)), Ok(next)) => prev != next,
                            (None, _) => true,
                            _ => true,
                        };
                        if changed {
                            return clone_raw(latest);
                        }
                    }
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| Error::StreamTimeout)?;
        self.decode(raw?)
    }

    async fn wait_for(
        &self,
        wait_timeout: Duration,
        extract: impl Fn(&Option<RawResult>) -> Option<RawResult>,
    ) -> Result<Bytes, Error> {
        {
            let state = self.inner.state.lock().expect("stream state poisoned");
            if let Some(result) = extract(&state.latest) {
                return result;
            }
        }
        let raw = timeout(wait_timeout, async {
            loop {
                // See the comment in `wait`: `enable()` before the state
                // check closes the lost-wakeup window between checking
                // `state.latest` and awaiting the notification.
                let notified = self.inner.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                {
                    let state = self.inner.state.lock().expect("stream state poisoned");
                    if let Some(result) = extract(&state.latest) {
                        return result;
                    }
                }
                notified.await;
            }
        })
        .await
        .map_err(|_| Error::StreamTimeout)??;
        Ok(raw)
    }

    fn decode(&self, raw: Bytes) -> Result<Value, Error> {
        codec::decode(raw, &self.inner.descriptor, &self.inner.connection)
    }

    /// Registers for push delivery of raw updates.
    pub fn subscribe(&self, opts: SubscribeOptions) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.state.lock().expect("stream state poisoned");
        if opts.immediate {
            if let Some(latest) = &state.latest {
                let _ = tx.send(clone_raw(latest));
            }
        }
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;
        state.subscribers.push(Subscriber {
            id,
            tx,
            remove_after_delivery: opts.remove,
        });
        drop(state);
        Subscription {
            inner: Arc::clone(&self.inner),
            id,
            rx,
        }
    }

    pub async fn set_rate(&self, hz: f64) -> Result<(), Error> {
        self.inner.connection.set_stream_rate(self.inner.id, hz).await
    }

    pub async fn start(&self) -> Result<(), Error> {
        self.inner.connection.start_stream(self.inner.id).await
    }

    /// Releases this handle's bond. If the bond set becomes empty, shutdown
    /// is scheduled per the two-phase protocol.
    pub fn remove(mut self) {
        self.removed = true;
        self.inner.release_bond(self.bond_id);
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        if !self.removed {
            self.inner.release_bond(self.bond_id);
        }
    }
}
