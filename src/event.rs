//! Events: a thin, boolean-decoding specialization of [`Stream`].
//!
//! The server only ever emits once an expression evaluates to `true`, so the
//! first value an event's stream produces is always `true`; every `wait`
//! after that returns immediately without a further round trip.

use std::time::Duration;

use bytes::Bytes;

use crate::codec::TypeDescriptor;
use crate::connection::{Connection, StreamOptions};
use crate::error::Error;
use crate::stream::Stream;

/// Options for [`Event::create`], forwarded to the underlying stream.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventOptions {
    pub start: Option<bool>,
    pub rate: Option<f64>,
}

/// A boolean server-side condition. Created from an expression id (built
/// with [`crate::expr::Expr`]).
pub struct Event {
    stream: Stream,
}

impl Event {
    /// Calls `AddEvent(expression)`, which returns an embedded stream id,
    /// and wraps it as a boolean-decoding stream.
    pub async fn create(
        connection: &Connection,
        expression_id: Bytes,
        opts: EventOptions,
    ) -> Result<Event, Error> {
        let stream_id = connection.add_event(expression_id).await?;
        let stream = connection.bind_stream(stream_id, TypeDescriptor::Bool);

        if let Some(rate) = opts.rate {
            stream.set_rate(rate).await?;
        }
        if opts.start.unwrap_or(true) {
            stream.start().await?;
        }

        Ok(Event { stream })
    }

    /// Returns the first `true` the server ever reports, blocking up to
    /// `timeout`. Every call after the first returns immediately.
    pub async fn wait(&self, timeout: Duration) -> Result<bool, Error> {
        match self.stream.get(timeout).await? {
            crate::codec::Value::Bool(v) => Ok(v),
            other => Err(Error::Protocol(format!(
                "event stream produced a non-boolean value: {other:?}"
            ))),
        }
    }

    /// Releases this event's bond on the underlying stream.
    pub fn remove(self) {
        self.stream.remove();
    }
}
