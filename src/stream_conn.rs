//! The stream socket's demultiplexer: decodes inbound `StreamUpdate` frames
//! and routes each `StreamResult` to its registered consumer.

use bytes::Bytes;
use futures_util::StreamExt;
use prost::Message;
use rpc_link_protocol::{Framer, StreamUpdate};
use tokio::net::tcp::OwnedReadHalf;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::Error;
use crate::stream::StreamRegistry;

pub(crate) fn spawn(
    read_half: OwnedReadHalf,
    max_message_size: usize,
    registry: StreamRegistry,
    cancel: CancellationToken,
) {
    tokio::spawn(run(read_half, max_message_size, registry, cancel));
}

async fn run(
    read_half: OwnedReadHalf,
    max_message_size: usize,
    registry: StreamRegistry,
    cancel: CancellationToken,
) {
    let mut source = FramedRead::new(read_half, Framer::new(max_message_size));
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next() => frame,
        };
        match frame {
            None => {
                debug!("stream socket closed by peer");
                break;
            }
            Some(Err(e)) => {
                error!(error = %e, "stream framing error, tearing down connection");
                break;
            }
            Some(Ok(raw)) => {
                if let Err(e) = dispatch(raw, &registry) {
                    error!(error = %e, "malformed stream update, tearing down connection");
                    break;
                }
            }
        }
    }
    // Whatever broke the loop — the peer closing this socket, a framing
    // error here, or the RPC side cancelling the shared token first — every
    // live stream consumer must observe a terminal error on its next `get`/
    // `wait` rather than silently parking until its own timeout fires.
    registry.fail_all(&Error::ConnectionClosed);
    cancel.cancel();
}

fn dispatch(raw: Bytes, registry: &StreamRegistry) -> Result<(), Error> {
    let update = StreamUpdate::decode(raw)?;
    for stream_result in update.results {
        let Some(result) = stream_result.result else {
            continue;
        };
        let id = stream_result.id;
        let value = if let Some(err) = result.error {
            Err(Error::Remote {
                service: err.service,
                name: err.name,
                description: err.description,
                stack_trace: err.stack_trace,
            })
        } else {
            Ok(result.value)
        };
        registry.deliver(id, value);
    }
    Ok(())
}
