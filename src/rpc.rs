//! The RPC connection: one socket, one FIFO of pending callers, pipelined
//! request/response multiplexing with a single serialization point.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message;
use rpc_link_protocol::{Framer, ProcedureCall, Request, Response};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::error::Error;

enum Pending {
    Call(oneshot::Sender<Result<Bytes, Error>>),
    Cast,
}

struct WriteState {
    sink: FramedWrite<OwnedWriteHalf, Framer>,
    pending: VecDeque<Pending>,
}

/// Multiplexes synchronous calls over one outgoing socket. Cheap to clone;
/// every clone shares the same underlying socket and pending-reply queue.
#[derive(Clone)]
pub(crate) struct RpcConnection {
    write: std::sync::Arc<Mutex<WriteState>>,
    cancel: CancellationToken,
    call_timeout: Duration,
}

impl RpcConnection {
    pub(crate) fn spawn(
        read_half: OwnedReadHalf,
        write_half: OwnedWriteHalf,
        max_message_size: usize,
        call_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let write = std::sync::Arc::new(Mutex::new(WriteState {
            sink: FramedWrite::new(write_half, Framer::new(max_message_size)),
            pending: VecDeque::new(),
        }));

        let conn = RpcConnection {
            write,
            cancel,
            call_timeout,
        };

        tokio::spawn(conn.clone().run_recv_loop(read_half, max_message_size));
        conn
    }

    async fn run_recv_loop(self, read_half: OwnedReadHalf, max_message_size: usize) {
        let mut source = FramedRead::new(read_half, Framer::new(max_message_size));
        loop {
            let frame = tokio::select! {
                _ = self.cancel.cancelled() => break,
                frame = source.next() => frame,
            };
            match frame {
                None => {
                    debug!("rpc socket closed by peer");
                    break;
                }
                Some(Err(e)) => {
                    error!(error = %e, "rpc framing error, tearing down connection");
                    break;
                }
                Some(Ok(raw)) => {
                    if let Err(e) = self.dispatch_response(raw).await {
                        error!(error = %e, "fatal error handling rpc response, tearing down connection");
                        break;
                    }
                }
            }
        }
        self.fail_all_pending(Error::ConnectionClosed).await;
        self.cancel.cancel();
    }

    async fn dispatch_response(&self, raw: Bytes) -> Result<(), Error> {
        let response = Response::decode(raw)?;
        let mut guard = self.write.lock().await;
        let Some(pending) = guard.pending.pop_front() else {
            return Err(Error::Protocol(
                "received a response with no matching pending call".to_owned(),
            ));
        };
        drop(guard);

        let result = response_to_result(response);
        if let Pending::Call(tx) = pending {
            let _ = tx.send(result);
        }
        Ok(())
    }

    async fn fail_all_pending(&self, err: Error) {
        let mut guard = self.write.lock().await;
        while let Some(pending) = guard.pending.pop_front() {
            if let Pending::Call(tx) = pending {
                let _ = tx.send(Err(clone_error(&err)));
            }
        }
    }

    /// Encodes and sends `call`, blocking until the matching response
    /// arrives or `call_timeout` elapses.
    pub(crate) async fn call(&self, call: ProcedureCall) -> Result<Bytes, Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        let (tx, rx) = oneshot::channel();
        self.send(call, Some(tx)).await?;
        match timeout(self.call_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::ConnectionClosed),
            Err(_) => Err(Error::RpcTimeout),
        }
    }

    /// Encodes and sends `call`, returning as soon as it is enqueued. The
    /// response, when it arrives, is discarded.
    pub(crate) async fn cast(&self, call: ProcedureCall) -> Result<(), Error> {
        if self.cancel.is_cancelled() {
            return Err(Error::ConnectionClosed);
        }
        self.send(call, None).await
    }

    async fn send(
        &self,
        call: ProcedureCall,
        reply: Option<oneshot::Sender<Result<Bytes, Error>>>,
    ) -> Result<(), Error> {
        let request = Request { calls: vec![call] };
        let encoded: Bytes = request.encode_to_vec().into();

        let mut guard = self.write.lock().await;
        guard
            .sink
            .send(encoded)
            .await
            .map_err(|e| Error::Protocol(format!("write failed: {e}")))?;
        guard.pending.push_back(match reply {
            Some(tx) => Pending::Call(tx),
            None => Pending::Cast,
        });
        Ok(())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) async fn close(&self) {
        self.cancel.cancel();
        self.fail_all_pending(Error::ConnectionClosed).await;
    }
}

fn response_to_result(response: Response) -> Result<Bytes, Error> {
    if let Some(err) = response.error {
        return Err(Error::Remote {
            service: err.service,
            name: err.name,
            description: err.description,
            stack_trace: err.stack_trace,
        });
    }
    let Some(result) = response.results.into_iter().next() else {
        warn!("response carried no results and no top-level error");
        return Err(Error::Protocol("response had no results".to_owned()));
    };
    if let Some(err) = result.error {
        return Err(Error::Remote {
            service: err.service,
            name: err.name,
            description: err.description,
            stack_trace: err.stack_trace,
        });
    }
    Ok(result.value)
}

fn clone_error(err: &Error) -> Error {
    match err {
        Error::ConnectionClosed => Error::ConnectionClosed,
        other => Error::Protocol(other.to_string()),
    }
}
