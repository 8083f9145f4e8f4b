//! Connection bootstrap: the two-socket handshake, and the top-level handle
//! higher layers use to issue calls and create streams.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use rpc_link_protocol::scalar;
use rpc_link_protocol::{
    connection_request, connection_response, Argument, ConnectionRequest, ConnectionResponse,
    Framer, ProcedureCall,
};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::codec::{self, ProcedureCallSpec, TypeDescriptor};
use crate::config::Config;
use crate::error::Error;
use crate::rpc::RpcConnection;
use crate::stream::{Stream, StreamRegistry};
use crate::stream_conn;

/// The streaming-protocol service name carrying the administrative
/// `AddStream`/`RemoveStream`/`SetStreamRate`/`StartStream`/`AddEvent`
/// procedures, as distinct from the game-domain services the generated
/// bindings expose.
const STREAM_SERVICE: &str = "KRPC";

struct ConnectionInner {
    client_id: Bytes,
    rpc: RpcConnection,
    registry: StreamRegistry,
    cancel: CancellationToken,
    stream_write: Mutex<Option<OwnedWriteHalf>>,
}

/// A live connection to the server: one RPC socket, one stream socket, and
/// everything built on top. Cheap to clone — every clone shares the same
/// underlying sockets.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

/// Options controlling how a freshly created stream starts.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamOptions {
    /// `None` means the default, `true`.
    pub start: Option<bool>,
    pub rate: Option<f64>,
}

/// Performs the two-socket handshake against `config.host` and returns a
/// ready-to-use [`Connection`]. Any failure at either stage aborts the whole
/// bootstrap; no partially-opened connection is ever returned.
#[instrument(skip(config), fields(host = %config.host, rpc_port = config.rpc_port))]
pub async fn connect(config: Config) -> Result<Connection, Error> {
    config.validate()?;

    let rpc_stream = timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.rpc_port)),
    )
    .await
    .map_err(|_| Error::Connect(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))??;

    let mut rpc_framed = Framed::new(rpc_stream, Framer::new(config.max_message_size));
    let hello = ConnectionRequest {
        r#type: connection_request::Type::Rpc as i32,
        client_name: config.client_name.clone(),
        client_identifier: None,
    };
    send_handshake(&mut rpc_framed, &hello).await?;
    let client_id = recv_handshake(&mut rpc_framed).await?.ok_or_else(|| {
        Error::Protocol("RPC handshake response carried no client_identifier".to_owned())
    })?;

    let (rpc_read, rpc_write) = rpc_framed.into_inner().into_split();

    let stream_stream = timeout(
        config.connect_timeout,
        TcpStream::connect((config.host.as_str(), config.stream_port)),
    )
    .await
    .map_err(|_| Error::Connect(std::io::Error::new(std::io::ErrorKind::TimedOut, "connect timed out")))??;

    let mut stream_framed = Framed::new(stream_stream, Framer::new(config.max_message_size));
    let stream_hello = ConnectionRequest {
        r#type: connection_request::Type::Stream as i32,
        client_name: None,
        client_identifier: Some(client_id.clone()),
    };
    send_handshake(&mut stream_framed, &stream_hello).await?;
    recv_handshake(&mut stream_framed).await?;

    let (stream_read, stream_write) = stream_framed.into_inner().into_split();

    let cancel = CancellationToken::new();
    let rpc = RpcConnection::spawn(
        rpc_read,
        rpc_write,
        config.max_message_size,
        config.call_timeout,
        cancel.clone(),
    );
    let registry = StreamRegistry::default();
    stream_conn::spawn(stream_read, config.max_message_size, registry.clone(), cancel.clone());

    info!(client_id = %hex(&client_id), "connection established");

    Ok(Connection {
        inner: Arc::new(ConnectionInner {
            client_id,
            rpc,
            registry,
            cancel,
            stream_write: Mutex::new(Some(stream_write)),
        }),
    })
}

async fn send_handshake(
    framed: &mut Framed<TcpStream, Framer>,
    request: &ConnectionRequest,
) -> Result<(), Error> {
    use prost::Message;
    framed
        .send(request.encode_to_vec().into())
        .await
        .map_err(|e| Error::Protocol(format!("handshake write failed: {e}")))
}

/// Returns the server-assigned `client_identifier`, if any, after checking
/// the response status.
async fn recv_handshake(framed: &mut Framed<TcpStream, Framer>) -> Result<Option<Bytes>, Error> {
    use prost::Message;
    let raw = framed
        .next()
        .await
        .ok_or(Error::ConnectionClosed)?
        .map_err(|e| Error::Protocol(format!("handshake read failed: {e}")))?;
    let response = ConnectionResponse::decode(raw)?;
    if response.status() != connection_response::Status::Ok {
        let message = response.message.unwrap_or_default();
        return Err(Error::HandshakeRejected(message));
    }
    Ok(response.client_identifier)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("client_id", &self.inner.client_id)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn client_id(&self) -> &Bytes {
        &self.inner.client_id
    }

    pub(crate) fn registry(&self) -> &StreamRegistry {
        &self.inner.registry
    }

    pub(crate) fn is_same(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Calls `service.procedure` with pre-encoded `args` and awaits the
    /// response.
    pub async fn call_rpc(
        &self,
        service: &str,
        procedure: &str,
        args: Vec<(u32, Bytes)>,
    ) -> Result<Bytes, Error> {
        self.inner.rpc.call(build_call(service, procedure, args)).await
    }

    /// Calls `service.procedure` with pre-encoded `args` without waiting for
    /// a response.
    pub async fn cast_rpc(
        &self,
        service: &str,
        procedure: &str,
        args: Vec<(u32, Bytes)>,
    ) -> Result<(), Error> {
        self.inner.rpc.cast(build_call(service, procedure, args)).await
    }

    /// Calls a fully specified [`ProcedureCallSpec`] and awaits the result.
    pub async fn call_spec(&self, spec: &ProcedureCallSpec) -> Result<Bytes, Error> {
        self.inner.rpc.call(codec::encode_procedure_call(spec)).await
    }

    /// Creates (or reuses, if the server dedupes to an existing id) a stream
    /// for `call`, decoding updates as `descriptor`.
    pub async fn create_stream(
        &self,
        call: ProcedureCallSpec,
        descriptor: TypeDescriptor,
        opts: StreamOptions,
    ) -> Result<Stream, Error> {
        let start = opts.start.unwrap_or(true);
        let call_bytes: Bytes = {
            use prost::Message;
            codec::encode_procedure_call(&call).encode_to_vec().into()
        };
        let args = vec![
            (0, call_bytes),
            (1, scalar::encode_bool(start && opts.rate.is_none())),
        ];
        let result = self.call_rpc(STREAM_SERVICE, "AddStream", args).await?;
        let stream_id = scalar::decode_uint64(&result)?;

        if let Some(rate) = opts.rate {
            self.set_stream_rate(stream_id, rate).await?;
            if start {
                self.start_stream(stream_id).await?;
            }
        }

        Ok(self.bind_stream(stream_id, descriptor))
    }

    pub(crate) fn bind_stream(&self, stream_id: u64, descriptor: TypeDescriptor) -> Stream {
        Stream::bind(&self.inner.registry, stream_id, descriptor, self)
    }

    pub(crate) async fn set_stream_rate(&self, stream_id: u64, hz: f64) -> Result<(), Error> {
        let args = vec![(0, scalar::encode_uint64(stream_id)), (1, scalar::encode_double(hz))];
        self.call_rpc(STREAM_SERVICE, "SetStreamRate", args).await.map(|_| ())
    }

    pub(crate) async fn start_stream(&self, stream_id: u64) -> Result<(), Error> {
        let args = vec![(0, scalar::encode_uint64(stream_id))];
        self.call_rpc(STREAM_SERVICE, "StartStream", args).await.map(|_| ())
    }

    /// Fire-and-forget removal, used by the stream shutdown protocol: the
    /// ack is meaningless to a consumer that has already decided to die.
    pub(crate) async fn remove_stream_cast(&self, stream_id: u64) -> Result<(), Error> {
        let args = vec![(0, scalar::encode_uint64(stream_id))];
        self.cast_rpc(STREAM_SERVICE, "RemoveStream", args).await
    }

    pub(crate) async fn add_event(&self, expression_id: Bytes) -> Result<u64, Error> {
        let args = vec![(0, expression_id)];
        let result = self.call_rpc(STREAM_SERVICE, "AddEvent", args).await?;
        let data = <rpc_link_protocol::EventData as prost::Message>::decode(result)?;
        Ok(data.stream_id)
    }

    pub(crate) async fn expression_call(
        &self,
        procedure: &str,
        args: Vec<(u32, Bytes)>,
    ) -> Result<Bytes, Error> {
        self.call_rpc("KRPC.Expression", procedure, args).await
    }

    /// Tears the whole connection group down: the RPC socket, the stream
    /// socket, and every live stream consumer.
    pub async fn close(self) {
        self.inner.cancel.cancel();
        self.inner.rpc.close().await;
        self.inner.registry.fail_all(&Error::ConnectionClosed);
        if let Some(mut write) = self.inner.stream_write.lock().await.take() {
            use tokio::io::AsyncWriteExt;
            let _ = write.shutdown().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.rpc.is_closed()
    }
}

fn build_call(service: &str, procedure: &str, args: Vec<(u32, Bytes)>) -> ProcedureCall {
    ProcedureCall {
        service: service.to_owned(),
        procedure: procedure.to_owned(),
        arguments: args
            .into_iter()
            .map(|(position, value)| Argument { position, value })
            .collect(),
    }
}
