//! Framed duplex message channel over a stream socket.
//!
//! All socket I/O runs on a tokio task; completions are queued for the owner,
//! which drains them with the non-blocking [`Transport::pump`] (controller
//! side, driven by a periodic tick) or the blocking [`Transport::run_one`]
//! (peer side, on the traced application's threads).
//!
//! The reader keeps exactly one read in flight: header, then exactly the
//! announced body, then decode, then the next header. Outbound frames are
//! queued and every frame queued at the time the writer wakes is written in a
//! single coalesced `write_all`.

use std::future::Future;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use tracedbg_proto::{decode_body, decode_header, encode_frame, Message, HEADER_LEN};

use crate::endpoint::Endpoint;
use crate::error::NetError;

/// A completion delivered to the transport's owner.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The stream is established.
    Connected,
    /// A complete inbound message.
    Message(Message),
    /// The outbound queue went from empty to non-empty.
    SendingStarted,
    /// The outbound queue drained.
    SendingStopped,
    /// The stream failed; delivered at most once, always last.
    Disconnected(String),
}

impl TransportEvent {
    pub fn dispatch<H: TransportHandler + ?Sized>(self, handler: &mut H) {
        match self {
            TransportEvent::Connected => handler.on_connected(),
            TransportEvent::Message(msg) => handler.on_message(msg),
            TransportEvent::SendingStarted => handler.on_sending_started(),
            TransportEvent::SendingStopped => handler.on_sending_stopped(),
            TransportEvent::Disconnected(reason) => handler.on_disconnected(reason),
        }
    }
}

/// Receives transport completions.
pub trait TransportHandler {
    fn on_connected(&mut self) {}
    fn on_message(&mut self, msg: Message);
    fn on_sending_started(&mut self) {}
    fn on_sending_stopped(&mut self) {}
    fn on_disconnected(&mut self, reason: String);
}

/// Anything messages can be sent through.
pub trait MessageSink {
    fn send_message(&mut self, msg: Message) -> Result<(), NetError>;
}

/// An owned connection the session layer drives: send, poll, tear down.
pub trait Link: MessageSink {
    /// Next ready completion, without blocking.
    fn poll_event(&mut self) -> Option<TransportEvent>;
    /// Stop all I/O; no completion is delivered afterwards.
    fn abort(&mut self);
}

#[derive(Default)]
struct Shared {
    /// Frames handed to the writer and not yet written.
    queued: Mutex<usize>,
    disconnected: AtomicBool,
}

impl Shared {
    /// Emit the single disconnect notification, if nobody beat us to it.
    ///
    /// Holds the `queued` lock so no `SendingStarted` can follow.
    fn fail(&self, events: &mpsc::UnboundedSender<TransportEvent>, reason: String) {
        let _queued = self.queued.lock();
        if !self.disconnected.swap(true, Ordering::SeqCst) {
            info!("transport disconnected: {}", reason);
            let _ = events.send(TransportEvent::Disconnected(reason));
        }
    }
}

/// A single framed connection.
pub struct Transport {
    events: mpsc::UnboundedReceiver<TransportEvent>,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
    aborted: bool,
    local: Option<Endpoint>,
}

impl Transport {
    /// Start connecting to `endpoint`. Returns at once; the outcome arrives
    /// as `Connected` or `Disconnected`.
    pub fn connect(handle: &Handle, endpoint: &Endpoint) -> Self {
        let endpoint = endpoint.clone();
        Self::spawn(handle, None, move |conn| async move {
            match endpoint {
                Endpoint::Tcp { host, port } => {
                    let stream = TcpStream::connect((host.as_str(), port)).await?;
                    stream.set_nodelay(true)?;
                    info!("connected to {}:{}", host, port);
                    conn.run(stream).await;
                }
                #[cfg(unix)]
                Endpoint::Unix(path) => {
                    let stream = tokio::net::UnixStream::connect(&path).await?;
                    info!("connected to {}", path.display());
                    conn.run(stream).await;
                }
                #[cfg(not(unix))]
                Endpoint::Unix(_) => return Err(io::Error::new(io::ErrorKind::Unsupported, NetError::Unsupported)),
            }
            Ok(())
        })
    }

    /// Bind `endpoint` now and accept exactly one connection on the runtime.
    ///
    /// Binding happens synchronously so address errors surface here; use
    /// [`local_endpoint`](Self::local_endpoint) to learn an ephemeral port.
    pub fn listen(handle: &Handle, endpoint: &Endpoint) -> Result<Self, NetError> {
        match endpoint {
            Endpoint::Tcp { host, port } => {
                let listener = std::net::TcpListener::bind((host.as_str(), *port))?;
                listener.set_nonblocking(true)?;
                let addr = listener.local_addr()?;
                let local = Endpoint::tcp(addr.ip().to_string(), addr.port());
                info!("listening on {}", local);
                Ok(Self::spawn(handle, Some(local), move |conn| async move {
                    let listener = TcpListener::from_std(listener)?;
                    let (stream, peer) = listener.accept().await?;
                    stream.set_nodelay(true)?;
                    info!("accepted controller from {}", peer);
                    conn.run(stream).await;
                    Ok(())
                }))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let listener = std::os::unix::net::UnixListener::bind(path)?;
                listener.set_nonblocking(true)?;
                info!("listening on {}", endpoint);
                Ok(Self::spawn(handle, Some(endpoint.clone()), move |conn| async move {
                    let listener = tokio::net::UnixListener::from_std(listener)?;
                    let (stream, _) = listener.accept().await?;
                    info!("accepted controller on local socket");
                    conn.run(stream).await;
                    Ok(())
                }))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(NetError::Unsupported),
        }
    }

    fn spawn<F, Fut>(handle: &Handle, local: Option<Endpoint>, establish: F) -> Self
    where
        F: FnOnce(Connection) -> Fut + Send + 'static,
        Fut: Future<Output = io::Result<()>> + Send + 'static,
    {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let conn = Connection {
            events: events_tx.clone(),
            outbound: outbound_rx,
            shared: Arc::clone(&shared),
        };
        let fail_events = events_tx.clone();
        let fail_shared = Arc::clone(&shared);
        let task = handle.spawn(async move {
            if let Err(e) = establish(conn).await {
                fail_shared.fail(&fail_events, e.to_string());
            }
        });

        Self {
            events,
            events_tx,
            outbound,
            shared,
            task: Some(task),
            aborted: false,
            local,
        }
    }

    /// The bound address of a listening transport.
    pub fn local_endpoint(&self) -> Option<&Endpoint> {
        self.local.as_ref()
    }

    /// True once aborted or disconnected.
    pub fn is_closed(&self) -> bool {
        self.aborted || self.shared.disconnected.load(Ordering::SeqCst)
    }

    /// Queue `msg` for sending.
    ///
    /// Frames sent before the connection is established are held until it
    /// is, and written in order.
    pub fn send(&mut self, msg: Message) -> Result<(), NetError> {
        if self.is_closed() {
            return Err(NetError::Closed);
        }
        let frame = encode_frame(&msg)?;
        trace!(tag = msg.tag(), len = frame.len(), "queue frame");

        let mut queued = self.shared.queued.lock();
        if self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        self.outbound.send(frame).map_err(|_| NetError::Closed)?;
        if *queued == 0 {
            let _ = self.events_tx.send(TransportEvent::SendingStarted);
        }
        *queued += 1;
        Ok(())
    }

    /// Next ready completion, without blocking.
    pub fn poll_event(&mut self) -> Option<TransportEvent> {
        if self.aborted {
            return None;
        }
        self.events.try_recv().ok()
    }

    /// Deliver every ready completion to `handler`; returns how many.
    pub fn pump<H: TransportHandler + ?Sized>(&mut self, handler: &mut H) -> usize {
        let mut handled = 0;
        while let Some(event) = self.poll_event() {
            event.dispatch(handler);
            handled += 1;
        }
        handled
    }

    /// Block until at least one completion is ready, then pump.
    ///
    /// Fails with [`NetError::Closed`] instead of blocking once the
    /// disconnect has been delivered. Must not be called from a runtime
    /// thread.
    pub fn run_one<H: TransportHandler + ?Sized>(&mut self, handler: &mut H) -> Result<usize, NetError> {
        if self.aborted {
            return Err(NetError::Closed);
        }
        if let Ok(event) = self.events.try_recv() {
            event.dispatch(handler);
            return Ok(1 + self.pump(handler));
        }
        // `fail` raises the flag before queueing `Disconnected`, so an empty
        // queue here means nothing else will ever arrive.
        if self.shared.disconnected.load(Ordering::SeqCst) {
            return Err(NetError::Closed);
        }
        let event = self.events.blocking_recv().ok_or(NetError::Closed)?;
        event.dispatch(handler);
        Ok(1 + self.pump(handler))
    }

    /// Cancel all I/O and drop every queued completion.
    ///
    /// Once this returns no handler is invoked again, whatever was in
    /// flight. Idempotent.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        self.aborted = true;
        self.shared.disconnected.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.events.close();
        let mut dropped = 0usize;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        debug!(dropped, "transport aborted");
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.abort();
    }
}

impl MessageSink for Transport {
    fn send_message(&mut self, msg: Message) -> Result<(), NetError> {
        self.send(msg)
    }
}

impl Link for Transport {
    fn poll_event(&mut self) -> Option<TransportEvent> {
        Transport::poll_event(self)
    }

    fn abort(&mut self) {
        Transport::abort(self)
    }
}

/// Task-side half of a transport.
struct Connection {
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    shared: Arc<Shared>,
}

impl Connection {
    async fn run<S>(self, stream: S)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let Connection {
            events,
            outbound,
            shared,
        } = self;
        let _ = events.send(TransportEvent::Connected);

        let (reader, writer) = tokio::io::split(stream);
        let reason = tokio::select! {
            reason = read_loop(reader, &events) => reason,
            reason = write_loop(writer, outbound, &events, &shared) => reason,
        };
        shared.fail(&events, reason);
    }
}

// ── internal helpers ────────────────────────────────────────────────────────

async fn read_loop<R>(mut reader: R, events: &mpsc::UnboundedSender<TransportEvent>) -> String
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_LEN];
    loop {
        if let Err(e) = reader.read_exact(&mut header).await {
            return describe_read_error(e);
        }
        let len = match decode_header(header) {
            Ok(len) => len,
            Err(e) => {
                warn!("rejecting frame: {}", e);
                return e.to_string();
            }
        };
        let mut body = vec![0u8; len];
        if let Err(e) = reader.read_exact(&mut body).await {
            return describe_read_error(e);
        }
        match decode_body(&body) {
            Ok(msg) => {
                trace!(tag = msg.tag(), len, "received frame");
                if events.send(TransportEvent::Message(msg)).is_err() {
                    return "transport owner went away".to_string();
                }
            }
            Err(e) => {
                warn!("undecodable frame: {}", e);
                return e.to_string();
            }
        }
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    events: &mpsc::UnboundedSender<TransportEvent>,
    shared: &Shared,
) -> String
where
    W: AsyncWrite + Unpin,
{
    while let Some(mut batch) = outbound.recv().await {
        let mut frames = 1usize;
        while let Ok(frame) = outbound.try_recv() {
            batch.extend_from_slice(&frame);
            frames += 1;
        }
        if let Err(e) = writer.write_all(&batch).await {
            return e.to_string();
        }
        if let Err(e) = writer.flush().await {
            return e.to_string();
        }
        trace!(frames, bytes = batch.len(), "wrote batch");

        {
            let mut queued = shared.queued.lock();
            *queued = queued.saturating_sub(frames);
            if *queued == 0 {
                let _ = events.send(TransportEvent::SendingStopped);
            }
        }
    }
    "transport closed".to_string()
}

fn describe_read_error(e: io::Error) -> String {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        "connection closed by peer".to_string()
    } else {
        e.to_string()
    }
}
