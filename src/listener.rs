//! One bound vote listener: socket, accept loop and per-connection handling.
//!
//! Connections are served strictly one at a time in accept order. Each one is
//! read, decoded, rewarded and closed before the next `accept`, so commands
//! from different votes never interleave at the sink. A stop that arrives
//! while a packet is still being read drops that connection unanswered; once
//! the packet is in, its commands are always sent first.

use crate::config::ListenerConfig;
use crate::error::{ListenerError, ProtocolError, SinkError};
use crate::listener_stats::ListenerStats;
use crate::sink::{AuditSink, CommandSink};
use crate::template;
use crate::vote_codec::{self, VoteRecord};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const LISTEN_BACKLOG: i32 = 5;
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of the listener as seen by the owning service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Stopped,
    Binding,
    Listening,
    ShuttingDown,
}

/// A bound listener whose accept loop runs on its own task.
///
/// Dropping it without calling [`VoteListener::shutdown`] still stops the
/// loop and releases the socket, but does not wait for that to happen.
pub struct VoteListener {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl VoteListener {
    /// Bind `config.addr` and start accepting. Must run inside a Tokio runtime.
    pub async fn bind(
        config: ListenerConfig,
        sink: Arc<dyn CommandSink>,
        audit: Arc<dyn AuditSink>,
        stats: Arc<ListenerStats>,
    ) -> Result<Self, ListenerError> {
        let addr = config.addr;
        let listener = bind_socket(addr)
            .and_then(TcpListener::from_std)
            .map_err(|source| ListenerError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ListenerError::Bind { addr, source })?;

        info!(%local_addr, commands = config.commands.len(), "vote listener bound");

        let (audit_tx, audit_rx) = mpsc::unbounded_channel();
        tokio::spawn(audit_worker(audit, Arc::clone(&stats), audit_rx));

        let handler = ConnectionHandler { config, sink, audit_tx, stats };
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(listener, handler, shutdown_rx));

        Ok(Self { local_addr, shutdown_tx, task })
    }

    /// Address actually bound; differs from the configured one when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting and release the socket. A connection still being read is
    /// dropped; one whose packet has arrived is rewarded first.
    pub async fn shutdown(self) -> Result<(), ListenerError> {
        // the receiver is gone only if the loop already exited
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| ListenerError::Task(e.to_string()))?;
        info!(local_addr = %self.local_addr, "vote listener stopped");
        Ok(())
    }
}

fn bind_socket(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    // lets a replacement listener take the port while old peers sit in TIME_WAIT
    #[cfg(unix)]
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

async fn accept_loop(
    listener: TcpListener,
    handler: ConnectionHandler,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_requested(&mut shutdown) => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => handler.handle(stream, peer, &mut shutdown).await,
                Err(err) => {
                    warn!(%err, "accept failed");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
}

/// Resolves once stop has been signalled or the listener handle is gone.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

struct ConnectionHandler {
    config: ListenerConfig,
    sink: Arc<dyn CommandSink>,
    audit_tx: mpsc::UnboundedSender<VoteRecord>,
    stats: Arc<ListenerStats>,
}

impl ConnectionHandler {
    /// Serve one connection. Nothing is ever written back; the stream is
    /// closed when it drops at the end of this call.
    async fn handle(
        &self,
        mut stream: TcpStream,
        peer: SocketAddr,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        self.stats.connection_accepted();

        let read = tokio::select! {
            biased;
            () = stop_requested(shutdown) => Err(ProtocolError::MalformedPacket("listener stopping")),
            read = self.read_packet(&mut stream) => read,
        };

        let decoded = match read {
            Ok(raw) => vote_codec::decode(&raw, &self.config.key),
            Err(err) => Err(err),
        };

        match decoded {
            Ok(vote) => self.reward(vote).await,
            Err(err) => {
                self.stats.packet_rejected(&err);
                debug!(%peer, %err, "discarding vote packet");
            }
        }
    }

    async fn read_packet(&self, stream: &mut TcpStream) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = vec![0u8; self.config.buffer_size];

        let filled = match self.config.read_timeout {
            Some(limit) => timeout(limit, read_up_to(stream, &mut buf))
                .await
                .map_err(|_| ProtocolError::MalformedPacket("read timed out"))?,
            None => read_up_to(stream, &mut buf).await,
        }
        .map_err(|_| ProtocolError::MalformedPacket("connection reset"))?;

        buf.truncate(filled);
        Ok(buf)
    }

    async fn reward(&self, vote: VoteRecord) {
        let commands = template::expand_all(&self.config.commands, &vote);
        let payloads = template::into_payloads(commands, self.config.dispatch_mode);

        let mut delivered = true;
        for payload in &payloads {
            match self.dispatch(payload).await {
                Ok(()) => self.stats.command_sent(),
                Err(err) => {
                    delivered = false;
                    self.stats.sink_failed();
                    warn!(username = vote.username(), %err, "reward command not delivered");
                }
            }
        }

        if !delivered {
            return;
        }

        self.stats.vote_dispatched();
        info!(
            username = vote.username(),
            service = vote.service_name(),
            commands = payloads.len(),
            "vote rewarded"
        );

        // the worker only goes away with the listener
        let _ = self.audit_tx.send(vote);
    }

    async fn dispatch(&self, payload: &str) -> Result<(), SinkError> {
        let limit = self.config.dispatch_timeout;
        match timeout(limit, self.sink.send_command(payload)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(limit)),
        }
    }
}

/// Records rewarded votes in the order they were handled. Runs until every
/// sender is gone, which happens when the accept loop exits.
async fn audit_worker(
    audit: Arc<dyn AuditSink>,
    stats: Arc<ListenerStats>,
    mut votes: mpsc::UnboundedReceiver<VoteRecord>,
) {
    while let Some(vote) = votes.recv().await {
        let audit = Arc::clone(&audit);
        let recorded = tokio::task::spawn_blocking(move || {
            let result = audit.record(&vote);
            (vote, result)
        })
        .await;

        match recorded {
            Ok((_, Ok(()))) => {}
            Ok((vote, Err(err))) => {
                stats.audit_failed();
                warn!(username = vote.username(), %err, "vote audit failed");
            }
            Err(err) => {
                stats.audit_failed();
                warn!(%err, "vote audit task panicked");
            }
        }
    }
}

/// Read until `buf` is full or the peer closes its side.
async fn read_up_to(stream: &mut TcpStream, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
