//! # Network Module
//!
//! ZMQ sockets used by the levitation exec: the tuning command socket (REP) and the telemetry
//! socket (PUB). Each socket is watched by a monitor thread so that the exec can log when clients
//! come and go.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, AtomicUsize, Ordering}},
    thread
};
use serde::Deserialize;
use zmq::{Socket, Context, SocketType, SocketEvent};
use log::{debug, trace, warn};

// Export zmq
pub use zmq;

// ------------------------------------------------------------------------------------------------
// MACROS
// ------------------------------------------------------------------------------------------------

/// Apply a list of `(setter, value)` pairs to a socket, naming the failing setter in the error.
macro_rules! apply_sockopts {
    ($socket:expr, $(($setter:ident, $val:expr)),+ $(,)?) => {
        $(
            $socket.$setter($val)
                .map_err(|e| MonitoredSocketError::SocketOptionError(stringify!($setter), e))?;
        )+
    };
}

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// Receive timeout of the monitor, bounds how long dropping a socket waits for its monitor thread.
const MONITOR_POLL_MS: i32 = 100;

// ------------------------------------------------------------------------------------------------
// STATICS
// ------------------------------------------------------------------------------------------------

/// Used to give every monitor a unique inproc endpoint.
static MONITOR_ID: AtomicUsize = AtomicUsize::new(0);

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Network parameters of the levitation exec.
#[derive(Debug, Clone, Deserialize)]
pub struct NetParams {
    /// Endpoint of the tuning command (REP) socket, e.g. `"tcp://*:5000"`
    pub tc_endpoint: String,

    /// Endpoint of the telemetry (PUB) socket
    pub tm_endpoint: String,

    /// Telemetry is published once every `tm_decimation` control cycles
    pub tm_decimation: u64,
}

/// A zmq socket which keeps count of its connected peers.
///
/// Dereferences to the underlying [`zmq::Socket`] for sending and receiving.
pub struct MonitoredSocket {
    socket: Socket,

    /// Number of peers currently connected, maintained by the monitor thread
    peers: Arc<AtomicUsize>,

    shutdown: Arc<AtomicBool>,

    monitor_thread: Option<thread::JoinHandle<()>>,
}

/// Options applied to a [`MonitoredSocket`] before it is bound or connected.
///
/// Times are in milliseconds and follow the
/// [`zmq_setsockopt`](http://api.zeromq.org/4-2:zmq-setsockopt) conventions, `-1` meaning
/// infinite.
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// Bind to the endpoint (servers) rather than connect to it (clients). Default `false`.
    pub bind: bool,

    /// Wait in [`MonitoredSocket::new`] until the first peer is connected. Default `true`.
    pub block_on_first_connect: bool,

    /// `ZMQ_LINGER`
    pub linger: i32,

    /// `ZMQ_CONNECT_TIMEOUT`
    pub connect_timeout: i32,

    /// `ZMQ_RCVTIMEO`
    pub recv_timeout: i32,

    /// `ZMQ_SNDTIMEO`
    pub send_timeout: i32,

    /// `ZMQ_SNDHWM`
    pub send_hwm: i32,

    /// `ZMQ_HEARTBEAT_IVL`
    pub heartbeat_ivl: i32,

    /// `ZMQ_HEARTBEAT_TIMEOUT`
    pub heartbeat_timeout: i32,

    /// `ZMQ_HEARTBEAT_TTL`
    pub heartbeat_ttl: i32
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum MonitoredSocketError {
    #[error("Could not create the socket: {0}")]
    CreateSocketError(zmq::Error),

    #[error("Could not enable monitoring of the socket: {0}")]
    MonitoringEnableError(zmq::Error),

    #[error("Could not bind or connect to {0}: {1}")]
    EndpointError(String, zmq::Error),

    #[error("The first connection attempt failed with event {0:?}")]
    FirstConnectFailed(SocketEvent),

    #[error("Could not read an event from the monitor: {0}")]
    EventReadError(zmq::Error),

    #[error("Could not apply {0}: {1}")]
    SocketOptionError(&'static str, zmq::Error),

    #[error("Could not start the monitor thread: {0}")]
    MonitorThreadError(std::io::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl MonitoredSocket {
    /// Create the socket, apply `options` and bind or connect it to `endpoint`.
    pub fn new(
        ctx: &Context,
        socket_type: SocketType,
        options: SocketOptions,
        endpoint: &str
    ) -> Result<Self, MonitoredSocketError> {
        let socket = ctx.socket(socket_type)
            .map_err(MonitoredSocketError::CreateSocketError)?;

        let monitor_endpoint = format!(
            "inproc://monitor_{}",
            MONITOR_ID.fetch_add(1, Ordering::Relaxed)
        );
        let monitor = open_monitor(ctx, &socket, &monitor_endpoint)?;

        options.apply(&socket)?;

        let res = if options.bind {
            socket.bind(endpoint)
        }
        else {
            socket.connect(endpoint)
        };
        res.map_err(|e| MonitoredSocketError::EndpointError(endpoint.into(), e))?;

        let peers = Arc::new(AtomicUsize::new(0));

        if options.block_on_first_connect {
            wait_for_first_peer(&monitor)?;
            peers.store(1, Ordering::Relaxed);
        }

        // The monitor thread has to notice shutdown requests
        monitor.set_rcvtimeo(MONITOR_POLL_MS)
            .map_err(|e| MonitoredSocketError::SocketOptionError("set_rcvtimeo", e))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let monitor_thread = {
            let peers = peers.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(monitor_endpoint.clone())
                .spawn(move || run_monitor(monitor, monitor_endpoint, peers, shutdown))
                .map_err(MonitoredSocketError::MonitorThreadError)?
        };

        Ok(Self {
            socket,
            peers,
            shutdown,
            monitor_thread: Some(monitor_thread)
        })
    }

    /// True if at least one peer is connected.
    pub fn connected(&self) -> bool {
        self.num_peers() > 0
    }

    /// Number of peers currently connected.
    pub fn num_peers(&self) -> usize {
        self.peers.load(Ordering::Relaxed)
    }
}

impl Drop for MonitoredSocket {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(handle) = self.monitor_thread.take() {
            if handle.join().is_err() {
                warn!("Socket monitor thread panicked");
            }
        }
    }
}

impl std::ops::Deref for MonitoredSocket {
    type Target = Socket;

    fn deref(&self) -> &Socket {
        &self.socket
    }
}

impl std::ops::DerefMut for MonitoredSocket {
    fn deref_mut(&mut self) -> &mut Socket {
        &mut self.socket
    }
}

impl SocketOptions {
    /// Apply these options to `socket`.
    pub fn apply(&self, socket: &Socket) -> Result<(), MonitoredSocketError> {
        apply_sockopts!(
            socket,
            (set_linger, self.linger),
            (set_connect_timeout, self.connect_timeout),
            (set_rcvtimeo, self.recv_timeout),
            (set_sndtimeo, self.send_timeout),
            (set_sndhwm, self.send_hwm),
            (set_heartbeat_ivl, self.heartbeat_ivl),
            (set_heartbeat_timeout, self.heartbeat_timeout),
            (set_heartbeat_ttl, self.heartbeat_ttl),
        );

        Ok(())
    }
}

impl Default for SocketOptions {
    /// libzmq's own defaults, plus blocking on the first connection.
    fn default() -> Self {
        Self {
            bind: false,
            block_on_first_connect: true,
            linger: 30_000,
            connect_timeout: 0,
            recv_timeout: -1,
            send_timeout: -1,
            send_hwm: 1000,
            heartbeat_ivl: 0,
            heartbeat_timeout: 0,
            heartbeat_ttl: 0
        }
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Enable monitoring on `socket` and connect a PAIR socket to the monitor endpoint.
fn open_monitor(
    ctx: &Context,
    socket: &Socket,
    endpoint: &str
) -> Result<Socket, MonitoredSocketError> {
    socket.monitor(endpoint, SocketEvent::ALL as i32)
        .map_err(MonitoredSocketError::MonitoringEnableError)?;

    let monitor = ctx.socket(zmq::PAIR)
        .map_err(MonitoredSocketError::CreateSocketError)?;
    monitor.connect(endpoint)
        .map_err(|e| MonitoredSocketError::EndpointError(endpoint.into(), e))?;

    Ok(monitor)
}

/// Block until the monitor reports a connection. Delayed connects are retried by zmq.
fn wait_for_first_peer(monitor: &Socket) -> Result<(), MonitoredSocketError> {
    loop {
        match read_event(monitor).map_err(MonitoredSocketError::EventReadError)? {
            SocketEvent::CONNECTED | SocketEvent::ACCEPTED => return Ok(()),
            SocketEvent::CONNECT_DELAYED | SocketEvent::CONNECT_RETRIED => continue,
            other => return Err(MonitoredSocketError::FirstConnectFailed(other))
        }
    }
}

/// Read one event from a monitor socket.
///
/// Events are two frames: a 6 byte header holding the event number and value, then the endpoint
/// address which is discarded.
fn read_event(monitor: &Socket) -> Result<SocketEvent, zmq::Error> {
    let header = monitor.recv_msg(0)?;

    if monitor.get_rcvmore()? {
        monitor.recv_msg(0)?;
    }

    if header.len() < 2 {
        return Err(zmq::Error::EPROTO)
    }

    Ok(SocketEvent::from_raw(u16::from_ne_bytes([header[0], header[1]])))
}

/// Monitor thread body, runs until `shutdown` is set or the monitor fails.
fn run_monitor(
    monitor: Socket,
    endpoint: String,
    peers: Arc<AtomicUsize>,
    shutdown: Arc<AtomicBool>
) {
    while !shutdown.load(Ordering::Relaxed) {
        let event = match read_event(&monitor) {
            Ok(e) => e,
            Err(zmq::Error::EAGAIN) => continue,
            Err(e) => {
                warn!("{}: could not read socket event, monitoring stopped: {}", endpoint, e);
                return
            }
        };

        match event {
            SocketEvent::ACCEPTED | SocketEvent::CONNECTED => {
                let n = peers.fetch_add(1, Ordering::Relaxed) + 1;
                debug!("{}: peer connected ({} connected)", endpoint, n);
            },
            SocketEvent::DISCONNECTED => {
                // Never wraps below zero, a disconnect may follow the blocking first connect
                let prev = peers.fetch_update(
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                    |n| Some(n.saturating_sub(1))
                ).unwrap_or(0);
                debug!("{}: peer disconnected ({} connected)", endpoint, prev.saturating_sub(1));
            },
            other => trace!("{}: socket event {:?}", endpoint, other)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_bound_socket_starts_unconnected() -> Result<(), MonitoredSocketError> {
        let ctx = Context::new();
        let socket = MonitoredSocket::new(
            &ctx,
            zmq::PUB,
            SocketOptions {
                bind: true,
                block_on_first_connect: false,
                linger: 0,
                ..Default::default()
            },
            "inproc://net_test_unconnected"
        )?;

        assert!(!socket.connected());
        assert_eq!(socket.num_peers(), 0);

        Ok(())
    }

    #[test]
    fn test_invalid_endpoint() {
        let ctx = Context::new();
        let res = MonitoredSocket::new(
            &ctx,
            zmq::REP,
            SocketOptions {
                bind: true,
                block_on_first_connect: false,
                ..Default::default()
            },
            "not an endpoint"
        );

        assert!(matches!(res, Err(MonitoredSocketError::EndpointError(_, _))));
    }
}
