//! # TC Server
//!
//! Serves tuning commands received over the network command channel. Each request message is one
//! command line and is answered by one response line, produced by the same processor used by the
//! local console.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::{
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    thread::{self, JoinHandle},
    time::Duration
};
use log::{debug, info, warn};

use comms_if::net::{zmq, MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions};

use crate::{
    param_store::ParamStore,
    tc_processor::{self, ResponseFormat}
};

// ------------------------------------------------------------------------------------------------
// CONSTANTS
// ------------------------------------------------------------------------------------------------

/// How long a receive waits before the shutdown flag is checked again.
const RECV_TIMEOUT_MS: i32 = 200;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telecommand server, a REP socket answering tuning commands.
pub struct TcServer {
    ctx: zmq::Context,
    endpoint: String,

    /// `None` after a socket failure, until the socket is reopened
    socket: Option<MonitoredSocket>,

    store: ParamStore,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Errors which can occur in the [`TcServer`]
#[derive(thiserror::Error, Debug)]
pub enum TcServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not recieve a command: {0}")]
    RecvError(zmq::Error),

    #[error("Could not send the response: {0}")]
    SendError(zmq::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TcServer {
    /// Create a new instance of the TC server, bound to the command endpoint.
    ///
    /// This function will not wait for a client to connect before returning.
    pub fn new(
        ctx: &zmq::Context,
        params: &NetParams,
        store: ParamStore
    ) -> Result<Self, TcServerError> {
        let socket = open_socket(ctx, &params.tc_endpoint)?;

        info!("TC server bound to {}", params.tc_endpoint);

        Ok(Self {
            ctx: ctx.clone(),
            endpoint: params.tc_endpoint.clone(),
            socket: Some(socket),
            store
        })
    }

    /// Serve a single command if one arrives before the receive timeout.
    ///
    /// Returns `true` if a command was served. On a receive or send failure the socket is closed,
    /// since a REP socket which failed mid exchange cannot receive again. It is reopened by the
    /// next call.
    pub fn serve_one(&mut self) -> Result<bool, TcServerError> {
        if self.socket.is_none() {
            self.socket = Some(open_socket(&self.ctx, &self.endpoint)?);
            info!("TC server socket reopened on {}", self.endpoint);
        }
        let socket = match self.socket {
            Some(ref s) => s,
            None => return Ok(false)
        };

        let msg = match socket.recv_msg(0) {
            Ok(m) => m,
            Err(zmq::Error::EAGAIN) => return Ok(false),
            Err(e) => {
                self.reset();
                return Err(TcServerError::RecvError(e))
            }
        };

        // A REP socket must always answer before it can receive again
        let response = match msg.as_str() {
            Some(line) => {
                debug!("Recieved command {:?}", line);
                tc_processor::exec_line(&self.store, line, ResponseFormat::Compact)
            },
            None => {
                warn!("Recieved a command which is not valid UTF-8");
                String::from("ERROR: Command is not valid UTF-8")
            }
        };

        if let Err(e) = socket.send(response.as_str(), 0) {
            self.reset();
            return Err(TcServerError::SendError(e))
        }

        Ok(true)
    }

    /// Close the socket, it is reopened on the next [`TcServer::serve_one`].
    pub fn reset(&mut self) {
        self.socket = None;
    }

    /// True if a client is connected to the socket.
    pub fn connected(&self) -> bool {
        self.socket.as_ref().map_or(false, |s| s.connected())
    }

    /// Run the server in its own thread until `shutdown` is set.
    pub fn spawn(mut self, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            let mut client_connected = false;

            while !shutdown.load(Ordering::Relaxed) {
                if self.connected() != client_connected {
                    client_connected = !client_connected;
                    match client_connected {
                        true => info!("TC client connected"),
                        false => warn!("TC client disconnected")
                    }
                }

                if let Err(e) = self.serve_one() {
                    warn!("TC server error: {}", e);

                    // Failures return at once, wait as long as an idle receive would
                    thread::sleep(Duration::from_millis(RECV_TIMEOUT_MS as u64));
                }
            }

            info!("TC server stopped");
        })
    }
}

// ------------------------------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn open_socket(ctx: &zmq::Context, endpoint: &str) -> Result<MonitoredSocket, MonitoredSocketError> {
    let socket_options = SocketOptions {
        bind: true,
        block_on_first_connect: false,
        linger: 1,
        recv_timeout: RECV_TIMEOUT_MS,
        send_timeout: 100,
        ..Default::default()
    };

    MonitoredSocket::new(ctx, zmq::REP, socket_options, endpoint)
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------
