//! # TM Server
//!
//! Publishes the controller status on the telemetry socket for dashboards and logging clients.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::info;

use comms_if::{
    net::{MonitoredSocket, MonitoredSocketError, NetParams, SocketOptions, zmq},
    tm::TmPacket
};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Telemetry server
pub struct TmServer {
    socket: MonitoredSocket
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TmServerError {
    #[error("Socket error: {0}")]
    SocketError(#[from] MonitoredSocketError),

    #[error("Could not send telemetry: {0}")]
    SendError(zmq::Error),

    #[error("Could not serialize the telemetry: {0}")]
    SerializationError(serde_json::Error),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl TmServer {
    /// Create a new instance of the TM Server.
    ///
    /// This function will not block until a subscriber connects.
    pub fn new(ctx: &zmq::Context, params: &NetParams) -> Result<Self, TmServerError> {
        let socket_options = SocketOptions {
            block_on_first_connect: false,
            bind: true,
            connect_timeout: 1000,
            heartbeat_ivl: 500,
            heartbeat_ttl: 1000,
            heartbeat_timeout: 1000,
            linger: 1,
            send_timeout: 10,
            send_hwm: 100,
            ..Default::default()
        };

        let socket = MonitoredSocket::new(
            ctx,
            zmq::PUB,
            socket_options,
            &params.tm_endpoint
        )?;

        info!("TM server bound to {}", params.tm_endpoint);

        Ok(Self {
            socket
        })
    }

    /// Publish a packet without blocking the control loop.
    pub fn send(&mut self, packet: &TmPacket) -> Result<(), TmServerError> {
        let packet_string = serde_json::to_string(packet)
            .map_err(TmServerError::SerializationError)?;

        self.socket.send(packet_string.as_str(), zmq::DONTWAIT)
            .map_err(TmServerError::SendError)
    }
}

// ------------------------------------------------------------------------------------------------
// TESTS
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::lev_ctrl::{LevCtrl, test_params};
    use util::module::State;

    #[test]
    fn test_publish() -> Result<(), Box<dyn std::error::Error>> {
        let ctx = zmq::Context::new();
        let params = NetParams {
            tc_endpoint: "inproc://tc_publish".into(),
            tm_endpoint: "inproc://tm_publish".into(),
            tm_decimation: 1,
        };

        let mut server = TmServer::new(&ctx, &params)?;

        let sub = ctx.socket(zmq::SUB)?;
        sub.set_subscribe(b"")?;
        sub.set_rcvtimeo(50)?;
        sub.connect(&params.tm_endpoint)?;

        let mut lc = LevCtrl::default();
        lc.init(test_params())?;
        let packet = TmPacket {
            cycle: 42,
            session_time_s: 2.1,
            status: lc.status(),
        };

        // Subscriptions take a moment to propagate, keep publishing until one arrives
        let mut received = None;
        for _ in 0..100 {
            server.send(&packet)?;
            if let Ok(Ok(s)) = sub.recv_string(0) {
                received = Some(s);
                break
            }
        }

        let received: TmPacket = serde_json::from_str(&received.ok_or("No telemetry received")?)?;
        assert_eq!(received.cycle, 42);
        assert_eq!(received.status, packet.status);

        Ok(())
    }
}
