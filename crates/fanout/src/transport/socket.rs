use std::time::Duration;

use fanout_protocol::Endpoint;
use tracing::debug;
use zeromq::{Socket, SocketRecv, SocketSend, ZmqError, ZmqMessage};

use crate::error::{Error, Result};

const PEER_POLL: Duration = Duration::from_millis(20);

/// Bind `socket` to `endpoint` and return the address it actually owns.
///
/// Ranges are tried in order until one port is free; port `0` lets the OS
/// choose. The returned address is what peers must connect to.
pub async fn bind<S: Socket>(socket: &mut S, endpoint: &Endpoint) -> Result<String> {
    let mut reason = String::from("no candidate address");

    for candidate in endpoint.bind_candidates() {
        match socket.bind(&candidate).await {
            Ok(bound) => {
                debug!("Bound {} (requested {})", bound, endpoint);
                return Ok(bound.to_string());
            }
            Err(e) => {
                debug!("Cannot bind {}: {}", candidate, e);
                reason = e.to_string();
            }
        }
    }

    Err(Error::Bind {
        endpoint: endpoint.to_string(),
        reason,
    })
}

pub async fn connect<S: Socket>(socket: &mut S, url: &str) -> Result<()> {
    socket.connect(url).await?;
    debug!("Connected to {}", url);
    Ok(())
}

pub async fn send_frame<S: SocketSend + Send>(socket: &mut S, payload: Vec<u8>) -> Result<()> {
    socket.send(ZmqMessage::from(payload)).await?;
    Ok(())
}

/// Send `message`, holding it until the socket has a peer to deliver to.
///
/// A PUSH socket without connected peers hands the message back instead of
/// queueing it; this keeps offering it every `PEER_POLL` until a peer shows up.
/// Any other transport error is returned.
pub async fn send_queued<S: SocketSend + Send>(socket: &mut S, message: ZmqMessage) -> Result<()> {
    let mut message = message;
    loop {
        match socket.send(message).await {
            Ok(()) => return Ok(()),
            Err(ZmqError::ReturnToSender { message: returned, .. }) => {
                message = returned;
                tokio::time::sleep(PEER_POLL).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Receive one message and return its first frame.
pub async fn recv_frame<S: SocketRecv + Send>(socket: &mut S, label: &str) -> Result<Vec<u8>> {
    let msg = socket.recv().await?;
    msg.get(0)
        .map(|frame| frame.to_vec())
        .ok_or_else(|| Error::EmptyMessage(label.to_string()))
}
