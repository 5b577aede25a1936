//! STOMP frame handling for one connection.
//!
//! Replies (CONNECTED, RECEIPT, ERROR) go through the connection's outbound
//! queue, so they are ordered with the MESSAGE frames the same connection
//! receives from the broker.

use geocast_core::constants::{NAME, TOPIC_PREFIX, VERSION};
use metrics::counter;
use tracing::{debug, instrument, warn};

use super::broadcast::{SubscribeResult, TopicBroker};
use super::connection::ClientConnection;
use crate::metrics::STOMP_ERRORS_TOTAL;
use crate::realtime::{Dispatcher, InboundEvent};
use crate::stomp::{Command, Frame, decode};

/// What the session loop should do after a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameAction {
    /// Keep reading.
    Continue,
    /// Flush queued frames and close the socket.
    Close,
}

/// Everything a frame handler needs besides the connection.
pub struct FrameContext<'a> {
    /// Event dispatcher.
    pub dispatcher: &'a Dispatcher,
    /// Topic broker the connection is attached to.
    pub broker: &'a TopicBroker,
}

/// Decode one transport message and handle each frame in it.
pub async fn handle_message(
    bytes: &[u8],
    connection: &ClientConnection,
    ctx: &FrameContext<'_>,
) -> FrameAction {
    let frames = match decode(bytes) {
        Ok(frames) => frames,
        Err(e) => {
            reject(connection, "malformed frame", &e.to_string(), None, "malformed_frame");
            return FrameAction::Close;
        }
    };
    for frame in frames {
        if handle_frame(frame, connection, ctx).await == FrameAction::Close {
            return FrameAction::Close;
        }
    }
    FrameAction::Continue
}

/// Handle a single decoded frame.
#[instrument(skip_all, fields(conn_id = %connection.id, command = %frame.command))]
pub async fn handle_frame(
    frame: Frame,
    connection: &ClientConnection,
    ctx: &FrameContext<'_>,
) -> FrameAction {
    let receipt = frame.header("receipt").map(str::to_owned);
    let receipt = receipt.as_deref();

    match frame.command {
        Command::Connect | Command::Stomp => return handle_connect(&frame, connection),
        _ if !connection.is_stomp_connected() => {
            reject(
                connection,
                "not connected",
                "CONNECT must be the first frame",
                receipt,
                "not_connected",
            );
            return FrameAction::Close;
        }
        Command::Subscribe => {
            if !handle_subscribe(&frame, connection, ctx.broker, receipt).await {
                return FrameAction::Continue;
            }
        }
        Command::Unsubscribe => {
            let Some(id) = frame.header("id") else {
                reject(connection, "missing id header", "UNSUBSCRIBE requires an id", receipt, "missing_header");
                return FrameAction::Continue;
            };
            if !ctx.broker.unsubscribe(&connection.id, id).await {
                debug!(subscription_id = id, "unsubscribe for unknown subscription");
            }
        }
        Command::Send => {
            if !handle_send(&frame, connection, ctx.dispatcher, receipt).await {
                return FrameAction::Continue;
            }
        }
        Command::Disconnect => {
            debug!("client disconnect");
            send_receipt(connection, receipt);
            return FrameAction::Close;
        }
        Command::Ack | Command::Nack | Command::Begin | Command::Commit | Command::Abort => {
            let details = format!("{} is not supported by this server", frame.command);
            reject(connection, "unsupported command", &details, receipt, "unsupported");
            return FrameAction::Continue;
        }
        Command::Connected | Command::Message | Command::Receipt | Command::Error => {
            let details = format!("{} is a server frame", frame.command);
            reject(connection, "unexpected frame", &details, receipt, "unexpected");
            return FrameAction::Close;
        }
    }

    send_receipt(connection, receipt);
    FrameAction::Continue
}

fn handle_connect(frame: &Frame, connection: &ClientConnection) -> FrameAction {
    let supports_12 = frame
        .header("accept-version")
        .is_none_or(|versions| versions.split(',').any(|v| v.trim() == "1.2"));
    if !supports_12 {
        reject(
            connection,
            "unsupported protocol version",
            "this server speaks STOMP 1.2 only",
            None,
            "version",
        );
        return FrameAction::Close;
    }
    if !connection.mark_stomp_connected() {
        reject(connection, "already connected", "CONNECT sent twice", None, "duplicate_connect");
        return FrameAction::Close;
    }
    let server = format!("{NAME}/{VERSION}");
    let _ = connection.send_frame(&Frame::connected(&server));
    debug!("stomp session established");
    FrameAction::Continue
}

/// Returns `true` when the subscription was created.
async fn handle_subscribe(
    frame: &Frame,
    connection: &ClientConnection,
    broker: &TopicBroker,
    receipt: Option<&str>,
) -> bool {
    let (Some(id), Some(destination)) = (frame.header("id"), frame.header("destination")) else {
        reject(
            connection,
            "missing header",
            "SUBSCRIBE requires id and destination",
            receipt,
            "missing_header",
        );
        return false;
    };
    if !is_topic(destination) {
        let details = format!("cannot subscribe to {destination}");
        reject(connection, "unknown destination", &details, receipt, "unknown_destination");
        return false;
    }
    match broker.subscribe(&connection.id, id, destination).await {
        SubscribeResult::Subscribed => true,
        SubscribeResult::DuplicateId => {
            let details = format!("subscription id {id} is already in use");
            reject(connection, "duplicate subscription", &details, receipt, "duplicate_subscription");
            false
        }
        SubscribeResult::UnknownConnection => {
            warn!("subscribe from a connection the broker does not know");
            reject(connection, "not connected", "connection is closing", receipt, "not_connected");
            false
        }
    }
}

/// Returns `true` when the frame was dispatched.
async fn handle_send(
    frame: &Frame,
    connection: &ClientConnection,
    dispatcher: &Dispatcher,
    receipt: Option<&str>,
) -> bool {
    let Some(destination) = frame.header("destination") else {
        reject(connection, "missing header", "SEND requires a destination", receipt, "missing_header");
        return false;
    };
    match InboundEvent::from_send(destination, &frame.body) {
        Ok(event) => {
            let _ = dispatcher.dispatch(event).await;
            true
        }
        Err(e) => {
            reject(connection, "rejected", &e.to_string(), receipt, "dispatch");
            false
        }
    }
}

fn is_topic(destination: &str) -> bool {
    destination
        .strip_prefix(TOPIC_PREFIX)
        .is_some_and(|rest| rest.len() > 1 && rest.starts_with('/'))
}

fn send_receipt(connection: &ClientConnection, receipt: Option<&str>) {
    if let Some(id) = receipt {
        let _ = connection.send_frame(&Frame::receipt(id));
    }
}

fn reject(
    connection: &ClientConnection,
    message: &str,
    details: &str,
    receipt: Option<&str>,
    reason: &'static str,
) {
    warn!(reason, details, "rejecting client frame");
    counter!(STOMP_ERRORS_TOTAL, "reason" => reason).increment(1);
    let _ = connection.send_frame(&Frame::error(message, details, receipt));
}
