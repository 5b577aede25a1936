//! Inbound application events and their STOMP destinations.

use geocast_core::PositionReport;
use geocast_core::constants::{
    MESSAGE_DESTINATION, REGISTER_CLIENT_DESTINATION, SEND_LOCATION_DESTINATION,
    SYNC_LOCATIONS_DESTINATION,
};
use thiserror::Error;

/// Why a `SEND` could not be turned into an [`InboundEvent`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// No handler is mapped to the destination.
    #[error("no handler for destination {0}")]
    UnknownDestination(String),
    /// The body is not a valid payload for the destination.
    #[error("malformed payload for {destination}: {reason}")]
    MalformedPayload {
        /// Destination the payload was sent to.
        destination: String,
        /// Parser message.
        reason: String,
    },
}

/// An event a connected client can trigger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundEvent {
    /// A fresh position to persist and rebroadcast.
    ReportLocation(PositionReport),
    /// Persist a position, then rebroadcast every known client's latest one.
    SyncAll(PositionReport),
    /// Rebroadcast every known client's latest position.
    RegisterClient,
    /// Free text for the server log.
    DebugMessage(String),
}

impl InboundEvent {
    /// Map a `SEND` destination and body to an event.
    pub fn from_send(destination: &str, body: &str) -> Result<Self, DispatchError> {
        match destination {
            SEND_LOCATION_DESTINATION => parse_report(destination, body).map(Self::ReportLocation),
            SYNC_LOCATIONS_DESTINATION => parse_report(destination, body).map(Self::SyncAll),
            REGISTER_CLIENT_DESTINATION => Ok(Self::RegisterClient),
            MESSAGE_DESTINATION => Ok(Self::DebugMessage(body.to_string())),
            other => Err(DispatchError::UnknownDestination(other.to_string())),
        }
    }

    /// Metric and log label.
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReportLocation(_) => "report_location",
            Self::SyncAll(_) => "sync_all",
            Self::RegisterClient => "register_client",
            Self::DebugMessage(_) => "debug_message",
        }
    }
}

fn parse_report(destination: &str, body: &str) -> Result<PositionReport, DispatchError> {
    serde_json::from_str(body).map_err(|e| DispatchError::MalformedPayload {
        destination: destination.to_string(),
        reason: e.to_string(),
    })
}
