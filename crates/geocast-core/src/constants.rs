//! Package-level and protocol constants.

/// Current version of geocast (sourced from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Package name.
pub const NAME: &str = "geocast";

/// Topic every position broadcast is published on.
pub const LOCATIONS_TOPIC: &str = "/topic/locations";

/// Prefix shared by all inbound application destinations.
pub const APP_DESTINATION_PREFIX: &str = "/app";

/// Prefix shared by all broker topics clients may subscribe to.
pub const TOPIC_PREFIX: &str = "/topic";

/// Destination for a fresh position report.
pub const SEND_LOCATION_DESTINATION: &str = "/app/sendLocation";

/// Destination for a report that also asks for a full resync.
pub const SYNC_LOCATIONS_DESTINATION: &str = "/app/syncLocations";

/// Destination a newly joined client uses to request a state snapshot.
pub const REGISTER_CLIENT_DESTINATION: &str = "/app/registerClient";

/// Destination for free-text debug messages.
pub const MESSAGE_DESTINATION: &str = "/app/message";
