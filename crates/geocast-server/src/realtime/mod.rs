//! The realtime core: session registry, inbound events, the dispatcher and
//! the publisher seam it fans out through.

pub mod dispatcher;
pub mod events;
pub mod publisher;
pub mod registry;

pub use dispatcher::{DispatchOutcome, Dispatcher, DispatcherOptions};
pub use events::{DispatchError, InboundEvent};
pub use publisher::Publisher;
pub use registry::SessionRegistry;
