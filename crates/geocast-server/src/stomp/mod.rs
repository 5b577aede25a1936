//! STOMP 1.2 subset spoken on the `/ws` endpoint.
//!
//! Clients `CONNECT`, `SUBSCRIBE` to `/topic/...` destinations and `SEND`
//! to `/app/...` destinations. The server answers with `CONNECTED`,
//! `MESSAGE`, `RECEIPT` and `ERROR` frames.

pub mod frame;

pub use frame::{Command, Frame, FrameError, decode};
