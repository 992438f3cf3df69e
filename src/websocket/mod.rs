//! WebSocket transport and feed session

mod client;
mod session;

pub use client::FeedClient;
pub use session::{FeedSession, SessionCommand, SessionHandle, SessionState};
