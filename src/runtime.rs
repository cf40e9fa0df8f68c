//! Per-connection runtime
//!
//! Each connection owns one event loop task that applies transport events to
//! its record in arrival order, plus one relay worker that routes inbound
//! messages without holding up status changes.

mod executor;
mod handle;

#[cfg(test)]
pub mod testing;

pub use handle::Connection;

use crate::transport::SentMessage;

/// A message accepted by the network, with the chat it went to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub chat_id: String,
    pub message: SentMessage,
}
