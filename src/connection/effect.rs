//! Effects produced by state transitions

use super::event::InboundMessage;

/// Effects to be executed by the runtime after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Render the QR payload to an image in the background
    RenderQr { payload: String },

    /// Ask the transport for account details
    FetchSessionInfo,

    /// Hand an inbound message to the relay worker
    RouteMessage(InboundMessage),
}
