mod smtp;

use crate::render::OutboundMessage;
use async_trait::async_trait;
pub use smtp::SmtpSession;

/// Every way a delivery attempt can fail, as seen by the send loop. The loop
/// matches on this exhaustively; adding a variant forces the classification
/// table to be revisited.
#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("authentication rejected by relay: {0}")]
    AuthFailure(String),
    #[error("sender account rejected by relay: {0}")]
    SenderRejected(String),
    #[error("relay quota or rate limit exceeded: {0}")]
    QuotaExceeded(String),
    #[error("connection to relay lost: {0}")]
    TransientDisconnect(String),
    #[error("delivery failed: {0}")]
    Other(String),
}

/// One authenticated connection to the outbound mail relay. Exclusively owned
/// by the send loop for the duration of a run.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), SendError>;
    async fn send_one(&mut self, message: &OutboundMessage) -> Result<(), SendError>;
    async fn disconnect(&mut self);
}
