//! Adapter error type (spec §4.2, §7 TransportError).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AdapterError {
    #[error("start_event_ingestion called more than once")]
    AlreadyStarted,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode inbound payload: {0}")]
    Decode(String),
}
