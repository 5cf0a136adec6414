//! Card transport abstraction
//!
//! The secure-channel engine is transport-agnostic: anything that can carry
//! a short command APDU to a card and bring back `body ‖ SW1 ‖ SW2` can back
//! a [`GlobalPlatform`](crate::GlobalPlatform) instance. Concrete transports
//! (PC/SC readers, emulator sockets) live outside this crate.

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// Transport-level errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// The command could not be transmitted or no response arrived
    #[error("transmission failed")]
    Transmission,

    /// The underlying device or connection is gone
    #[error("device error: {0}")]
    Device(String),
}

/// A channel to a card
///
/// The channel is assumed reliable and in-order; a returned response always
/// contains at least the two status bytes. Implementations only provide
/// [`CardTransport::do_transmit_raw`]; callers go through
/// [`CardTransport::transmit_raw`], which adds tracing.
pub trait CardTransport {
    /// Transmit a raw command APDU and return the raw response
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError>;

    /// Whether the transport still has a card present
    fn is_connected(&self) -> bool;

    /// Transmit with tracing
    fn transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        trace!(command = %hex::encode(command), "transmitting APDU");
        let response = self.do_transmit_raw(command)?;
        trace!(response = %hex::encode(&response), "received APDU response");
        Ok(response)
    }
}

impl<T: CardTransport + ?Sized> CardTransport for &mut T {
    fn do_transmit_raw(&mut self, command: &[u8]) -> Result<Bytes, TransportError> {
        (**self).do_transmit_raw(command)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}
