//! GlobalPlatform host-side card management
//!
//! This crate implements the host end of the GlobalPlatform 2.1.1 card
//! management protocols for ISO/IEC 7816-4 smart cards: the SCP01 and
//! SCP02 secure channel protocols (mutual authentication, session-key
//! derivation, per-APDU MAC chaining and encryption, response MACs), the
//! VISA2 and EMV static-key diversifications, and the privileged
//! administrative commands (LOAD, INSTALL, DELETE, GET STATUS).
//!
//! The main entry point is the [`GlobalPlatform`] struct, generic over a
//! [`CardTransport`] that carries raw APDUs to a card. Typical use:
//! select the Security Domain, configure static keys, open a secure
//! channel, then issue card-management operations:
//!
//! ```no_run
//! # fn example<T: globalplatform_host::CardTransport>(transport: T)
//! #     -> globalplatform_host::Result<()> {
//! use globalplatform_host::GlobalPlatform;
//!
//! let mut gp = GlobalPlatform::new(transport);
//! gp.open_with_default_keys()?;
//! let registry = gp.get_status()?;
//! for entry in registry.entries() {
//!     println!("{} {:02X}", entry.aid, entry.lifecycle);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! CAP-file parsing, concrete transports and interactive tooling are out
//! of scope; callers bring load-file bytes and a transport.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aid;
pub mod command;
pub mod commands;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod host;
pub mod keys;
pub mod load;
pub mod registry;
pub mod response;
pub mod scp;
pub mod secure_channel;
pub mod session;
pub mod transport;

// Re-exports
pub use aid::Aid;
pub use command::Command;
pub use error::{Error, Result};
pub use host::{ApduListener, GlobalPlatform};
pub use keys::{Diversification, KeySet, KeyType, SessionKeys};
pub use load::LoadCommandStream;
pub use registry::{AidRegistry, EntryKind, RegistryEntry};
pub use response::{Response, StatusWord};
pub use scp::{ScpParams, ScpVariant};
pub use secure_channel::{SecureChannelWrapper, SecurityLevel};
pub use session::Session;
pub use transport::{CardTransport, TransportError};
