//! huddle-signaling – Signalisierungs-Kanal eines Raums
//!
//! Dieser Crate kapselt den Austausch von Presence und Verbindungs-Metadaten
//! (SDP, ICE-Candidates) ueber ein Relay. Medien laufen nie ueber das Relay.
//!
//! ## Architektur
//!
//! ```text
//! RoomSession / PeerActor
//!     |
//!     v
//! SignalingChannel (Trait, ein Raum + ein lokaler Teilnehmer)
//!     |
//!     +-- RelayChannel<R>   Presence-Filter, Retry mit Backoff, close()
//!             |
//!             v
//!         Relay (Trait, Dokumenten-Store)
//!             |
//!             +-- MemoryRelay   In-Process (Demo, Tests)
//! ```

pub mod channel;
pub mod error;
pub mod memory;
pub mod relay;
pub mod retry;

// Bequeme Re-Exporte
pub use channel::{InboundMessage, MessageStream, RelayChannel, RetryHook, SignalingChannel};
pub use error::{SignalingError, SignalingResult};
pub use memory::MemoryRelay;
pub use relay::{DocumentStream, PresenceStream, Relay};
pub use retry::RetryPolicy;
