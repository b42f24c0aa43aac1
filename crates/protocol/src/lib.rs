//! huddle-protocol – Signalisierungs-Protokoll
//!
//! Dieses Crate definiert alle Nachrichten, die ueber das Relay zwischen
//! Teilnehmern eines Raums ausgetauscht werden. Medien laufen nie ueber das
//! Relay, nur die Verbindungs-Metadaten.
//!
//! ## Module
//! - [`signal`] – Offer, Answer und ICE-Candidates
//! - [`presence`] – Join/Leave-Ereignisse eines Raums
//! - [`wire`] – JSON-Dokumente wie sie im Relay abgelegt werden

pub mod error;
pub mod presence;
pub mod signal;
pub mod wire;

pub use error::{ProtocolError, ProtocolResult};
pub use presence::{PresenceEvent, PresenceKind};
pub use signal::{IceCandidate, SdpType, SessionDescription, SignalingMessage};
pub use wire::SignalDocument;
