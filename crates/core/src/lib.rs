//! huddle-core – Gemeinsame Typen und Fehlertypen
//!
//! Dieses Crate stellt die Bausteine bereit, die von allen anderen
//! Huddle-Crates gemeinsam genutzt werden: Identifikationstypen fuer Raeume,
//! Teilnehmer, Beitritte und Tracks sowie den zentralen Fehler-Enum.

pub mod error;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use error::{HuddleError, Result};
pub use types::{ParticipantId, RoomId, SessionId, TrackId};
