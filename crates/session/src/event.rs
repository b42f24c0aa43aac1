//! Ereignisse einer Raum-Session fuer die Darstellungsschicht

use huddle_core::ParticipantId;
use huddle_peer::{PeerState, RemoteTrack};

/// Ereignis, das die Session ueber `SessionHandle::events()` verteilt
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Neuer Remote-Track; hoechstens einmal pro (Remote, Track)
    RemoteTrackAvailable {
        remote: ParticipantId,
        track: RemoteTrack,
    },
    PeerStateChanged {
        remote: ParticipantId,
        generation: u64,
        state: PeerState,
    },
    PeerClosed {
        remote: ParticipantId,
        generation: u64,
    },
    /// Verhandlungsfehler; nur diese eine Verbindung ist betroffen
    PeerFailed {
        remote: ParticipantId,
        generation: u64,
        grund: String,
    },
    /// Nachricht an `remote` endgueltig nicht zustellbar
    DeliveryFailed {
        remote: ParticipantId,
        grund: String,
    },
    /// Letztes Ereignis der Session
    Terminated,
}

/// Momentaufnahme einer Peer-Verbindung
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub remote: ParticipantId,
    pub generation: u64,
    pub state: PeerState,
}
