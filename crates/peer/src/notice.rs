//! Meldungen einer Peer-Verbindung an die Session

use huddle_core::ParticipantId;

use crate::engine::RemoteTrack;
use crate::state::PeerState;

/// Meldung einer Peer-Verbindung
///
/// Traegt die Generation, damit die Session veraltete Meldungen einer
/// frueheren Verbindung zum selben Remote erkennt.
#[derive(Debug, Clone)]
pub struct PeerNotice {
    pub remote: ParticipantId,
    pub generation: u64,
    pub kind: PeerNoticeKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerNoticeKind {
    StateChanged(PeerState),
    /// Erstmals gesehener Remote-Track
    RemoteTrack(RemoteTrack),
    /// Zustellung an den Remote nach allen Wiederholungen gescheitert
    DeliveryFailed(String),
    /// Verhandlungs- oder Engine-Fehler; die Verbindung wird geschlossen
    Failed(String),
    /// Letzte Meldung der Verbindung
    Closed,
}
