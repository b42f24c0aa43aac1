//! Fehlertypen fuer die Raum-Session

use huddle_core::{HuddleError, ParticipantId};
use huddle_media::MediaError;
use huddle_peer::PeerError;
use huddle_signaling::SignalingError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    /// Lokale Medien konnten nicht angefordert werden (fatal, kein neuer Versuch)
    #[error("Medienzugriff fehlgeschlagen: {0}")]
    Medien(MediaError),

    /// Presence oder Abonnements konnten nicht eingerichtet werden
    #[error("Signalisierung fehlgeschlagen: {0}")]
    Signalisierung(String),

    /// Zweiter Verbindungsversuch zum selben Remote (der neuere wird verworfen)
    #[error("Doppelter Verbindungsversuch zu {0}")]
    DoppelteVerbindung(ParticipantId),

    #[error("Peer-Verbindung: {0}")]
    Peer(#[from] PeerError),

    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    /// Session wurde beendet (z.B. `hangup()` waehrend des Beitritts)
    #[error("Session beendet")]
    Beendet,
}

impl From<SignalingError> for SessionError {
    fn from(e: SignalingError) -> Self {
        Self::Signalisierung(e.to_string())
    }
}

impl From<SessionError> for HuddleError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::Medien(m) => m.into(),
            SessionError::Signalisierung(msg) => HuddleError::Signalisierung(msg),
            SessionError::DoppelteVerbindung(remote) => HuddleError::DoppelteVerbindung(remote.to_string()),
            SessionError::Peer(p) => p.into(),
            SessionError::Konfiguration(msg) => HuddleError::Konfiguration(msg),
            SessionError::Beendet => HuddleError::SessionBeendet,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
