//! Fehlertypen fuer den Signalisierungs-Kanal

use huddle_core::{HuddleError, ParticipantId};
use huddle_protocol::ProtocolError;
use thiserror::Error;

/// Fehlertyp fuer Relay und Signalisierungs-Kanal
#[derive(Debug, Error)]
pub enum SignalingError {
    /// Relay voruebergehend nicht erreichbar (wird wiederholt)
    #[error("Relay-Fehler: {0}")]
    Relay(String),

    /// Zustellung nach allen Wiederholungen fehlgeschlagen
    #[error("Zustellung an {an} nach {versuche} Versuchen fehlgeschlagen: {grund}")]
    Zustellung {
        an: ParticipantId,
        versuche: u32,
        grund: String,
    },

    /// Kanal wurde geschlossen
    #[error("Signalisierungs-Kanal geschlossen")]
    Geschlossen,

    /// Dokument konnte nicht kodiert/dekodiert werden
    #[error("Protokollfehler: {0}")]
    Protokoll(#[from] ProtocolError),
}

impl SignalingError {
    /// Erstellt einen voruebergehenden Relay-Fehler
    pub fn relay(msg: impl Into<String>) -> Self {
        Self::Relay(msg.into())
    }

    /// Lohnt sich ein erneuter Versuch?
    pub fn ist_voruebergehend(&self) -> bool {
        matches!(self, Self::Relay(_))
    }
}

impl From<SignalingError> for HuddleError {
    fn from(e: SignalingError) -> Self {
        match e {
            SignalingError::Relay(msg) => HuddleError::RelayNichtErreichbar(msg),
            SignalingError::Protokoll(p) => p.into(),
            andere => HuddleError::Signalisierung(andere.to_string()),
        }
    }
}

/// Result-Typ fuer den Signalisierungs-Kanal
pub type SignalingResult<T> = Result<T, SignalingError>;
