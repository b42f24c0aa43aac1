//! Fehlertypen fuer das Signalisierungs-Protokoll

use huddle_core::HuddleError;
use thiserror::Error;

/// Fehler beim Kodieren oder Dekodieren von Relay-Dokumenten
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// JSON konnte nicht gelesen oder geschrieben werden
    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    /// Dokument ist syntaktisch korrekt, aber inhaltlich ungueltig
    #[error("Ungueltiges Dokument: {0}")]
    Ungueltig(String),
}

impl ProtocolError {
    /// Erstellt einen Validierungsfehler
    pub fn ungueltig(msg: impl Into<String>) -> Self {
        Self::Ungueltig(msg.into())
    }
}

impl From<ProtocolError> for HuddleError {
    fn from(e: ProtocolError) -> Self {
        HuddleError::UngueltigeNachricht(e.to_string())
    }
}

/// Result-Typ fuer das Protokoll
pub type ProtocolResult<T> = Result<T, ProtocolError>;
