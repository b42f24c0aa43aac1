//! Fehlertypen fuer Peer-Verbindungen

use huddle_core::{HuddleError, ParticipantId};
use thiserror::Error;

/// Fehlertyp fuer eine einzelne Peer-Verbindung
///
/// Ein Fehler betrifft immer nur die eine Verbindung; die Session und
/// andere Peers laufen weiter.
#[derive(Debug, Error)]
pub enum PeerError {
    /// Verbindung sollte entstehen, bevor die lokalen Medien bereit sind
    #[error("Lokale Medien nicht bereit (Zustand: {0})")]
    MedienNichtBereit(&'static str),

    /// Unerwartete oder ungueltige Session-Description, Engine-Fehler waehrend der Verhandlung
    #[error("Verhandlung mit {remote} fehlgeschlagen: {grund}")]
    Verhandlung { remote: ParticipantId, grund: String },

    /// Die RTC-Engine konnte keine Verbindung oeffnen
    #[error("RTC-Engine: {0}")]
    Engine(String),

    #[error("Ungueltige Konnektivitaets-Konfiguration: {0}")]
    Konfiguration(String),

    #[error("Peer-Verbindung bereits geschlossen")]
    Geschlossen,
}

impl PeerError {
    /// Erstellt einen Verhandlungsfehler
    pub fn verhandlung(remote: &ParticipantId, grund: impl Into<String>) -> Self {
        Self::Verhandlung {
            remote: remote.clone(),
            grund: grund.into(),
        }
    }
}

impl From<PeerError> for HuddleError {
    fn from(e: PeerError) -> Self {
        match e {
            PeerError::MedienNichtBereit(_) => HuddleError::Medien(e.to_string()),
            PeerError::Verhandlung { remote, grund } => HuddleError::Verhandlung {
                remote: remote.to_string(),
                grund,
            },
            PeerError::Konfiguration(msg) => HuddleError::Konfiguration(msg),
            andere => HuddleError::Intern(andere.to_string()),
        }
    }
}

/// Result-Typ fuer Peer-Verbindungen
pub type PeerResult<T> = Result<T, PeerError>;
