//! Fehlertypen fuer Huddle
//!
//! Zentraler Fehler-Enum ueber alle Schichten. Die Crates definieren eigene
//! Fehler (`MediaError`, `SignalingError`, `PeerError`, `SessionError`) und
//! konvertieren an der Grenze in diesen Typ.

use thiserror::Error;

/// Globaler Result-Alias fuer Huddle
pub type Result<T> = std::result::Result<T, HuddleError>;

/// Alle moeglichen Fehler im Huddle-System
#[derive(Debug, Error)]
pub enum HuddleError {
    // --- Medien ---
    /// Kamera/Mikrofon nicht verfuegbar oder verweigert (fatal fuer die Session)
    #[error("Medienzugriff fehlgeschlagen: {0}")]
    Medien(String),

    // --- Signalisierung ---
    /// Zustellung ueber das Relay endgueltig fehlgeschlagen
    #[error("Signalisierung fehlgeschlagen: {0}")]
    Signalisierung(String),

    /// Relay voruebergehend nicht erreichbar
    #[error("Relay nicht erreichbar: {0}")]
    RelayNichtErreichbar(String),

    // --- Verhandlung ---
    /// Ungueltige oder unerwartete Session-Description, ICE-Fehler
    #[error("Verhandlung fehlgeschlagen ({remote}): {grund}")]
    Verhandlung { remote: String, grund: String },

    /// Zweite Verbindung zum selben Teilnehmer (wird verworfen)
    #[error("Doppelter Verbindungsversuch zu {0}")]
    DoppelteVerbindung(String),

    // --- Protokoll ---
    #[error("Ungueltige Nachricht: {0}")]
    UngueltigeNachricht(String),

    // --- Konfiguration ---
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    // --- Session ---
    /// Session wurde bereits beendet
    #[error("Session beendet")]
    SessionBeendet,

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl HuddleError {
    /// Gibt true zurueck wenn der Fehler wiederholbar sein koennte
    pub fn ist_wiederholbar(&self) -> bool {
        matches!(self, Self::RelayNichtErreichbar(_))
    }
}
