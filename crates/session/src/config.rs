//! Konfiguration einer Raum-Session

use huddle_media::MediaConstraints;
use huddle_peer::{ConnectivityConfig, STANDARD_AUSGANG_KAPAZITAET};
use serde::{Deserialize, Serialize};

use crate::error::{SessionError, SessionResult};

/// Groesse des Broadcast-Kanals fuer Session-Events
pub const STANDARD_EVENT_KAPAZITAET: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Welche lokalen Medien angefordert werden
    pub medien: MediaConstraints,
    /// ICE-Server und Candidate-Pool fuer jede Peer-Verbindung
    pub konnektivitaet: ConnectivityConfig,
    /// Ausgehende Warteschlange pro Remote
    pub ausgang_kapazitaet: usize,
    /// Puffer fuer `SessionHandle::events()`
    pub event_kapazitaet: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            medien: MediaConstraints::default(),
            konnektivitaet: ConnectivityConfig::default(),
            ausgang_kapazitaet: STANDARD_AUSGANG_KAPAZITAET,
            event_kapazitaet: STANDARD_EVENT_KAPAZITAET,
        }
    }
}

impl SessionConfig {
    pub fn validieren(&self) -> SessionResult<()> {
        self.konnektivitaet.validieren()?;
        if self.ausgang_kapazitaet == 0 {
            return Err(SessionError::Konfiguration(
                "ausgang_kapazitaet muss groesser als 0 sein".into(),
            ));
        }
        if self.event_kapazitaet == 0 {
            return Err(SessionError::Konfiguration(
                "event_kapazitaet muss groesser als 0 sein".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_ist_gueltig() {
        assert!(SessionConfig::default().validieren().is_ok());
    }

    #[test]
    fn ungueltige_konnektivitaet_wird_gemeldet() {
        let mut config = SessionConfig::default();
        config.konnektivitaet.ice_candidate_pool_size = 0;
        assert!(matches!(config.validieren(), Err(SessionError::Peer(_))));
    }

    #[test]
    fn leere_warteschlangen_sind_ungueltig() {
        let config = SessionConfig {
            ausgang_kapazitaet: 0,
            ..Default::default()
        };
        assert!(matches!(config.validieren(), Err(SessionError::Konfiguration(_))));
    }
}
