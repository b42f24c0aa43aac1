//! Demo-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass die Demo ohne Konfigurationsdatei
//! lauffaehig ist.

use anyhow::{bail, Result};
use huddle_media::MediaConstraints;
use huddle_observability::logging::{log_format_gueltig, log_level_gueltig};
use huddle_peer::{ConnectivityConfig, STANDARD_AUSGANG_KAPAZITAET};
use huddle_session::{SessionConfig, STANDARD_EVENT_KAPAZITAET};
use huddle_signaling::RetryPolicy;
use serde::{Deserialize, Serialize};

/// Vollstaendige Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Raum und simulierte Teilnehmer
    pub raum: RaumEinstellungen,
    /// Angeforderte lokale Medien (fuer alle Teilnehmer gleich)
    pub medien: MediaConstraints,
    /// ICE-Server und Candidate-Pool
    pub konnektivitaet: ConnectivityConfig,
    /// Wiederholungen und Warteschlangen der Signalisierung
    pub signalisierung: SignalisierungEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

/// Raum-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaumEinstellungen {
    /// Raum-ID
    pub id: String,
    /// IDs der simulierten Teilnehmer (Beitritt in dieser Reihenfolge)
    pub teilnehmer: Vec<String>,
    /// Wie lange auf das vollstaendige Netz gewartet wird
    pub laufzeit_ms: u64,
}

impl Default for RaumEinstellungen {
    fn default() -> Self {
        Self {
            id: "lobby".into(),
            teilnehmer: vec!["alice".into(), "bob".into(), "carol".into()],
            laufzeit_ms: 5_000,
        }
    }
}

/// Signalisierungs-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalisierungEinstellungen {
    /// Backoff fuer voruebergehende Relay-Fehler
    pub retry: RetryPolicy,
    /// Ausgehende Warteschlange pro Remote
    pub ausgang_kapazitaet: usize,
    /// Puffer fuer Session-Ereignisse
    pub event_kapazitaet: usize,
}

impl Default for SignalisierungEinstellungen {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            ausgang_kapazitaet: STANDARD_AUSGANG_KAPAZITAET,
            event_kapazitaet: STANDARD_EVENT_KAPAZITAET,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl AppConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => {
                let config: Self = toml::from_str(&inhalt)
                    .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?;
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Ok(Self::default())
            }
            Err(e) => Err(anyhow::anyhow!(
                "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
            )),
        }
    }

    /// Prueft die Werte, die erst zur Laufzeit auffallen wuerden
    pub fn validieren(&self) -> Result<()> {
        if self.raum.id.trim().is_empty() {
            bail!("raum.id darf nicht leer sein");
        }
        if self.raum.teilnehmer.len() < 2 {
            bail!("raum.teilnehmer braucht mindestens zwei Eintraege");
        }
        let mut gesehen = std::collections::HashSet::new();
        for id in &self.raum.teilnehmer {
            if !gesehen.insert(id) {
                bail!("Teilnehmer '{id}' ist doppelt eingetragen");
            }
        }
        if self.signalisierung.retry.max_versuche == 0 {
            bail!("signalisierung.retry.max_versuche muss groesser als 0 sein");
        }
        if !log_level_gueltig(&self.logging.level) {
            bail!("Unbekanntes Log-Level '{}'", self.logging.level);
        }
        if !log_format_gueltig(&self.logging.format) {
            bail!("Unbekanntes Log-Format '{}'", self.logging.format);
        }
        self.session_config().validieren()?;
        Ok(())
    }

    /// Session-Konfiguration fuer jeden simulierten Teilnehmer
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            medien: self.medien,
            konnektivitaet: self.konnektivitaet.clone(),
            ausgang_kapazitaet: self.signalisierung.ausgang_kapazitaet,
            event_kapazitaet: self.signalisierung.event_kapazitaet,
        }
    }
}
