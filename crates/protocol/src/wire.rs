//! Relay-Dokumente
//!
//! Das Relay speichert pro (Raum, Empfaenger) eine append-only Liste von
//! Dokumenten. Jedes Dokument traegt Absender, Empfaenger, eine vom Relay
//! vergebene Sequenznummer und die eigentliche Nachricht. `to_session` nennt
//! den Beitritt des Empfaengers, an den sich das Dokument richtet; es fehlt,
//! wenn der Empfaenger beim Senden noch nicht im Raum war.
//!
//! ```text
//! {
//!   "from": "alice",
//!   "to": "bob",
//!   "to_session": "9f1c2a...",
//!   "seq": 3,
//!   "sent_at": "2024-05-01T12:00:00Z",
//!   "message": { "kind": "offer", "type": "offer", "sdp": "v=0..." }
//! }
//! ```

use chrono::{DateTime, Utc};
use huddle_core::{ParticipantId, SessionId};
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::signal::SignalingMessage;

/// Maximale Dokumentgroesse in Bytes (SDPs mit vielen m-Zeilen bleiben deutlich darunter)
pub const MAX_DOKUMENT_GROESSE: usize = 64 * 1024;

/// Ein Eintrag in der Nachrichtenliste eines Empfaengers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalDocument {
    /// Absender
    pub from: ParticipantId,
    /// Empfaenger
    pub to: ParticipantId,
    /// Beitritt des Empfaengers, fuer den das Dokument bestimmt ist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_session: Option<SessionId>,
    /// Position in der Liste des Empfaengers (vom Relay vergeben, 0 = noch nicht abgelegt)
    #[serde(default)]
    pub seq: u64,
    /// Zeitpunkt der Erstellung beim Absender
    pub sent_at: DateTime<Utc>,
    /// Nutzlast
    pub message: SignalingMessage,
}

impl SignalDocument {
    /// Erstellt ein neues, noch nicht abgelegtes Dokument
    pub fn neu(from: ParticipantId, to: ParticipantId, message: SignalingMessage) -> Self {
        Self {
            from,
            to,
            to_session: None,
            seq: 0,
            sent_at: Utc::now(),
            message,
        }
    }

    /// Adressiert das Dokument an einen bestimmten Beitritt des Empfaengers
    pub fn an_sitzung(mut self, sitzung: Option<SessionId>) -> Self {
        self.to_session = sitzung;
        self
    }

    /// `false` wenn das Dokument an einen anderen Beitritt als `sitzung` ging
    pub fn gilt_fuer(&self, sitzung: &SessionId) -> bool {
        self.to_session.as_ref().map_or(true, |ziel| ziel == sitzung)
    }

    /// Serialisiert das Dokument als JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        let json = serde_json::to_string(self)?;
        if json.len() > MAX_DOKUMENT_GROESSE {
            return Err(ProtocolError::ungueltig(format!(
                "Dokument zu gross: {} Bytes (max {})",
                json.len(),
                MAX_DOKUMENT_GROESSE
            )));
        }
        Ok(json)
    }

    /// Liest und validiert ein Dokument aus JSON
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        if json.len() > MAX_DOKUMENT_GROESSE {
            return Err(ProtocolError::ungueltig("Dokument zu gross"));
        }
        let doc: Self = serde_json::from_str(json)?;
        doc.validieren()?;
        Ok(doc)
    }

    /// Prueft Absender/Empfaenger und Nutzlast
    pub fn validieren(&self) -> ProtocolResult<()> {
        if self.from.as_str().is_empty() || self.to.as_str().is_empty() {
            return Err(ProtocolError::ungueltig("leerer Absender oder Empfaenger"));
        }
        if self.from == self.to {
            return Err(ProtocolError::ungueltig("Nachricht an sich selbst"));
        }
        self.message.validieren()
    }
}
