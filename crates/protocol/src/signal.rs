//! Signalisierungs-Nachrichten (Offer/Answer/Candidate)
//!
//! Die Feldnamen entsprechen dem, was Browser-Implementierungen als JSON
//! liefern (`sdp`/`type`, `candidate`/`sdpMLineIndex`/`sdpMid`/
//! `usernameFragment`), damit
//! Dokumente im Relay ohne Umwandlung gelesen werden koennen.

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};

// ---------------------------------------------------------------------------
// Session-Description
// ---------------------------------------------------------------------------

/// Typ einer Session-Description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// Session-Description (SDP-Text + Typ)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    /// SDP-Text
    pub sdp: String,
    /// `offer` oder `answer`
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
}

impl SessionDescription {
    /// Erstellt eine Offer-Description
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Offer,
        }
    }

    /// Erstellt eine Answer-Description
    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp: sdp.into(),
            sdp_type: SdpType::Answer,
        }
    }

    /// ICE-Username-Fragment (`a=ice-ufrag:`) der Description
    pub fn ice_ufrag(&self) -> Option<&str> {
        self.sdp
            .lines()
            .find_map(|zeile| zeile.trim().strip_prefix("a=ice-ufrag:"))
            .map(str::trim)
            .filter(|ufrag| !ufrag.is_empty())
    }
}

// ---------------------------------------------------------------------------
// ICE-Candidate
// ---------------------------------------------------------------------------

/// Ein entdeckter Netzwerkpfad (Adresse/Port/Protokoll)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate-Zeile, z.B. `candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host`
    pub candidate: String,
    /// Index der m-Zeile, zu der der Candidate gehoert
    #[serde(rename = "sdpMLineIndex", default)]
    pub sdp_mline_index: Option<u16>,
    /// Media-Stream-ID der m-Zeile
    #[serde(rename = "sdpMid", default)]
    pub sdp_mid: Option<String>,
    /// ICE-Username-Fragment der Verhandlung, zu der der Candidate gehoert
    #[serde(rename = "usernameFragment", default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Erstellt einen Candidate fuer die gegebene m-Zeile
    pub fn neu(candidate: impl Into<String>, sdp_mline_index: u16, sdp_mid: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mline_index: Some(sdp_mline_index),
            sdp_mid: Some(sdp_mid.into()),
            username_fragment: None,
        }
    }

    /// Ordnet den Candidate einer Verhandlung zu
    pub fn mit_ufrag(mut self, ufrag: impl Into<String>) -> Self {
        self.username_fragment = Some(ufrag.into());
        self
    }

    /// `false` wenn der Candidate erkennbar zu einer anderen Verhandlung gehoert
    pub fn passt_zu(&self, ufrag: Option<&str>) -> bool {
        match (self.username_fragment.as_deref(), ufrag) {
            (Some(eigenes), Some(erwartet)) => eigenes == erwartet,
            _ => true,
        }
    }
}

// ---------------------------------------------------------------------------
// SignalingMessage
// ---------------------------------------------------------------------------

/// Nachricht zwischen zwei Teilnehmern ueber das Relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SignalingMessage {
    /// Angebot des Initiators
    Offer(SessionDescription),
    /// Antwort des Responders
    Answer(SessionDescription),
    /// Einzelner ICE-Candidate (Trickle)
    Candidate(IceCandidate),
}

impl SignalingMessage {
    /// Kurzname fuer Log-Ausgaben
    pub fn art(&self) -> &'static str {
        match self {
            Self::Offer(_) => "offer",
            Self::Answer(_) => "answer",
            Self::Candidate(_) => "candidate",
        }
    }

    /// Prueft die inhaltliche Konsistenz der Nachricht
    ///
    /// - Offer/Answer muessen den passenden `type` tragen und nicht leer sein
    /// - Candidates brauchen eine Candidate-Zeile und eine m-Zeilen-Zuordnung
    pub fn validieren(&self) -> ProtocolResult<()> {
        match self {
            Self::Offer(desc) => description_pruefen(desc, SdpType::Offer),
            Self::Answer(desc) => description_pruefen(desc, SdpType::Answer),
            Self::Candidate(c) => {
                if c.candidate.trim().is_empty() {
                    return Err(ProtocolError::ungueltig("leere Candidate-Zeile"));
                }
                if c.sdp_mline_index.is_none() && c.sdp_mid.is_none() {
                    return Err(ProtocolError::ungueltig(
                        "Candidate ohne sdpMLineIndex und sdpMid",
                    ));
                }
                Ok(())
            }
        }
    }
}

fn description_pruefen(desc: &SessionDescription, erwartet: SdpType) -> ProtocolResult<()> {
    if desc.sdp_type != erwartet {
        return Err(ProtocolError::ungueltig(format!(
            "type {:?} passt nicht zu kind {:?}",
            desc.sdp_type, erwartet
        )));
    }
    if desc.sdp.trim().is_empty() {
        return Err(ProtocolError::ungueltig("leere SDP"));
    }
    Ok(())
}
