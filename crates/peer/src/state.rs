//! Verhandlungs-Zustand einer Peer-Verbindung
//!
//! ```text
//! New -> LocalReady -> OfferSent  (Initiator) --+
//!                  \                             +-> Connected
//!                   -> AnswerSent (Responder) ---+
//!
//! OfferSent -> AnswerSent   (Glare: die niedrigere ID gibt nach)
//! jeder Zustand -> Closed   (terminal)
//! ```

use serde::{Deserialize, Serialize};

/// Rolle in der Verhandlung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Erstellt das Angebot
    Initiator,
    /// Beantwortet ein Angebot
    Responder,
}

/// Zustand einer Peer-Verbindung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerState {
    New,
    LocalReady,
    OfferSent,
    AnswerSent,
    Connected,
    Closed,
}

impl PeerState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::LocalReady => "local_ready",
            Self::OfferSent => "offer_sent",
            Self::AnswerSent => "answer_sent",
            Self::Connected => "connected",
            Self::Closed => "closed",
        }
    }

    pub fn ist_geschlossen(&self) -> bool {
        matches!(self, Self::Closed)
    }

    /// Ist der Uebergang `self -> ziel` erlaubt?
    pub fn uebergang_erlaubt(&self, ziel: PeerState) -> bool {
        use PeerState::*;
        matches!(
            (self, ziel),
            (New, LocalReady)
                | (LocalReady, OfferSent)
                | (LocalReady, AnswerSent)
                | (OfferSent, AnswerSent)
                | (OfferSent, Connected)
                | (AnswerSent, Connected)
        ) || (ziel == Closed && *self != Closed)
    }
}

impl std::fmt::Display for PeerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_ist_von_ueberall_erreichbar() {
        for state in [
            PeerState::New,
            PeerState::LocalReady,
            PeerState::OfferSent,
            PeerState::AnswerSent,
            PeerState::Connected,
        ] {
            assert!(state.uebergang_erlaubt(PeerState::Closed), "{state}");
        }
        assert!(!PeerState::Closed.uebergang_erlaubt(PeerState::Closed));
    }

    #[test]
    fn closed_ist_terminal() {
        assert!(!PeerState::Closed.uebergang_erlaubt(PeerState::LocalReady));
        assert!(!PeerState::Closed.uebergang_erlaubt(PeerState::Connected));
    }

    #[test]
    fn keine_abkuerzungen() {
        assert!(!PeerState::New.uebergang_erlaubt(PeerState::OfferSent));
        assert!(!PeerState::LocalReady.uebergang_erlaubt(PeerState::Connected));
        assert!(!PeerState::AnswerSent.uebergang_erlaubt(PeerState::OfferSent));
        assert!(PeerState::OfferSent.uebergang_erlaubt(PeerState::AnswerSent));
    }
}
