//! Presence-Ereignisse eines Raums

use huddle_core::ParticipantId;
use serde::{Deserialize, Serialize};

/// Art der Presence-Aenderung
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceKind {
    Joined,
    Left,
}

/// Ein Teilnehmer ist dem Raum beigetreten oder hat ihn verlassen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    pub participant_id: ParticipantId,
    pub kind: PresenceKind,
}

impl PresenceEvent {
    /// `Joined`-Ereignis
    pub fn beigetreten(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            kind: PresenceKind::Joined,
        }
    }

    /// `Left`-Ereignis
    pub fn verlassen(participant_id: ParticipantId) -> Self {
        Self {
            participant_id,
            kind: PresenceKind::Left,
        }
    }
}
