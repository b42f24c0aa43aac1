//! Gemeinsame Identifikationstypen fuer Huddle
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die Werte sind
//! opake Strings: Raum-IDs kommen vom Aufrufer, Teilnehmer-IDs vom Relay
//! bzw. werden lokal per UUID erzeugt.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Erstellt eine ID aus einem beliebigen String
            pub fn new(wert: impl Into<String>) -> Self {
                Self(wert.into())
            }

            /// Gibt den inneren String zurueck
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(wert: &str) -> Self {
                Self(wert.to_string())
            }
        }

        impl From<String> for $name {
            fn from(wert: String) -> Self {
                Self(wert)
            }
        }
    };
}

string_id!(
    /// Raum-ID (vom Aufrufer vergeben, z.B. aus der Meeting-URL)
    RoomId
);

string_id!(
    /// Teilnehmer-ID, eindeutig innerhalb eines Raums
    ///
    /// Die Ordnung (`Ord`) ist die Totalordnung fuer die Glare-Aufloesung:
    /// bei gleichzeitigen Offers gibt die kleinere ID nach.
    ParticipantId
);

string_id!(
    /// Track-ID eines lokalen oder entfernten Medien-Tracks
    TrackId
);

string_id!(
    /// Kennung eines einzelnen Beitritts
    ///
    /// Tritt ein Teilnehmer unter derselben ID erneut bei, bekommt er eine
    /// neue Sitzungs-ID. Dokumente an eine fruehere Sitzung lassen sich so
    /// von denen an die aktuelle unterscheiden.
    SessionId
);

impl ParticipantId {
    /// Erzeugt eine neue zufaellige Teilnehmer-ID
    pub fn zufaellig() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

impl TrackId {
    /// Erzeugt eine neue zufaellige Track-ID
    pub fn zufaellig() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl SessionId {
    /// Erzeugt eine neue zufaellige Sitzungs-ID
    pub fn zufaellig() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}
