//! Fehlertypen fuer die lokale Medienquelle

use huddle_core::HuddleError;
use thiserror::Error;

/// Grund fuer eine fehlgeschlagene Medien-Anforderung
///
/// `Clone`, weil der Grund im [`LocalMediaState::Failed`](crate::LocalMediaState)
/// gespeichert und an mehrere Wartende verteilt wird.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("Zugriff auf Kamera/Mikrofon verweigert")]
    BerechtigungVerweigert,

    #[error("Geraet nicht verfuegbar: {0}")]
    GeraetNichtVerfuegbar(String),

    #[error("Geraet wird von einer anderen Anwendung verwendet: {0}")]
    GeraetBelegt(String),

    #[error("Weder Audio noch Video angefordert")]
    KeineMedienAngefordert,

    #[error("Medien-Anforderung abgebrochen")]
    Abgebrochen,

    #[error("Medien wurden bereits angefordert")]
    BereitsAngefordert,
}

impl From<MediaError> for HuddleError {
    fn from(e: MediaError) -> Self {
        HuddleError::Medien(e.to_string())
    }
}

pub type MediaResult<T> = Result<T, MediaError>;
