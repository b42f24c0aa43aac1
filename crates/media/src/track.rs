//! Lokale Tracks und Anforderungs-Constraints

use huddle_core::TrackId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Art eines Medien-Tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Video,
}

impl TrackKind {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Welche Medien angefordert werden
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl MediaConstraints {
    /// Nur Audio (z.B. reine Sprachkonferenz)
    pub fn nur_audio() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }

    /// Mindestens eine Medienart angefordert?
    pub fn ist_leer(&self) -> bool {
        !self.audio && !self.video
    }
}

/// Ein von der Plattform erfasster Track
///
/// `stop()` muss idempotent sein; die Medienquelle ruft es genau einmal auf,
/// Plattform-Implementierungen duerfen sich aber nicht darauf verlassen.
pub trait CapturedTrack: Send + Sync + 'static {
    fn id(&self) -> &TrackId;
    fn kind(&self) -> TrackKind;
    fn stop(&self);
    fn is_stopped(&self) -> bool;
}

/// Geteilte, nur lesbare Sicht auf die lokalen Tracks einer Session
#[derive(Clone)]
pub struct LocalTracks {
    tracks: Arc<[Arc<dyn CapturedTrack>]>,
}

impl LocalTracks {
    pub fn new(tracks: Vec<Arc<dyn CapturedTrack>>) -> Self {
        Self {
            tracks: tracks.into(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CapturedTrack>> {
        self.tracks.iter()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// (ID, Art) aller Tracks, z.B. fuer die SDP-Erzeugung
    pub fn beschreibung(&self) -> Vec<(TrackId, TrackKind)> {
        self.tracks
            .iter()
            .map(|t| (t.id().clone(), t.kind()))
            .collect()
    }

    /// Stoppt alle Tracks; nur fuer die Medienquelle selbst
    pub(crate) fn alle_stoppen(&self) {
        for track in self.tracks.iter() {
            track.stop();
        }
    }
}

impl std::fmt::Debug for LocalTracks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.tracks.iter().map(|t| (t.id().as_str().to_string(), t.kind())))
            .finish()
    }
}
