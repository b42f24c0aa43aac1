//! Synthetisches Capture-Geraet
//!
//! Liefert Tracks ohne echte Hardware. Wird von der Demo und den Tests
//! verwendet; optional wartet `acquire()` auf eine explizite Freigabe,
//! um einen offenen Berechtigungsdialog nachzustellen.

use async_trait::async_trait;
use huddle_core::TrackId;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

use crate::device::CaptureDevice;
use crate::error::{MediaError, MediaResult};
use crate::track::{CapturedTrack, MediaConstraints, TrackKind};

// ---------------------------------------------------------------------------
// SyntheticTrack
// ---------------------------------------------------------------------------

/// Track ohne Hardware; zaehlt `stop()`-Aufrufe
#[derive(Debug)]
pub struct SyntheticTrack {
    id: TrackId,
    kind: TrackKind,
    stop_aufrufe: AtomicUsize,
}

impl SyntheticTrack {
    pub fn neu(kind: TrackKind) -> Self {
        Self {
            id: TrackId::new(format!("{}-{}", kind.als_str(), TrackId::zufaellig())),
            kind,
            stop_aufrufe: AtomicUsize::new(0),
        }
    }

    /// Wie oft `stop()` aufgerufen wurde
    pub fn stop_aufrufe(&self) -> usize {
        self.stop_aufrufe.load(Ordering::SeqCst)
    }
}

impl CapturedTrack for SyntheticTrack {
    fn id(&self) -> &TrackId {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.stop_aufrufe.fetch_add(1, Ordering::SeqCst);
    }

    fn is_stopped(&self) -> bool {
        self.stop_aufrufe() > 0
    }
}

// ---------------------------------------------------------------------------
// SyntheticCapture
// ---------------------------------------------------------------------------

/// Capture-Geraet fuer Demo und Tests
pub struct SyntheticCapture {
    fehler: Option<MediaError>,
    sperre: Option<Notify>,
    anforderungen: AtomicUsize,
    erzeugt: Mutex<Vec<Arc<SyntheticTrack>>>,
}

impl SyntheticCapture {
    /// Geraet, das sofort Tracks liefert
    pub fn neu() -> Self {
        Self {
            fehler: None,
            sperre: None,
            anforderungen: AtomicUsize::new(0),
            erzeugt: Mutex::new(Vec::new()),
        }
    }

    /// Geraet, das jede Anforderung mit `fehler` ablehnt
    pub fn mit_fehler(fehler: MediaError) -> Self {
        Self {
            fehler: Some(fehler),
            ..Self::neu()
        }
    }

    /// `acquire()` wartet, bis [`freigeben`](Self::freigeben) aufgerufen wird
    pub fn mit_sperre(mut self) -> Self {
        self.sperre = Some(Notify::new());
        self
    }

    /// Gibt eine wartende (oder die naechste) Anforderung frei
    pub fn freigeben(&self) {
        if let Some(sperre) = &self.sperre {
            sperre.notify_one();
        }
    }

    /// Anzahl der an das Geraet gestellten Anforderungen
    pub fn anforderungen(&self) -> usize {
        self.anforderungen.load(Ordering::SeqCst)
    }

    /// Alle bisher erzeugten Tracks
    pub fn erzeugte_tracks(&self) -> Vec<Arc<SyntheticTrack>> {
        self.erzeugt.lock().clone()
    }
}

impl Default for SyntheticCapture {
    fn default() -> Self {
        Self::neu()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCapture {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> MediaResult<Vec<Arc<dyn CapturedTrack>>> {
        self.anforderungen.fetch_add(1, Ordering::SeqCst);

        if let Some(sperre) = &self.sperre {
            sperre.notified().await;
        }
        if let Some(fehler) = &self.fehler {
            return Err(fehler.clone());
        }

        let mut tracks: Vec<Arc<dyn CapturedTrack>> = Vec::new();
        let mut erzeugt = self.erzeugt.lock();
        for (gewuenscht, kind) in [
            (constraints.audio, TrackKind::Audio),
            (constraints.video, TrackKind::Video),
        ] {
            if gewuenscht {
                let track = Arc::new(SyntheticTrack::neu(kind));
                erzeugt.push(Arc::clone(&track));
                tracks.push(track);
            }
        }
        debug!(anzahl = tracks.len(), "Synthetische Tracks erzeugt");
        Ok(tracks)
    }
}
