//! LocalMediaSource – Besitzer der lokalen Tracks einer Session
//!
//! Der Zustand liegt in einem `watch`-Kanal: Bereitschaft ist ein einmaliger
//! Uebergang, auf den beliebig viele Stellen warten koennen (`ready()`), ohne
//! den Zustand selbst zu pollen.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::device::CaptureDevice;
use crate::error::{MediaError, MediaResult};
use crate::track::{LocalTracks, MediaConstraints};

// ---------------------------------------------------------------------------
// LocalMediaState
// ---------------------------------------------------------------------------

/// Zustand der lokalen Medien (genau einer pro Session)
#[derive(Debug, Clone)]
pub enum LocalMediaState {
    /// Noch nicht angefordert
    Uninitialized,
    /// Anforderung laeuft (wartet ggf. auf Benutzer-Erlaubnis)
    Acquiring,
    /// Tracks verfuegbar
    Ready(LocalTracks),
    /// Anforderung fehlgeschlagen
    Failed(MediaError),
    /// Tracks wurden gestoppt (Session beendet)
    Released,
}

impl LocalMediaState {
    /// Tracks, falls bereit
    pub fn tracks(&self) -> Option<&LocalTracks> {
        match self {
            Self::Ready(tracks) => Some(tracks),
            _ => None,
        }
    }

    pub fn ist_bereit(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Kurzname fuer Logs und Fehlermeldungen
    pub fn name(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Acquiring => "acquiring",
            Self::Ready(_) => "ready",
            Self::Failed(_) => "failed",
            Self::Released => "released",
        }
    }
}

// ---------------------------------------------------------------------------
// LocalMediaSource
// ---------------------------------------------------------------------------

/// Fordert lokale Medien an und gibt sie genau einmal wieder frei
pub struct LocalMediaSource {
    device: Arc<dyn CaptureDevice>,
    state_tx: watch::Sender<LocalMediaState>,
    /// Wird von `release()` gesetzt, bevor der Zustand angefasst wird
    freigegeben: AtomicBool,
}

impl LocalMediaSource {
    /// Erstellt eine neue Medienquelle (Zustand `Uninitialized`)
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        let (state_tx, _) = watch::channel(LocalMediaState::Uninitialized);
        Self {
            device,
            state_tx,
            freigegeben: AtomicBool::new(false),
        }
    }

    /// Aktueller Zustand (Momentaufnahme)
    pub fn state(&self) -> LocalMediaState {
        self.state_tx.borrow().clone()
    }

    /// Abonniert Zustandsaenderungen
    pub fn subscribe(&self) -> watch::Receiver<LocalMediaState> {
        self.state_tx.subscribe()
    }

    /// Fordert die lokalen Tracks an
    ///
    /// `Uninitialized -> Acquiring -> Ready | Failed`. Die Anforderung wird
    /// abgebrochen sobald `cancel` ausgeloest wird; der Zustand endet dann in
    /// `Failed(Abgebrochen)`.
    pub async fn acquire(
        &self,
        constraints: MediaConstraints,
        cancel: &CancellationToken,
    ) -> MediaResult<LocalTracks> {
        let gestartet = self.state_tx.send_if_modified(|state| {
            if matches!(state, LocalMediaState::Uninitialized) {
                *state = LocalMediaState::Acquiring;
                true
            } else {
                false
            }
        });
        if !gestartet {
            return Err(MediaError::BereitsAngefordert);
        }

        if constraints.ist_leer() {
            return Err(self.fehlschlagen(MediaError::KeineMedienAngefordert));
        }

        info!(audio = constraints.audio, video = constraints.video, "Fordere lokale Medien an");

        let ergebnis = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(MediaError::Abgebrochen),
            res = self.device.acquire(constraints) => res,
        };

        let tracks = match ergebnis {
            Ok(tracks) => LocalTracks::new(tracks),
            Err(e) => {
                warn!(fehler = %e, "Medien-Anforderung fehlgeschlagen");
                return Err(self.fehlschlagen(e));
            }
        };

        // Unter dem watch-Lock: ein paralleles release() hat entweder schon
        // das Flag gesetzt (dann hier stoppen) oder sieht gleich `Ready`.
        let mut ergebnis = Ok(tracks.clone());
        self.state_tx.send_modify(|state| {
            if self.freigegeben.load(Ordering::SeqCst) {
                tracks.alle_stoppen();
                *state = LocalMediaState::Failed(MediaError::Abgebrochen);
                ergebnis = Err(MediaError::Abgebrochen);
            } else {
                *state = LocalMediaState::Ready(tracks.clone());
            }
        });

        if ergebnis.is_ok() {
            info!(tracks = tracks.len(), "Lokale Medien bereit");
        }
        ergebnis
    }

    /// Wartet auf das Ende der Anforderung
    ///
    /// Liefert die Tracks bei `Ready`, sonst den Fehlergrund.
    pub async fn ready(&self) -> MediaResult<LocalTracks> {
        let mut rx = self.state_tx.subscribe();
        let state = rx
            .wait_for(|s| {
                matches!(
                    s,
                    LocalMediaState::Ready(_) | LocalMediaState::Failed(_) | LocalMediaState::Released
                )
            })
            .await
            .map_err(|_| MediaError::Abgebrochen)?
            .clone();

        match state {
            LocalMediaState::Ready(tracks) => Ok(tracks),
            LocalMediaState::Failed(e) => Err(e),
            _ => Err(MediaError::Abgebrochen),
        }
    }

    /// Stoppt alle Tracks
    ///
    /// Idempotent: nur der erste Aufruf stoppt und liefert `true`, alle
    /// weiteren (auch parallele) sind No-Ops.
    pub fn release(&self) -> bool {
        if self.freigegeben.swap(true, Ordering::SeqCst) {
            debug!("Lokale Medien bereits freigegeben");
            return false;
        }

        self.state_tx.send_modify(|state| match state {
            LocalMediaState::Ready(tracks) => {
                tracks.alle_stoppen();
                *state = LocalMediaState::Released;
            }
            LocalMediaState::Uninitialized => {
                *state = LocalMediaState::Released;
            }
            // Acquiring: acquire() sieht das Flag und stoppt selbst
            // Failed: es gibt nichts zu stoppen
            _ => {}
        });

        info!("Lokale Medien freigegeben");
        true
    }

    pub fn ist_freigegeben(&self) -> bool {
        self.freigegeben.load(Ordering::SeqCst)
    }

    fn fehlschlagen(&self, fehler: MediaError) -> MediaError {
        self.state_tx
            .send_replace(LocalMediaState::Failed(fehler.clone()));
        fehler
    }
}

impl std::fmt::Debug for LocalMediaSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalMediaSource")
            .field("state", &self.state_tx.borrow().name())
            .field("freigegeben", &self.freigegeben.load(Ordering::Relaxed))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
