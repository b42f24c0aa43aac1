//! Plattform-Grenze fuer die Medienerfassung
//!
//! Huddle definiert die Capture-API nicht selbst, sondern konsumiert sie
//! ueber diesen Trait. Eine Implementierung kapselt z.B. cpal/V4L2 oder die
//! Browser-API; fuer Tests und die Demo gibt es [`SyntheticCapture`](crate::SyntheticCapture).

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::MediaResult;
use crate::track::{CapturedTrack, MediaConstraints};

/// Erfasst lokale Audio-/Video-Tracks
#[async_trait]
pub trait CaptureDevice: Send + Sync + 'static {
    /// Fordert Tracks gemaess `constraints` an
    ///
    /// Darf beliebig lange blockieren (Berechtigungsdialog). Der Aufrufer
    /// bricht bei Bedarf ab, indem er das Future droppt.
    async fn acquire(&self, constraints: MediaConstraints) -> MediaResult<Vec<Arc<dyn CapturedTrack>>>;
}
