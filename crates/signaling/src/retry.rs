//! Wiederholungs-Strategie fuer das Versenden ueber das Relay

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponentielles Backoff mit Obergrenze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximale Anzahl Versuche (inklusive des ersten)
    pub max_versuche: u32,
    /// Wartezeit vor dem zweiten Versuch
    pub start_backoff_ms: u64,
    /// Obergrenze fuer die Wartezeit
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_versuche: 5,
            start_backoff_ms: 100,
            max_backoff_ms: 2_000,
        }
    }
}

impl RetryPolicy {
    /// Kein erneuter Versuch
    pub fn einmalig() -> Self {
        Self {
            max_versuche: 1,
            ..Self::default()
        }
    }

    /// Wartezeit nach dem fehlgeschlagenen Versuch `versuch` (1-basiert)
    pub fn verzoegerung(&self, versuch: u32) -> Duration {
        let faktor = 1u64 << versuch.saturating_sub(1).min(16);
        let ms = self.start_backoff_ms.saturating_mul(faktor).min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}
