//! Prometheus-kompatible Metriken fuer Huddle
//!
//! Registrierte Metriken:
//! - `huddle_peer_connections_active` – Gauge: Aktuell registrierte Peer-Verbindungen
//! - `huddle_peer_connections_total` – Counter: Insgesamt erstellte Peer-Verbindungen
//! - `huddle_negotiation_errors_total` – Counter: Fehlgeschlagene Verhandlungen
//! - `huddle_signaling_retries_total` – Counter: Wiederholte Relay-Zustellungen
//! - `huddle_remote_tracks_total` – Counter: Gemeldete Remote-Tracks

use anyhow::Result;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};
use std::sync::Arc;

/// Alle Huddle-Prometheus-Metriken
///
/// Jede Instanz hat eine eigene Registry; mehrere Sessions (oder Tests)
/// im selben Prozess kommen sich damit nicht in die Quere.
#[derive(Clone)]
pub struct HuddleMetrics {
    pub registry: Arc<Registry>,

    // Peer-Verbindungen
    pub peer_connections_active: IntGauge,
    pub peer_connections_total: IntCounter,
    pub negotiation_errors_total: IntCounter,
    pub remote_tracks_total: IntCounter,

    // Signalisierung
    pub signaling_retries_total: IntCounter,
}

impl HuddleMetrics {
    /// Erstellt und registriert alle Metriken in einer neuen Registry
    pub fn neu() -> Result<Self> {
        let registry = Registry::new();

        // --- Peer-Verbindungen ---
        let peer_connections_active = IntGauge::with_opts(Opts::new(
            "huddle_peer_connections_active",
            "Anzahl aktuell registrierter Peer-Verbindungen",
        ))?;
        registry.register(Box::new(peer_connections_active.clone()))?;

        let peer_connections_total = IntCounter::with_opts(Opts::new(
            "huddle_peer_connections_total",
            "Gesamtanzahl erstellter Peer-Verbindungen",
        ))?;
        registry.register(Box::new(peer_connections_total.clone()))?;

        let negotiation_errors_total = IntCounter::with_opts(Opts::new(
            "huddle_negotiation_errors_total",
            "Gesamtanzahl fehlgeschlagener Verhandlungen",
        ))?;
        registry.register(Box::new(negotiation_errors_total.clone()))?;

        let remote_tracks_total = IntCounter::with_opts(Opts::new(
            "huddle_remote_tracks_total",
            "Gesamtanzahl gemeldeter Remote-Tracks",
        ))?;
        registry.register(Box::new(remote_tracks_total.clone()))?;

        // --- Signalisierung ---
        let signaling_retries_total = IntCounter::with_opts(Opts::new(
            "huddle_signaling_retries_total",
            "Gesamtanzahl wiederholter Relay-Zustellungen",
        ))?;
        registry.register(Box::new(signaling_retries_total.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            peer_connections_active,
            peer_connections_total,
            negotiation_errors_total,
            remote_tracks_total,
            signaling_retries_total,
        })
    }

    /// Exportiert alle Metriken im Prometheus-Textformat
    pub fn exportieren(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}
