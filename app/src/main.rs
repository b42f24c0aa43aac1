//! Huddle Demo – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und laesst einen
//! simulierten Raum laufen.

use anyhow::Result;
use huddle_app::{config::AppConfig, Demo};
use huddle_observability::logging_initialisieren;

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let config_pfad = std::env::var("HUDDLE_CONFIG").unwrap_or_else(|_| "huddle.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let config = AppConfig::laden(&config_pfad)?;

    logging_initialisieren(&config.logging.level, &config.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_pfad,
        "Huddle Demo wird initialisiert"
    );

    let demo = Demo::neu(config);
    let bericht = tokio::select! {
        bericht = demo.starten() => bericht?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Abbruch-Signal empfangen, Demo wird beendet");
            return Ok(());
        }
    };

    tracing::info!(
        teilnehmer = bericht.teilnehmer,
        verbindungen = bericht.verbindungen,
        vollstaendig = bericht.vollstaendig,
        "Demo beendet"
    );
    println!("{}", bericht.metriken);

    Ok(())
}
