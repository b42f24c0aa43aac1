//! Structured Logging Setup via tracing-subscriber
//!
//! Konfigurierbar per Umgebungsvariable:
//! - `HUDDLE_LOG_LEVEL`: Log-Level bzw. Filter (`info`, `huddle_peer=debug,info`), Standard: info
//! - `HUDDLE_LOG_FORMAT`: Format (text/json), Standard: text
//!
//! Die Umgebungsvariablen haben Vorrang vor den Werten aus der Konfiguration.

use tracing_subscriber::{fmt, EnvFilter};

pub const ENV_LOG_LEVEL: &str = "HUDDLE_LOG_LEVEL";
pub const ENV_LOG_FORMAT: &str = "HUDDLE_LOG_FORMAT";

/// Initialisiert das Logging-System.
///
/// Liest `HUDDLE_LOG_LEVEL` und `HUDDLE_LOG_FORMAT` aus der Umgebung.
/// Faellt auf `level` / `format` und zuletzt auf `info` / `text` zurueck.
/// Ein zweiter Aufruf im selben Prozess ist wirkungslos.
pub fn logging_initialisieren(level: &str, format: &str) {
    let filter = EnvFilter::try_from_env(ENV_LOG_LEVEL)
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format_env = std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| format.to_string());

    let ergebnis = match format_env.as_str() {
        "json" => fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_current_span(true)
            .try_init(),
        _ => fmt().with_env_filter(filter).with_target(true).try_init(),
    };

    if ergebnis.is_err() {
        tracing::debug!("Logging war bereits initialisiert");
    }
}

/// Gibt den konfigurierten Log-Level aus der Umgebung zurueck.
/// Fallback: "info"
pub fn log_level_aus_env() -> String {
    std::env::var(ENV_LOG_LEVEL).unwrap_or_else(|_| "info".to_string())
}

/// Gibt das konfigurierte Log-Format aus der Umgebung zurueck.
/// Fallback: "text"
pub fn log_format_aus_env() -> String {
    std::env::var(ENV_LOG_FORMAT).unwrap_or_else(|_| "text".to_string())
}

/// Validiert ob ein Log-Level-String gueltig ist.
pub fn log_level_gueltig(level: &str) -> bool {
    matches!(level, "trace" | "debug" | "info" | "warn" | "error")
}

/// Validiert ob ein Log-Format-String gueltig ist.
pub fn log_format_gueltig(format: &str) -> bool {
    matches!(format, "text" | "json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_level_gueltige_werte() {
        for level in ["trace", "debug", "info", "warn", "error"] {
            assert!(log_level_gueltig(level), "{level}");
        }
    }

    #[test]
    fn log_level_ungueltige_werte() {
        assert!(!log_level_gueltig("verbose"));
        assert!(!log_level_gueltig("INFO")); // Gross-/Kleinschreibung
        assert!(!log_level_gueltig(""));
    }

    #[test]
    fn log_format_werte() {
        assert!(log_format_gueltig("text"));
        assert!(log_format_gueltig("json"));
        assert!(!log_format_gueltig("xml"));
        assert!(!log_format_gueltig("JSON"));
    }

    // Ein Test fuer beide Variablen, damit parallele Tests sich nicht
    // gegenseitig die Umgebung veraendern
    #[test]
    fn werte_aus_env_mit_fallback() {
        std::env::remove_var(ENV_LOG_LEVEL);
        std::env::remove_var(ENV_LOG_FORMAT);
        assert_eq!(log_level_aus_env(), "info");
        assert_eq!(log_format_aus_env(), "text");

        std::env::set_var(ENV_LOG_LEVEL, "debug");
        std::env::set_var(ENV_LOG_FORMAT, "json");
        assert_eq!(log_level_aus_env(), "debug");
        assert_eq!(log_format_aus_env(), "json");

        std::env::remove_var(ENV_LOG_LEVEL);
        std::env::remove_var(ENV_LOG_FORMAT);
    }

    #[test]
    fn doppelte_initialisierung_ist_harmlos() {
        logging_initialisieren("warn", "text");
        logging_initialisieren("debug", "json");
    }
}
