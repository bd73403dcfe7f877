use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

/// Titre par défaut des notifications envoyées à l'opérateur
pub const DEFAULT_NOTIFICATION_TITLE: &str = "IPSentry";

/// Trame brute capturée sur une interface réseau
///
/// La trame est consommée exactement une fois par un worker de
/// classification, puis abandonnée quel que soit le verdict.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Nom de l'interface d'origine
    pub interface: String,
    /// Données brutes de la couche liaison
    pub data: Vec<u8>,
}

impl CapturedFrame {
    pub fn new(interface: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            interface: interface.into(),
            data,
        }
    }
}

/// Verdict de classification d'une trame capturée
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Trame non-IP ou tronquée, aucune analyse possible
    Ignore,
    /// Adresse source absente de la liste noire
    Clear,
    /// Adresse source confirmée dans la liste noire
    Match {
        source: IpAddr,
        dest_port: Option<u16>,
    },
}

/// Gravité d'une notification
///
/// Les niveaux `information` et `warning` sont délivrés avec une urgence
/// normale, `error` avec une urgence critique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Information,
    Warning,
    Error,
}

impl NotificationKind {
    /// Niveau d'urgence transmis au service de notification
    pub fn urgency(&self) -> &'static str {
        match self {
            NotificationKind::Information | NotificationKind::Warning => "normal",
            NotificationKind::Error => "critical",
        }
    }
}

/// Message de notification à destination de l'opérateur
///
/// Sérialisé en une seule ligne JSON: `{"message": ..., "type": ..., "title": ...}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    #[serde(default = "default_title")]
    pub title: String,
}

fn default_title() -> String {
    DEFAULT_NOTIFICATION_TITLE.to_string()
}

impl Notification {
    pub fn new(message: impl Into<String>, kind: NotificationKind) -> Self {
        Self {
            message: message.into(),
            kind,
            title: default_title(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Information)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Warning)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, NotificationKind::Error)
    }
}

/// Compteurs globaux de la phase de surveillance
///
/// Partagés entre les threads de capture et les workers; mis à jour sans
/// verrou via des compteurs atomiques.
#[derive(Debug, Default)]
pub struct MonitorStats {
    /// Trames reçues des interfaces
    pub frames_captured: AtomicU64,
    /// Trames rejetées par la politique de débordement de la file
    pub frames_dropped: AtomicU64,
    /// Trames classifiées par les workers
    pub frames_classified: AtomicU64,
    /// Correspondances confirmées dans la liste noire
    pub matches: AtomicU64,
    /// Faux positifs du filtre de Bloom absorbés par la vérification exacte
    pub filter_false_positives: AtomicU64,
}

impl MonitorStats {
    pub fn record_capture(&self) {
        self.frames_captured.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_classified(&self) {
        self.frames_classified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_match(&self) {
        self.matches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_false_positive(&self) {
        self.filter_false_positives.fetch_add(1, Ordering::Relaxed);
    }
}
