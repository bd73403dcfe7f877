//! Bibliothèque IPSentry de surveillance du trafic réseau
//!
//! Cette bibliothèque maintient une liste noire agrégée d'adresses IP
//! malveillantes, inspecte le trafic capturé sur les interfaces locales à
//! travers un pré-filtre de Bloom, et réagit aux correspondances
//! confirmées par notification et, selon le déploiement, par blocage
//! pare-feu.

// Cycle de vie du jeu de données
pub mod blacklist; // Agrégation atomique et instantané de la liste noire
pub mod bloom;     // Filtre de Bloom de pré-test d'appartenance
pub mod fetcher;   // Récupération et normalisation des sources

// Pipeline d'inspection
pub mod monitor;   // Capture, file partagée et workers de classification
pub mod actions;   // Réactions aux correspondances confirmées
pub mod firewall;  // Blocage iptables idempotent

// Modules transverses
pub mod cli;       // Interface en ligne de commande
pub mod config;    // Configuration du système
pub mod models;    // Structures de données partagées
pub mod notifier;  // Livraison des notifications à l'opérateur

// Re-export des structures principales pour faciliter l'utilisation
pub use blacklist::{AggregateError, BlacklistSnapshot, BlacklistStore};
pub use bloom::BloomFilter;
pub use config::Config;
pub use models::{CapturedFrame, MonitorStats, Notification, NotificationKind, Verdict};
pub use monitor::PacketClassifier;
