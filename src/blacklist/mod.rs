//! Module de gestion de la liste noire
//!
//! Ce module couvre le cycle de vie du jeu de données: l'agrégation des
//! fichiers sources normalisés en un fichier actif unique (avec sauvegarde
//! et restauration atomiques), et la construction de l'instantané immuable
//! utilisé par le pipeline d'inspection.

mod aggregator;
mod snapshot;

pub use aggregator::{AggregateError, BlacklistStore, ACTIVE_FILE, BACKUP_FILE};
pub use snapshot::{BlacklistSnapshot, SnapshotError};
