//! Agrégation des listes noires sources en un fichier actif unique
//!
//! Le protocole garantit qu'une panne en cours d'agrégation laisse toujours
//! un jeu de données exploitable: l'ancien fichier actif est renommé vers
//! l'emplacement de sauvegarde avant toute écriture, et restauré si
//! l'agrégation échoue. Le résultat est écrit dans un fichier temporaire
//! puis renommé sur l'emplacement actif.

use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::net::Ipv6Addr;
use std::path::PathBuf;
use thiserror::Error;

/// Nom du fichier actif dans le répertoire des listes noires
pub const ACTIVE_FILE: &str = "blacklist_ips.txt";
/// Nom de l'emplacement de sauvegarde
pub const BACKUP_FILE: &str = "blacklist_ips.old";
/// Nom du fichier d'écriture temporaire
const TEMP_FILE: &str = "blacklist_ips.txt.tmp";

// Adresse IPv4 complète en notation pointée
static IPV4_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}$").expect("grammaire IPv4 invalide"));

#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("répertoire des listes noires introuvable: {}", .0.display())]
    DirectoryMissing(PathBuf),
    #[error("aucune adresse valide dans les fichiers sources")]
    EmptyAggregate,
    #[error("restauration du fichier actif impossible")]
    RestoreImpossible(#[source] Option<std::io::Error>),
    #[error("erreur d'entrée/sortie pendant l'agrégation")]
    Io(#[from] std::io::Error),
}

impl AggregateError {
    /// Vrai si l'erreur interdit de démarrer la surveillance
    ///
    /// `DirectoryMissing` signifie qu'aucun jeu de données n'existe;
    /// `RestoreImpossible` que l'ancien fichier actif est perdu. Les autres
    /// échecs laissent le fichier actif restauré depuis la sauvegarde.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AggregateError::DirectoryMissing(_) | AggregateError::RestoreImpossible(_)
        )
    }
}

/// Gestion des trois emplacements du jeu de données sur disque
/// (actif, sauvegarde, écriture temporaire)
#[derive(Debug, Clone)]
pub struct BlacklistStore {
    blacklist_dir: PathBuf,
}

impl BlacklistStore {
    pub fn new(blacklist_dir: impl Into<PathBuf>) -> Self {
        Self {
            blacklist_dir: blacklist_dir.into(),
        }
    }

    /// Chemin du fichier actif
    pub fn active_path(&self) -> PathBuf {
        self.blacklist_dir.join(ACTIVE_FILE)
    }

    /// Chemin de la sauvegarde
    pub fn backup_path(&self) -> PathBuf {
        self.blacklist_dir.join(BACKUP_FILE)
    }

    fn temp_path(&self) -> PathBuf {
        self.blacklist_dir.join(TEMP_FILE)
    }

    /// Fusionne tous les fichiers sources `.txt` du répertoire en un
    /// fichier actif trié et dédupliqué
    ///
    /// Retourne le nombre d'adresses uniques écrites. En cas d'échec après
    /// le renommage de sauvegarde, l'ancien fichier actif est restauré; si
    /// aucune sauvegarde n'existe à ce moment-là, l'erreur devient
    /// `RestoreImpossible` et doit interrompre le démarrage.
    pub fn aggregate(&self) -> Result<usize, AggregateError> {
        if !self.blacklist_dir.is_dir() {
            return Err(AggregateError::DirectoryMissing(self.blacklist_dir.clone()));
        }

        if let Err(error) = self.backup_existing() {
            return self.fail_with_restore(AggregateError::Io(error));
        }

        let entries = match self.collect_entries() {
            Ok(entries) => entries,
            Err(error) => return self.fail_with_restore(AggregateError::Io(error)),
        };

        if entries.is_empty() {
            return self.fail_with_restore(AggregateError::EmptyAggregate);
        }

        if let Err(error) = self.write_active(&entries) {
            return self.fail_with_restore(AggregateError::Io(error));
        }

        info!(
            "{} adresses uniques agrégées dans {}",
            entries.len(),
            self.active_path().display()
        );
        Ok(entries.len())
    }

    // Renomme le fichier actif vers l'emplacement de sauvegarde s'il existe.
    // Un renommage sur le même système de fichiers, jamais une copie.
    fn backup_existing(&self) -> std::io::Result<()> {
        let active = self.active_path();
        if active.exists() {
            fs::rename(&active, self.backup_path())?;
        }
        Ok(())
    }

    /// Restaure le fichier actif depuis la sauvegarde
    pub fn restore_backup(&self) -> Result<(), AggregateError> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Err(AggregateError::RestoreImpossible(None));
        }

        fs::rename(&backup, self.active_path())
            .map_err(|error| AggregateError::RestoreImpossible(Some(error)))?;
        info!("Fichier actif restauré depuis la sauvegarde");
        Ok(())
    }

    // Lit chaque fichier source `.txt` du répertoire; une ligne est retenue
    // si elle est une adresse valide. Un fichier illisible est journalisé
    // et ignoré, l'agrégation continue avec les sources restantes.
    fn collect_entries(&self) -> std::io::Result<BTreeSet<String>> {
        let mut entries = BTreeSet::new();

        for dir_entry in fs::read_dir(&self.blacklist_dir)? {
            let path = dir_entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            // Le fichier temporaire et la sauvegarde ne sont jamais des sources
            if path == self.active_path() || path == self.temp_path() {
                continue;
            }

            match fs::read_to_string(&path) {
                Ok(content) => {
                    for line in content.lines() {
                        let trimmed = line.trim();
                        if is_valid_entry(trimmed) {
                            entries.insert(trimmed.to_string());
                        }
                    }
                    info!("Fichier source traité: {}", path.display());
                }
                Err(error) => {
                    warn!("Fichier source illisible {}: {}", path.display(), error);
                }
            }
        }

        Ok(entries)
    }

    // Écrit l'ensemble trié dans le fichier temporaire puis le renomme sur
    // l'emplacement actif
    fn write_active(&self, entries: &BTreeSet<String>) -> std::io::Result<()> {
        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            for entry in entries {
                writeln!(file, "{entry}")?;
            }
            file.sync_all()?;
        }
        fs::rename(&temp, self.active_path())
    }

    fn fail_with_restore(&self, error: AggregateError) -> Result<usize, AggregateError> {
        match self.restore_backup() {
            Ok(()) => Err(error),
            Err(restore_error) => Err(restore_error),
        }
    }
}

/// Valide une entrée de liste noire: adresse IPv4 pointée complète, ou
/// adresse IPv6 littérale
fn is_valid_entry(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }
    IPV4_LINE.is_match(line) || line.parse::<Ipv6Addr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::tempdir;

    fn write_source(dir: &Path, name: &str, lines: &[&str]) {
        fs::write(dir.join(name), lines.join("\n")).unwrap();
    }

    #[test]
    fn test_entry_validation() {
        assert!(is_valid_entry("10.0.0.1"));
        assert!(is_valid_entry("255.255.255.255"));
        assert!(is_valid_entry("2001:db8::1"));
        assert!(!is_valid_entry(""));
        assert!(!is_valid_entry("abc"));
        assert!(!is_valid_entry("10.0.0"));
        assert!(!is_valid_entry("10.0.0.1 trailing"));
        assert!(!is_valid_entry("10.0.0.1/24"));
    }

    #[test]
    fn test_aggregate_merges_sorts_and_dedups() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "src_a.txt", &["1.2.3.4", "5.6.7.8"]);
        write_source(dir.path(), "src_b.txt", &["5.6.7.8", "9.9.9.9"]);

        let store = BlacklistStore::new(dir.path());
        let count = store.aggregate().unwrap();
        assert_eq!(count, 3);

        let active = fs::read_to_string(store.active_path()).unwrap();
        assert_eq!(active, "1.2.3.4\n5.6.7.8\n9.9.9.9\n");
    }

    #[test]
    fn test_aggregate_is_idempotent() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "src.txt", &["9.9.9.9", "1.2.3.4", "# note", "abc"]);

        let store = BlacklistStore::new(dir.path());
        store.aggregate().unwrap();
        let first = fs::read_to_string(store.active_path()).unwrap();

        store.aggregate().unwrap();
        let second = fs::read_to_string(store.active_path()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first, "1.2.3.4\n9.9.9.9\n");
    }

    #[test]
    fn test_missing_directory_is_fatal() {
        let dir = tempdir().unwrap();
        let store = BlacklistStore::new(dir.path().join("absent"));

        let error = store.aggregate().unwrap_err();
        assert!(matches!(error, AggregateError::DirectoryMissing(_)));
        assert!(error.is_fatal());
    }

    #[test]
    fn test_empty_aggregate_restores_previous_active() {
        let dir = tempdir().unwrap();
        let store = BlacklistStore::new(dir.path());

        // Premier passage: un fichier actif valide existe
        write_source(dir.path(), "src.txt", &["1.2.3.4"]);
        store.aggregate().unwrap();

        // Deuxième passage: la source ne valide plus aucune adresse
        write_source(dir.path(), "src.txt", &["pas une adresse"]);
        let error = store.aggregate().unwrap_err();

        assert!(matches!(error, AggregateError::EmptyAggregate));
        assert!(!error.is_fatal());
        // L'ancien fichier actif a été restauré depuis la sauvegarde
        let active = fs::read_to_string(store.active_path()).unwrap();
        assert_eq!(active, "1.2.3.4\n");
        assert!(!store.backup_path().exists());
    }

    #[test]
    fn test_empty_aggregate_without_backup_is_unrecoverable() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "src.txt", &["rien de valide"]);

        let store = BlacklistStore::new(dir.path());
        let error = store.aggregate().unwrap_err();

        assert!(matches!(error, AggregateError::RestoreImpossible(_)));
        assert!(error.is_fatal());
        assert!(!store.active_path().exists());
    }

    #[test]
    fn test_unreadable_source_is_skipped() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "good.txt", &["1.2.3.4"]);
        // Un répertoire nommé comme une source provoque une erreur de lecture
        fs::create_dir(dir.path().join("bad.txt")).unwrap();

        let store = BlacklistStore::new(dir.path());
        let count = store.aggregate().unwrap();

        assert_eq!(count, 1);
        let active = fs::read_to_string(store.active_path()).unwrap();
        assert_eq!(active, "1.2.3.4\n");
    }

    #[test]
    fn test_non_txt_files_are_ignored() {
        let dir = tempdir().unwrap();
        write_source(dir.path(), "list.txt", &["1.2.3.4"]);
        write_source(dir.path(), "notes.csv", &["5.6.7.8"]);

        let store = BlacklistStore::new(dir.path());
        store.aggregate().unwrap();

        let active = fs::read_to_string(store.active_path()).unwrap();
        assert_eq!(active, "1.2.3.4\n");
    }

    #[test]
    fn test_previous_active_is_not_reinjected_as_source() {
        let dir = tempdir().unwrap();
        let store = BlacklistStore::new(dir.path());

        write_source(dir.path(), "src.txt", &["1.2.3.4", "5.6.7.8"]);
        store.aggregate().unwrap();

        // On retire une adresse de la source: elle doit disparaître du
        // fichier actif au passage suivant
        write_source(dir.path(), "src.txt", &["1.2.3.4"]);
        store.aggregate().unwrap();

        let active = fs::read_to_string(store.active_path()).unwrap();
        assert_eq!(active, "1.2.3.4\n");
    }
}
