//! Instantané immuable de la liste noire
//!
//! Associe l'ensemble exact des adresses au filtre de Bloom construit à
//! partir de ce même ensemble. L'instantané est construit une fois au
//! démarrage de la surveillance puis partagé en lecture seule par tous les
//! workers; un rechargement demande un redémarrage du processus.

use crate::bloom::{BloomFilter, FilterError};
use log::info;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("lecture du fichier actif impossible: {}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("le fichier actif ne contient aucune adresse: {}", .0.display())]
    EmptyBlacklist(PathBuf),
    #[error("construction du filtre impossible")]
    Filter(#[from] FilterError),
}

/// Ensemble exact des adresses bloquées et son filtre de Bloom associé
#[derive(Debug)]
pub struct BlacklistSnapshot {
    members: HashSet<String>,
    filter: BloomFilter,
}

impl BlacklistSnapshot {
    /// Charge l'instantané depuis le fichier actif
    ///
    /// Chaque ligne non vide devient un membre; le filtre est dimensionné
    /// pour le nombre de membres avec la probabilité de faux positif
    /// demandée, et peuplé avec exactement ces membres.
    pub fn load(path: &Path, fp_prob: f64) -> Result<Self, SnapshotError> {
        let content = fs::read_to_string(path).map_err(|source| SnapshotError::Unreadable {
            path: path.to_path_buf(),
            source,
        })?;

        let members: HashSet<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if members.is_empty() {
            return Err(SnapshotError::EmptyBlacklist(path.to_path_buf()));
        }

        let snapshot = Self::from_members(members, fp_prob)?;
        info!(
            "Liste noire chargée depuis {}: {} adresses, filtre de {} bits ({} hachages)",
            path.display(),
            snapshot.len(),
            snapshot.filter.size(),
            snapshot.filter.hash_count()
        );
        Ok(snapshot)
    }

    /// Construit l'instantané depuis un ensemble déjà en mémoire
    pub fn from_members(members: HashSet<String>, fp_prob: f64) -> Result<Self, SnapshotError> {
        let mut filter = BloomFilter::new(members.len(), fp_prob)?;
        for member in &members {
            filter.add(member.as_bytes());
        }
        Ok(Self { members, filter })
    }

    /// Pré-test probabiliste; un `false` est définitif
    pub fn filter_check(&self, address: &str) -> bool {
        self.filter.check(address.as_bytes())
    }

    /// Vérification exacte, sans faux positif
    pub fn is_member(&self, address: &str) -> bool {
        self.members.contains(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn filter_mut(&mut self) -> &mut BloomFilter {
        &mut self.filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_load_builds_complete_filter() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist_ips.txt");
        fs::write(&path, "1.2.3.4\n5.6.7.8\n9.9.9.9\n").unwrap();

        let snapshot = BlacklistSnapshot::load(&path, 0.01).unwrap();

        assert_eq!(snapshot.len(), 3);
        for address in ["1.2.3.4", "5.6.7.8", "9.9.9.9"] {
            assert!(snapshot.is_member(address));
            // Jamais de faux négatif pour un membre inséré
            assert!(snapshot.filter_check(address));
        }
        assert!(!snapshot.is_member("8.8.8.8"));
    }

    #[test]
    fn test_blank_lines_are_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist_ips.txt");
        fs::write(&path, "1.2.3.4\n\n  \n5.6.7.8\n").unwrap();

        let snapshot = BlacklistSnapshot::load(&path, 0.01).unwrap();
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_empty_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("blacklist_ips.txt");
        fs::write(&path, "\n\n").unwrap();

        assert!(matches!(
            BlacklistSnapshot::load(&path, 0.01),
            Err(SnapshotError::EmptyBlacklist(_))
        ));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.txt");

        assert!(matches!(
            BlacklistSnapshot::load(&path, 0.01),
            Err(SnapshotError::Unreadable { .. })
        ));
    }
}
