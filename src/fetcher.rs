//! Récupération et normalisation des listes noires sources
//!
//! Le fichier de référence liste une source par ligne au format
//! `NAME URL TYPE`. Chaque source est téléchargée via la commande externe
//! `wget`, validée (une page d'erreur HTML est rejetée), puis normalisée en
//! un fichier `NAME.txt` ne contenant que des adresses IPv4, une par ligne.
//! Toute défaillance sur une source est journalisée et n'interrompt pas le
//! traitement des autres.

use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

// Préfixe IPv4 littéral en tête de ligne
static IPV4_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[0-9]{1,3}\.){3}[0-9]{1,3}").expect("grammaire IPv4 invalide"));

/// Une entrée du fichier de référence des sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    pub name: String,
    pub url: String,
    pub filetype: String,
}

/// Analyse une ligne du fichier de référence
///
/// Retourne `None` pour une ligne vide ou un commentaire; `Err` pour une
/// ligne dont le nombre de champs est incorrect.
pub fn parse_reference_line(line: &str) -> Result<Option<SourceEntry>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    if parts.len() != 3 {
        return Err(trimmed.to_string());
    }

    Ok(Some(SourceEntry {
        name: parts[0].to_string(),
        url: parts[1].to_string(),
        filetype: parts[2].to_lowercase(),
    }))
}

/// Récupère puis normalise toutes les sources du fichier de référence
///
/// Un fichier de référence absent est une précondition manquante mais pas
/// une erreur: le fichier actif pré-installé sert alors de repli.
pub fn fetch_blacklists(sources_file: &Path, blacklist_dir: &Path) -> std::io::Result<()> {
    if !sources_file.exists() {
        warn!(
            "Fichier de référence des sources introuvable: {}",
            sources_file.display()
        );
        return Ok(());
    }

    fs::create_dir_all(blacklist_dir)?;

    let reader = BufReader::new(File::open(sources_file)?);
    for line in reader.lines() {
        let line = line?;
        match parse_reference_line(&line) {
            Ok(Some(entry)) => process_source(&entry, blacklist_dir),
            Ok(None) => {}
            Err(bad_line) => warn!("Ligne de référence invalide: {bad_line}"),
        }
    }

    Ok(())
}

// Télécharge et normalise une source; toute erreur est locale à la source
fn process_source(entry: &SourceEntry, blacklist_dir: &Path) {
    let download_path = blacklist_dir.join(format!("{}.{}", entry.name, entry.filetype));

    if !download_file(&entry.url, &download_path) {
        return;
    }

    if let Err(error) = normalize_source(&entry.name, &download_path, blacklist_dir) {
        error!("Normalisation de {} échouée: {}", entry.name, error);
    }
}

// Téléchargement via la commande externe `wget`
fn download_file(url: &str, destination: &Path) -> bool {
    let status = Command::new("wget")
        .args(["-q", "-O"])
        .arg(destination)
        .arg(url)
        .status();

    match status {
        Ok(status) if status.success() => {}
        Ok(status) => {
            error!("Téléchargement échoué pour {url} (code {status})");
            return false;
        }
        Err(error) => {
            error!("Impossible d'exécuter wget pour {url}: {error}");
            return false;
        }
    }

    if !is_valid_download(destination) {
        error!(
            "Contenu invalide dans le fichier téléchargé: {}",
            destination.display()
        );
        let _ = fs::remove_file(destination);
        return false;
    }

    info!("Fichier téléchargé depuis {url} vers {}", destination.display());
    true
}

// Rejette les pages d'erreur HTML renvoyées à la place d'une liste
fn is_valid_download(path: &Path) -> bool {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(error) => {
            error!("Validation du téléchargement impossible {}: {}", path.display(), error);
            return false;
        }
    };

    let mut first_line = String::new();
    if BufReader::new(file).read_line(&mut first_line).is_err() {
        return false;
    }

    !first_line.to_lowercase().contains("<html")
}

/// Extrait le préfixe IPv4 de chaque ligne du fichier téléchargé vers
/// `NAME.txt`, en passant par un fichier temporaire
pub fn normalize_source(
    name: &str,
    download_path: &Path,
    blacklist_dir: &Path,
) -> std::io::Result<PathBuf> {
    let temp_path = blacklist_dir.join(format!("{name}.tmp"));
    let output_path = blacklist_dir.join(format!("{name}.txt"));

    {
        let reader = BufReader::new(File::open(download_path)?);
        let mut output = File::create(&temp_path)?;

        for line in reader.lines() {
            let line = line?;
            if let Some(found) = IPV4_PREFIX.find(line.trim()) {
                writeln!(output, "{}", found.as_str())?;
            }
        }
    }

    fs::remove_file(download_path)?;
    fs::rename(&temp_path, &output_path)?;

    info!(
        "Source {} normalisée vers {}",
        name,
        output_path.display()
    );
    Ok(output_path)
}
