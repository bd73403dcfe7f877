use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

/// Chemin par défaut du fichier de configuration
pub const CONFIG_FILE: &str = "/etc/ipsentry/config.json";

/// Mode de journalisation du processus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogMode {
    /// Journalisation standard sur la sortie d'erreur
    #[default]
    Stderr,
    /// Journalisation via systemd-journal
    SystemdJournal,
}

/// Politique appliquée quand la file de trames est pleine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Rejeter la trame entrante
    #[default]
    DropNewest,
    /// Rejeter la trame la plus ancienne de la file
    DropOldest,
    /// Bloquer le thread de capture jusqu'à libération d'une place
    Block,
}

/// Canal de livraison des notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum NotifyMode {
    /// Appel direct de `notify-send`
    #[default]
    Desktop,
    /// Écriture d'une ligne JSON dans le tube nommé du démon de notification
    Pipe,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Version actuelle du logiciel
    pub version: String,

    /// Fichier de référence des sources de listes noires (NAME URL TYPE)
    pub sources_file: PathBuf,

    /// Répertoire des fichiers de listes noires normalisés
    pub blacklist_dir: PathBuf,

    /// Préfixes des interfaces réseau à surveiller (vide = toutes)
    pub interface_prefixes: Vec<String>,

    /// Nombre de workers de classification (0 = un par cœur)
    pub worker_threads: usize,

    /// Capacité de la file de trames partagée
    pub queue_capacity: usize,

    /// Politique de débordement de la file de trames
    pub overflow_policy: OverflowPolicy,

    /// Probabilité de faux positif cible du filtre de Bloom
    pub fp_probability: f64,

    /// Canal de livraison des notifications
    pub notify_mode: NotifyMode,

    /// Chemin du tube nommé utilisé en mode `pipe`
    pub notification_pipe: PathBuf,

    /// Taille de la file interne des notifications
    pub notification_queue_size: usize,

    /// Blocage pare-feu des adresses détectées
    pub block_enabled: bool,

    /// Nom de la chaîne iptables dédiée aux blocages
    pub firewall_chain: String,

    /// Niveau de log
    pub log_level: String,

    /// Mode de journalisation
    pub log_mode: LogMode,

    /// Date de la dernière récupération des sources (RFC 3339)
    pub last_fetch: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            version: env!("CARGO_PKG_VERSION").to_string(),
            sources_file: PathBuf::from("/var/lib/ipsentry/blacklist_sources.txt"),
            blacklist_dir: PathBuf::from("/var/lib/ipsentry/blacklists"),
            interface_prefixes: Vec::new(),
            worker_threads: 5,
            queue_capacity: 10_000,
            overflow_policy: OverflowPolicy::default(),
            fp_probability: crate::bloom::DEFAULT_FP_PROB,
            notify_mode: NotifyMode::default(),
            notification_pipe: PathBuf::from("/run/ipsentry/notifications.fifo"),
            notification_queue_size: 100,
            block_enabled: false,
            firewall_chain: "IPSENTRY".to_string(),
            log_level: "info".to_string(),
            log_mode: LogMode::default(),
            last_fetch: None,
        }
    }
}

impl Config {
    /// Charge la configuration depuis le chemin par défaut
    pub fn load() -> Result<Self, Box<dyn Error>> {
        Self::load_from(Path::new(CONFIG_FILE))
    }

    /// Charge la configuration depuis un fichier donné
    ///
    /// Si le fichier n'existe pas, la configuration par défaut est créée
    /// et sauvegardée à cet emplacement.
    pub fn load_from(path: &Path) -> Result<Self, Box<dyn Error>> {
        if !path.exists() {
            let default_config = Config::default();
            default_config.save_to(path)?;
            return Ok(default_config);
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;

        Ok(config)
    }

    /// Sauvegarde la configuration au chemin par défaut
    pub fn save(&self) -> Result<(), Box<dyn Error>> {
        self.save_to(Path::new(CONFIG_FILE))
    }

    /// Sauvegarde la configuration dans un fichier donné
    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;

        Ok(())
    }

    /// Nombre effectif de workers de classification
    pub fn effective_workers(&self) -> usize {
        if self.worker_threads == 0 {
            num_cpus::get().max(1)
        } else {
            self.worker_threads
        }
    }

    /// Enregistre la date de récupération des sources
    pub fn stamp_fetch(&mut self) {
        self.last_fetch = Some(chrono::Local::now().to_rfc3339());
    }
}
