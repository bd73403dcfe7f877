use anyhow::Context;
use clap::Parser;
use ipsentry::cli::{Cli, Command};
use ipsentry::config::{self, Config, LogMode};
use ipsentry::models::Notification;
use ipsentry::notifier::{self, NotifyHandle};
use ipsentry::{blacklist, fetcher, monitor};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::process::exit;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_FILE));

    // Charger la configuration pour déterminer le mode de log
    let config = Config::load_from(&config_path).unwrap_or_else(|err| {
        eprintln!(
            "Configuration illisible ({}), valeurs par défaut utilisées: {err}",
            config_path.display()
        );
        Config::default()
    });

    // Initialiser le logger du processus, une seule fois
    init_logging(&config);

    // Démarrer la tâche de livraison des notifications
    let (notify, notify_task) = notifier::spawn(&config);

    let result = match cli.command {
        Command::Fetch => run_fetch(&config, &config_path, &notify).await,
        Command::Aggregate => run_aggregate(&config, &notify).await,
        Command::Monitor => monitor::run(&config, notify.clone()).await,
        Command::Run => run_pipeline(&config, &config_path, &notify).await,
    };

    // Laisser partir les dernières notifications avant de conclure
    drop(notify);
    let _ = notify_task.await;

    if let Err(err) = result {
        error!("Erreur d'exécution: {err:#}");
        exit(1);
    }
}

fn init_logging(config: &Config) {
    match config.log_mode {
        LogMode::Stderr => {
            env_logger::init_from_env(
                env_logger::Env::default().default_filter_or(&config.log_level),
            );
        }
        LogMode::SystemdJournal => {
            // Journal systemd uniquement si la feature est compilée
            #[cfg(feature = "systemd")]
            {
                use systemd_journal_logger::JournalLog;

                let level = config
                    .log_level
                    .parse::<log::LevelFilter>()
                    .unwrap_or(log::LevelFilter::Info);

                match JournalLog::new() {
                    Ok(logger) => {
                        if let Err(err) = logger
                            .with_syslog_identifier("ipsentry".to_string())
                            .install()
                        {
                            eprintln!("Installation du logger systemd impossible: {err}");
                            env_logger::init_from_env(
                                env_logger::Env::default().default_filter_or(&config.log_level),
                            );
                        } else {
                            log::set_max_level(level);
                        }
                    }
                    Err(err) => {
                        eprintln!("Initialisation du logger systemd impossible: {err}");
                        env_logger::init_from_env(
                            env_logger::Env::default().default_filter_or(&config.log_level),
                        );
                    }
                }
            }

            #[cfg(not(feature = "systemd"))]
            {
                eprintln!(
                    "Mode systemd-journal indisponible (feature 'systemd' non activée), \
                     journalisation standard utilisée"
                );
                env_logger::init_from_env(
                    env_logger::Env::default().default_filter_or(&config.log_level),
                );
            }
        }
    }
}

/// Phase de récupération des sources
async fn run_fetch(config: &Config, config_path: &Path, notify: &NotifyHandle) -> anyhow::Result<()> {
    info!("Récupération des listes noires sources");

    if !config.sources_file.exists() {
        // Précondition manquante mais non fatale: le fichier actif
        // pré-installé sert de repli
        warn!(
            "Fichier de référence des sources introuvable: {}",
            config.sources_file.display()
        );
        notify
            .send(Notification::error(format!(
                "Blacklist sources file not found: {}",
                config.sources_file.display()
            )))
            .await;
        return Ok(());
    }

    fetcher::fetch_blacklists(&config.sources_file, &config.blacklist_dir)
        .context("phase de récupération")?;

    // Mémoriser la date de passage
    let mut stamped = config.clone();
    stamped.stamp_fetch();
    if let Err(err) = stamped.save_to(config_path) {
        warn!("Enregistrement de la date de récupération impossible: {err}");
    }

    Ok(())
}

/// Phase d'agrégation, avec restauration automatique en cas d'échec
async fn run_aggregate(config: &Config, notify: &NotifyHandle) -> anyhow::Result<()> {
    info!("Consolidation des adresses en liste noire");

    let store = blacklist::BlacklistStore::new(&config.blacklist_dir);
    match store.aggregate() {
        Ok(count) => {
            info!("Agrégation terminée: {count} adresses actives");
            Ok(())
        }
        Err(err) => {
            notify
                .send(Notification::error(format!(
                    "Failed during IP aggregation: {err}"
                )))
                .await;

            if err.is_fatal() {
                Err(err).context("phase d'agrégation")
            } else {
                // Le fichier actif précédent a été restauré: la
                // surveillance peut continuer sur ce jeu de données
                warn!("Agrégation échouée ({err}), liste noire précédente conservée");
                Ok(())
            }
        }
    }
}

/// Pipeline complet: fetch, aggregate, monitor
async fn run_pipeline(
    config: &Config,
    config_path: &Path,
    notify: &NotifyHandle,
) -> anyhow::Result<()> {
    run_fetch(config, config_path, notify).await?;
    run_aggregate(config, notify).await?;

    info!("Démarrage de la surveillance du trafic");
    monitor::run(config, notify.clone()).await
}
