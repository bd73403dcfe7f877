use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Agent de surveillance du trafic réseau basé sur des listes noires
#[derive(Parser, Debug)]
#[command(name = "ipsentry", version, about)]
pub struct Cli {
    /// Chemin du fichier de configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Télécharge et normalise les listes noires sources
    Fetch,
    /// Agrège les fichiers sources en un fichier actif unique
    Aggregate,
    /// Surveille le trafic des interfaces contre la liste noire active
    Monitor,
    /// Enchaîne les trois phases: fetch, aggregate, monitor
    Run,
}
