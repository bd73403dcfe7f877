//! Blocage pare-feu des adresses détectées
//!
//! Les règles de rejet vivent dans une chaîne iptables dédiée, créée au
//! démarrage et atteinte depuis `INPUT`. L'insertion est idempotente: une
//! adresse déjà présente dans l'ensemble en mémoire, ou déjà couverte par
//! une règle de la chaîne, n'est jamais réinsérée. Aucune règle n'est
//! retirée par le processus; la purge de la chaîne reste un geste
//! opérateur.

use dashmap::DashSet;
use log::{debug, info, warn};
use std::net::IpAddr;
use std::process::Command;

/// Résultat d'une demande de blocage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Règle insérée dans la chaîne
    Added,
    /// Adresse déjà bloquée, aucune commande exécutée
    AlreadyBlocked,
}

/// Pilote de la chaîne iptables dédiée
#[derive(Debug)]
pub struct FirewallBlocker {
    chain: String,
    blocked: DashSet<IpAddr>,
}

impl FirewallBlocker {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
            blocked: DashSet::new(),
        }
    }

    /// Prépare la chaîne dédiée et son raccordement à `INPUT`
    ///
    /// Les échecs sont journalisés mais non fatals: sans privilèges ou sans
    /// iptables, la surveillance continue en mode notification seule.
    pub fn setup(&self) {
        // La création échoue sans gravité si la chaîne existe déjà
        let _ = Command::new("iptables")
            .args(["-N", &self.chain])
            .output();

        let jump_present = Command::new("iptables")
            .args(["-C", "INPUT", "-j", &self.chain])
            .status()
            .map(|status| status.success())
            .unwrap_or(false);

        if !jump_present {
            match Command::new("iptables")
                .args(["-A", "INPUT", "-j", &self.chain])
                .status()
            {
                Ok(status) if status.success() => {
                    info!("Chaîne pare-feu {} raccordée à INPUT", self.chain);
                }
                Ok(status) => {
                    warn!(
                        "Raccordement de la chaîne {} refusé (code {status})",
                        self.chain
                    );
                }
                Err(error) => {
                    warn!("Commande iptables indisponible: {error}");
                }
            }
        }
    }

    /// Insère une règle de rejet pour l'adresse, au plus une fois
    pub fn block(&self, address: IpAddr) -> anyhow::Result<BlockOutcome> {
        if self.blocked.contains(&address) {
            debug!("Adresse {address} déjà bloquée, commande ignorée");
            return Ok(BlockOutcome::AlreadyBlocked);
        }

        let command = match address {
            IpAddr::V4(_) => "iptables",
            IpAddr::V6(_) => "ip6tables",
        };
        let addr_text = address.to_string();

        // Une règle posée par un passage précédent du processus compte
        // comme déjà bloquée
        let rule_present = Command::new(command)
            .args(["-C", &self.chain, "-s", &addr_text, "-j", "DROP"])
            .status()
            .map(|status| status.success())
            .unwrap_or(false);

        if rule_present {
            self.blocked.insert(address);
            debug!("Règle déjà présente pour {address}");
            return Ok(BlockOutcome::AlreadyBlocked);
        }

        let status = Command::new(command)
            .args(["-A", &self.chain, "-s", &addr_text, "-j", "DROP"])
            .status()?;

        if !status.success() {
            anyhow::bail!("{command} a retourné le code {status} pour {address}");
        }

        self.blocked.insert(address);
        info!("Adresse {address} bloquée dans la chaîne {}", self.chain);
        Ok(BlockOutcome::Added)
    }

    /// Marque une adresse comme déjà bloquée sans exécuter de commande
    #[cfg(test)]
    pub(crate) fn mark_blocked(&self, address: IpAddr) {
        self.blocked.insert(address);
    }

    /// Nombre d'adresses bloquées depuis le démarrage
    pub fn blocked_count(&self) -> usize {
        self.blocked.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_known_address_short_circuits() {
        let blocker = FirewallBlocker::new("IPSENTRY_TEST");
        let address = IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8));

        blocker.mark_blocked(address);

        // Aucune commande n'est exécutée pour une adresse déjà connue
        let outcome = blocker.block(address).unwrap();
        assert_eq!(outcome, BlockOutcome::AlreadyBlocked);
        assert_eq!(blocker.blocked_count(), 1);
    }
}
