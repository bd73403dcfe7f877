//! Réactions aux correspondances confirmées
//!
//! Invoqué par les workers uniquement sur un verdict `Match`: émet une
//! notification d'avertissement et, dans le déploiement avec blocage,
//! demande au pare-feu de rejeter l'adresse. Aucune défaillance d'un
//! collaborateur n'arrête le pipeline.

use crate::firewall::FirewallBlocker;
use crate::models::{MonitorStats, Notification};
use crate::notifier::NotifyHandle;
use log::{error, warn};
use std::net::IpAddr;
use std::sync::Arc;

pub struct ActionSink {
    notify: NotifyHandle,
    firewall: Option<Arc<FirewallBlocker>>,
    stats: Arc<MonitorStats>,
}

impl ActionSink {
    pub fn new(
        notify: NotifyHandle,
        firewall: Option<Arc<FirewallBlocker>>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            notify,
            firewall,
            stats,
        }
    }

    /// Traite une correspondance confirmée sur une trame
    ///
    /// Appelé depuis les threads de classification; l'envoi de la
    /// notification passe par le canal interne en mode bloquant.
    pub fn on_match(&self, source: IpAddr, dest_port: Option<u16>) {
        self.stats.record_match();

        let message = match dest_port {
            Some(port) => format!("Suspicious IP detected: {source} (dest port {port})"),
            None => format!("Suspicious IP detected: {source}"),
        };
        warn!("{message}");
        self.notify.send_blocking(Notification::warning(message));

        if let Some(firewall) = &self.firewall {
            if let Err(err) = firewall.block(source) {
                // Le trafic de cette adresse reste accepté tant que la
                // règle n'est pas posée
                error!("Blocage pare-feu échoué pour {source}: {err}");
            }
        }
    }
}
