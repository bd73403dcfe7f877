//! Livraison des notifications à l'opérateur
//!
//! Les composants du pipeline déposent leurs notifications dans un canal
//! interne; une tâche unique les délivre via la stratégie configurée:
//! appel direct de `notify-send`, ou écriture d'une ligne JSON dans le tube
//! nommé du démon de notification. Une erreur de livraison est journalisée
//! et n'arrête jamais le pipeline.

use crate::config::{Config, NotifyMode};
use crate::models::Notification;
use async_trait::async_trait;
use log::{info, warn};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Stratégie de livraison d'une notification
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Livraison directe via la commande `notify-send`
pub struct DesktopChannel;

#[async_trait]
impl NotificationChannel for DesktopChannel {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let status = tokio::process::Command::new("notify-send")
            .arg(format!("--urgency={}", notification.kind.urgency()))
            .arg(&notification.title)
            .arg(&notification.message)
            .status()
            .await?;

        if !status.success() {
            anyhow::bail!("notify-send a retourné le code {status}");
        }

        info!(
            "Notification envoyée: {} - {}",
            notification.title, notification.message
        );
        Ok(())
    }
}

/// Livraison par ligne JSON dans un tube nommé
///
/// Le tube appartient au démon de notification; il n'est jamais créé ici.
/// L'ouverture est non bloquante: sans lecteur de l'autre côté, l'écriture
/// échoue immédiatement au lieu de suspendre la tâche de livraison.
pub struct PipeChannel {
    path: PathBuf,
}

impl PipeChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

// Ouvre le tube en écriture non bloquante et y dépose une ligne; échoue
// immédiatement (ENXIO) si aucun lecteur n'est attaché
fn write_pipe_line(path: &std::path::Path, line: &str) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut pipe = std::fs::OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)?;
    writeln!(pipe, "{line}")
}

#[async_trait]
impl NotificationChannel for PipeChannel {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()> {
        let line = serde_json::to_string(notification)?;
        let path = self.path.clone();

        // L'ouverture du tube est une E/S bloquante classique
        tokio::task::spawn_blocking(move || write_pipe_line(&path, &line)).await??;

        info!(
            "Notification écrite dans le tube: {} - {}",
            notification.title, notification.message
        );
        Ok(())
    }
}

/// Poignée d'envoi partagée par les composants du pipeline
///
/// `send` s'utilise depuis le contexte asynchrone, `send_blocking` depuis
/// les threads de capture et de classification. Dans les deux cas un canal
/// saturé ou fermé est une défaillance douce.
#[derive(Clone)]
pub struct NotifyHandle {
    tx: mpsc::Sender<Notification>,
}

impl NotifyHandle {
    pub async fn send(&self, notification: Notification) {
        if let Err(error) = self.tx.send(notification).await {
            warn!("Notification abandonnée, canal fermé: {error}");
        }
    }

    pub fn send_blocking(&self, notification: Notification) {
        if let Err(error) = self.tx.blocking_send(notification) {
            warn!("Notification abandonnée, canal fermé: {error}");
        }
    }
}

/// Crée le canal interne sans démarrer de tâche de livraison
///
/// Utile aux harnais de test qui veulent observer les notifications émises
/// par le pipeline.
pub fn channel(capacity: usize) -> (NotifyHandle, mpsc::Receiver<Notification>) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotifyHandle { tx }, rx)
}

/// Démarre la tâche de livraison et retourne la poignée d'envoi
///
/// La tâche se termine d'elle-même quand toutes les poignées sont lâchées.
pub fn spawn(config: &Config) -> (NotifyHandle, JoinHandle<()>) {
    let channel: Arc<dyn NotificationChannel> = match config.notify_mode {
        NotifyMode::Desktop => Arc::new(DesktopChannel),
        NotifyMode::Pipe => Arc::new(PipeChannel::new(config.notification_pipe.clone())),
    };

    let (tx, mut rx) = mpsc::channel::<Notification>(config.notification_queue_size);

    let task = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if notification.message.is_empty() {
                warn!("Notification sans message, ignorée");
                continue;
            }
            if let Err(error) = channel.deliver(&notification).await {
                warn!("Échec de livraison de la notification: {error}");
            }
        }
    });

    (NotifyHandle { tx }, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NotificationKind;

    #[test]
    fn test_pipe_line_is_single_json_object() {
        let notification = Notification::new("Starting traffic monitor", NotificationKind::Information);
        let line = serde_json::to_string(&notification).unwrap();

        let parsed: Notification = serde_json::from_str(&line).unwrap();
        assert_eq!(parsed.message, "Starting traffic monitor");
        assert_eq!(parsed.kind, NotificationKind::Information);
    }

    #[test]
    fn test_pipe_without_reader_fails_softly() {
        // Un chemin inexistant doit produire une erreur immédiate, pas un blocage
        let path = std::path::Path::new("/nonexistent/notifications.fifo");
        assert!(write_pipe_line(path, "{}").is_err());
    }

    #[tokio::test]
    async fn test_handle_survives_closed_channel() {
        let (tx, rx) = mpsc::channel::<Notification>(1);
        drop(rx);
        let handle = NotifyHandle { tx };
        // Ne doit ni paniquer ni retourner d'erreur
        handle.send(Notification::info("test")).await;
    }
}
