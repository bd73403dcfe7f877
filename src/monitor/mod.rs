//! Phase de surveillance du trafic
//!
//! Charge l'instantané de la liste noire, démarre une source de capture par
//! interface et un pool fixe de workers de classification, puis attend le
//! signal d'arrêt. L'instantané est partagé en lecture seule pendant toute
//! la session de capture; le recharger demande un redémarrage du processus.

mod capture;
mod classifier;
mod queue;

pub use classifier::{parse_frame, PacketClassifier};
pub use queue::{frame_queue, FrameReceiver, FrameSender};

use crate::actions::ActionSink;
use crate::blacklist::{BlacklistSnapshot, BlacklistStore};
use crate::config::Config;
use crate::firewall::FirewallBlocker;
use crate::models::{MonitorStats, Notification, Verdict};
use crate::notifier::NotifyHandle;
use anyhow::Context;
use crossbeam_channel::RecvTimeoutError;
use log::{debug, info};
use num_format::{Locale, ToFormattedString};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

// Période d'observation du drapeau d'arrêt par les workers
const WORKER_POLL: Duration = Duration::from_millis(500);

/// Lance la surveillance et bloque jusqu'au signal d'arrêt (Ctrl-C)
pub async fn run(config: &Config, notify: NotifyHandle) -> anyhow::Result<()> {
    let store = BlacklistStore::new(&config.blacklist_dir);
    let snapshot = match BlacklistSnapshot::load(&store.active_path(), config.fp_probability) {
        Ok(snapshot) => Arc::new(snapshot),
        Err(err) => {
            notify
                .send(Notification::error(format!(
                    "Fatal error in traffic monitor: {err}"
                )))
                .await;
            return Err(err).context("chargement de la liste noire active");
        }
    };

    let devices = capture::discover_devices(&config.interface_prefixes)
        .context("énumération des interfaces réseau")?;
    if devices.is_empty() {
        notify
            .send(Notification::error(
                "No network interfaces found to monitor",
            ))
            .await;
        anyhow::bail!("aucune interface réseau à surveiller");
    }

    let stats = Arc::new(MonitorStats::default());
    let shutdown = Arc::new(AtomicBool::new(false));
    let (sender, receiver) = queue::frame_queue(
        config.queue_capacity,
        config.overflow_policy,
        stats.clone(),
    );

    // Pare-feu uniquement dans le déploiement avec blocage
    let firewall = if config.block_enabled {
        let blocker = Arc::new(FirewallBlocker::new(config.firewall_chain.clone()));
        blocker.setup();
        Some(blocker)
    } else {
        None
    };

    let sink = Arc::new(ActionSink::new(
        notify.clone(),
        firewall.clone(),
        stats.clone(),
    ));
    let classifier = Arc::new(PacketClassifier::new(snapshot.clone(), stats.clone()));

    let mut handles: Vec<JoinHandle<()>> = Vec::new();

    for device in devices {
        handles.push(capture::spawn_capture(
            device,
            sender.clone(),
            shutdown.clone(),
            notify.clone(),
            stats.clone(),
        ));
    }
    // Seuls les threads de capture produisent
    drop(sender);

    for worker_id in 0..config.effective_workers() {
        handles.push(spawn_worker(
            worker_id,
            receiver.clone(),
            classifier.clone(),
            sink.clone(),
            shutdown.clone(),
            stats.clone(),
        ));
    }

    info!(
        "Surveillance active: {} adresses en liste noire, {} workers",
        snapshot.len(),
        config.effective_workers()
    );
    notify
        .send(Notification::info("Starting traffic monitor"))
        .await;

    // Le processus ne s'arrête jamais de lui-même: seul un signal externe
    // met fin à la surveillance
    tokio::signal::ctrl_c()
        .await
        .context("attente du signal d'arrêt")?;

    info!("Signal d'arrêt reçu, fermeture des sources de capture");
    shutdown.store(true, Ordering::Relaxed);
    for handle in handles {
        let _ = handle.join();
    }

    print_summary(&stats, firewall.as_deref());
    Ok(())
}

// Boucle d'un worker: retirer une trame, la classifier, réagir sur un
// verdict positif; une erreur sur une trame ne termine jamais le worker
fn spawn_worker(
    worker_id: usize,
    receiver: FrameReceiver,
    classifier: Arc<PacketClassifier>,
    sink: Arc<ActionSink>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<MonitorStats>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        debug!("Worker de classification {worker_id} démarré");
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            let frame = match receiver.recv_timeout(WORKER_POLL) {
                Ok(frame) => frame,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };

            stats.record_classified();
            match classifier.classify(&frame) {
                Verdict::Match { source, dest_port } => sink.on_match(source, dest_port),
                Verdict::Clear | Verdict::Ignore => {}
            }
        }
        debug!("Worker de classification {worker_id} arrêté");
    })
}

// Bilan de la session de capture
fn print_summary(stats: &MonitorStats, firewall: Option<&FirewallBlocker>) {
    println!("\n=== Bilan de la surveillance ===");
    println!(
        "Trames capturées: {}",
        stats
            .frames_captured
            .load(Ordering::Relaxed)
            .to_formatted_string(&Locale::fr)
    );
    println!(
        "Trames classifiées: {}",
        stats
            .frames_classified
            .load(Ordering::Relaxed)
            .to_formatted_string(&Locale::fr)
    );
    println!(
        "Trames rejetées (file pleine): {}",
        stats
            .frames_dropped
            .load(Ordering::Relaxed)
            .to_formatted_string(&Locale::fr)
    );
    println!(
        "Correspondances confirmées: {}",
        stats
            .matches
            .load(Ordering::Relaxed)
            .to_formatted_string(&Locale::fr)
    );
    println!(
        "Faux positifs du filtre absorbés: {}",
        stats
            .filter_false_positives
            .load(Ordering::Relaxed)
            .to_formatted_string(&Locale::fr)
    );
    if let Some(firewall) = firewall {
        println!(
            "Adresses bloquées au pare-feu: {}",
            firewall.blocked_count().to_formatted_string(&Locale::fr)
        );
    }
}
