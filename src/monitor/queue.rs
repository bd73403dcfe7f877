//! File de trames partagée entre capture et classification
//!
//! Une seule file FIFO bornée, alimentée par tous les threads de capture et
//! vidée par le pool de workers. La politique de débordement est un choix
//! de configuration explicite; chaque trame rejetée est comptée.

use crate::config::OverflowPolicy;
use crate::models::{CapturedFrame, MonitorStats};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::Arc;
use std::time::Duration;

/// Côté producteur de la file, un clone par thread de capture
#[derive(Clone)]
pub struct FrameSender {
    tx: Sender<CapturedFrame>,
    rx: Receiver<CapturedFrame>,
    policy: OverflowPolicy,
    stats: Arc<MonitorStats>,
}

/// Côté consommateur, un clone par worker
#[derive(Clone)]
pub struct FrameReceiver {
    rx: Receiver<CapturedFrame>,
}

/// Construit la file avec sa capacité et sa politique de débordement
pub fn frame_queue(
    capacity: usize,
    policy: OverflowPolicy,
    stats: Arc<MonitorStats>,
) -> (FrameSender, FrameReceiver) {
    let (tx, rx) = bounded(capacity);
    (
        FrameSender {
            tx,
            rx: rx.clone(),
            policy,
            stats,
        },
        FrameReceiver { rx },
    )
}

impl FrameSender {
    /// Dépose une trame en appliquant la politique de débordement
    pub fn push(&self, frame: CapturedFrame) {
        match self.policy {
            OverflowPolicy::Block => {
                // Le thread de capture attend une place; l'erreur ne peut
                // survenir qu'à l'arrêt, quand les workers ont disparu
                if self.tx.send(frame).is_err() {
                    self.stats.record_drop();
                }
            }
            OverflowPolicy::DropNewest => {
                if let Err(TrySendError::Full(_)) = self.tx.try_send(frame) {
                    self.stats.record_drop();
                }
            }
            OverflowPolicy::DropOldest => {
                let mut frame = frame;
                loop {
                    match self.tx.try_send(frame) {
                        Ok(()) => break,
                        Err(TrySendError::Full(rejected)) => {
                            // On libère une place en sacrifiant la trame la
                            // plus ancienne encore en file
                            if self.rx.try_recv().is_ok() {
                                self.stats.record_drop();
                            }
                            frame = rejected;
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            self.stats.record_drop();
                            break;
                        }
                    }
                }
            }
        }
    }
}

impl FrameReceiver {
    /// Retire une trame, en attente bornée pour laisser le worker observer
    /// le drapeau d'arrêt
    pub fn recv_timeout(&self, timeout: Duration) -> Result<CapturedFrame, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Nombre de trames actuellement en file
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    fn frame(tag: u8) -> CapturedFrame {
        CapturedFrame::new("test0", vec![tag])
    }

    #[test]
    fn test_drop_newest_discards_incoming_frame() {
        let stats = Arc::new(MonitorStats::default());
        let (sender, receiver) = frame_queue(2, OverflowPolicy::DropNewest, stats.clone());

        sender.push(frame(1));
        sender.push(frame(2));
        sender.push(frame(3));

        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(10)).unwrap().data,
            vec![1]
        );
        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(10)).unwrap().data,
            vec![2]
        );
        assert!(receiver.recv_timeout(Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_drop_oldest_keeps_incoming_frame() {
        let stats = Arc::new(MonitorStats::default());
        let (sender, receiver) = frame_queue(2, OverflowPolicy::DropOldest, stats.clone());

        sender.push(frame(1));
        sender.push(frame(2));
        sender.push(frame(3));

        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 1);
        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(10)).unwrap().data,
            vec![2]
        );
        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(10)).unwrap().data,
            vec![3]
        );
    }

    #[test]
    fn test_block_waits_for_consumer() {
        let stats = Arc::new(MonitorStats::default());
        let (sender, receiver) = frame_queue(1, OverflowPolicy::Block, stats.clone());

        sender.push(frame(1));

        let producer = std::thread::spawn(move || {
            sender.push(frame(2));
        });

        // Le producteur est suspendu tant que la file est pleine
        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());

        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(100)).unwrap().data,
            vec![1]
        );
        producer.join().unwrap();

        assert_eq!(stats.frames_dropped.load(Ordering::Relaxed), 0);
        assert_eq!(
            receiver.recv_timeout(Duration::from_millis(100)).unwrap().data,
            vec![2]
        );
    }

    #[test]
    fn test_fifo_order_is_preserved() {
        let stats = Arc::new(MonitorStats::default());
        let (sender, receiver) = frame_queue(16, OverflowPolicy::DropNewest, stats);

        for tag in 0..8 {
            sender.push(frame(tag));
        }
        for tag in 0..8 {
            assert_eq!(
                receiver.recv_timeout(Duration::from_millis(10)).unwrap().data,
                vec![tag]
            );
        }
    }
}
