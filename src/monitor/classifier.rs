//! Classification des trames capturées contre la liste noire
//!
//! Le classificateur détient une référence immuable à l'instantané courant
//! et produit toujours un verdict: une trame non IP ou tronquée est
//! ignorée, jamais remontée comme erreur. Le filtre de Bloom écarte
//! d'abord l'immense majorité du trafic légitime; seule une réponse
//! positive du filtre déclenche la vérification exacte.

use crate::blacklist::BlacklistSnapshot;
use crate::models::{CapturedFrame, MonitorStats, Verdict};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::ipv6::Ipv6Packet;
use pnet::packet::tcp::TcpPacket;
use pnet::packet::udp::UdpPacket;
use pnet::packet::Packet;
use std::net::IpAddr;
use std::sync::Arc;

pub struct PacketClassifier {
    snapshot: Arc<BlacklistSnapshot>,
    stats: Arc<MonitorStats>,
}

impl PacketClassifier {
    pub fn new(snapshot: Arc<BlacklistSnapshot>, stats: Arc<MonitorStats>) -> Self {
        Self { snapshot, stats }
    }

    /// Produit le verdict d'une trame
    pub fn classify(&self, frame: &CapturedFrame) -> Verdict {
        let (source, dest_port) = match parse_frame(&frame.data) {
            Some(parsed) => parsed,
            None => return Verdict::Ignore,
        };

        let address = source.to_string();

        // Réponse négative du filtre: définitivement absente, aucune
        // consultation de l'ensemble exact
        if !self.snapshot.filter_check(&address) {
            return Verdict::Clear;
        }

        if self.snapshot.is_member(&address) {
            Verdict::Match { source, dest_port }
        } else {
            // Faux positif du filtre, absorbé en silence
            self.stats.record_false_positive();
            Verdict::Clear
        }
    }
}

/// Extrait l'adresse source et, si l'en-tête de transport se laisse
/// analyser, le port de destination
pub fn parse_frame(data: &[u8]) -> Option<(IpAddr, Option<u16>)> {
    let ethernet = EthernetPacket::new(data)?;
    match ethernet.get_ethertype() {
        EtherTypes::Ipv4 => {
            let ip = Ipv4Packet::new(ethernet.payload())?;
            let port = dest_port(ip.get_next_level_protocol(), ip.payload());
            Some((IpAddr::V4(ip.get_source()), port))
        }
        EtherTypes::Ipv6 => {
            let ip = Ipv6Packet::new(ethernet.payload())?;
            let port = dest_port(ip.get_next_header(), ip.payload());
            Some((IpAddr::V6(ip.get_source()), port))
        }
        _ => None,
    }
}

// Port de destination TCP/UDP; l'enrichissement est optionnel, un en-tête
// absent ou tronqué donne simplement None
fn dest_port(protocol: IpNextHeaderProtocol, payload: &[u8]) -> Option<u16> {
    match protocol {
        IpNextHeaderProtocols::Tcp => TcpPacket::new(payload).map(|tcp| tcp.get_destination()),
        IpNextHeaderProtocols::Udp => UdpPacket::new(payload).map(|udp| udp.get_destination()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::ethernet::MutableEthernetPacket;
    use pnet::packet::ipv4::MutableIpv4Packet;
    use pnet::packet::tcp::MutableTcpPacket;
    use pnet::util::MacAddr;
    use std::collections::HashSet;
    use std::net::Ipv4Addr;
    use std::sync::atomic::Ordering;

    /// Construit une trame Ethernet/IPv4/TCP minimale
    fn tcp_frame(source: Ipv4Addr, dest_port: u16) -> Vec<u8> {
        let mut buffer = vec![0u8; 14 + 20 + 20];
        {
            let mut tcp =
                MutableTcpPacket::new(&mut buffer[34..]).unwrap();
            tcp.set_source(40000);
            tcp.set_destination(dest_port);
            tcp.set_data_offset(5);
        }
        {
            let mut ip = MutableIpv4Packet::new(&mut buffer[14..]).unwrap();
            ip.set_version(4);
            ip.set_header_length(5);
            ip.set_total_length(40);
            ip.set_ttl(64);
            ip.set_next_level_protocol(IpNextHeaderProtocols::Tcp);
            ip.set_source(source);
            ip.set_destination(Ipv4Addr::new(192, 168, 1, 1));
        }
        {
            let mut ethernet = MutableEthernetPacket::new(&mut buffer).unwrap();
            ethernet.set_source(MacAddr::new(2, 0, 0, 0, 0, 1));
            ethernet.set_destination(MacAddr::new(2, 0, 0, 0, 0, 2));
            ethernet.set_ethertype(EtherTypes::Ipv4);
        }
        buffer
    }

    fn arp_frame() -> Vec<u8> {
        let mut buffer = vec![0u8; 14 + 28];
        let mut ethernet = MutableEthernetPacket::new(&mut buffer).unwrap();
        ethernet.set_ethertype(EtherTypes::Arp);
        buffer
    }

    fn snapshot(addresses: &[&str]) -> Arc<BlacklistSnapshot> {
        let members: HashSet<String> = addresses.iter().map(|a| a.to_string()).collect();
        Arc::new(BlacklistSnapshot::from_members(members, 0.01).unwrap())
    }

    fn classifier(addresses: &[&str]) -> (PacketClassifier, Arc<MonitorStats>) {
        let stats = Arc::new(MonitorStats::default());
        (
            PacketClassifier::new(snapshot(addresses), stats.clone()),
            stats,
        )
    }

    fn frame_of(data: Vec<u8>) -> CapturedFrame {
        CapturedFrame::new("test0", data)
    }

    #[test]
    fn test_non_ip_frame_is_ignored() {
        let (classifier, _) = classifier(&["5.6.7.8"]);
        assert_eq!(classifier.classify(&frame_of(arp_frame())), Verdict::Ignore);
    }

    #[test]
    fn test_truncated_frame_is_ignored() {
        let (classifier, _) = classifier(&["5.6.7.8"]);
        // Trop courte pour un en-tête Ethernet
        assert_eq!(
            classifier.classify(&frame_of(vec![0u8; 6])),
            Verdict::Ignore
        );
        // En-tête Ethernet valide mais charge IPv4 tronquée
        let mut truncated = tcp_frame(Ipv4Addr::new(5, 6, 7, 8), 22);
        truncated.truncate(20);
        assert_eq!(
            classifier.classify(&frame_of(truncated)),
            Verdict::Ignore
        );
    }

    #[test]
    fn test_blacklisted_source_is_matched_with_port() {
        let (classifier, stats) = classifier(&["5.6.7.8", "9.9.9.9"]);
        let verdict = classifier.classify(&frame_of(tcp_frame(Ipv4Addr::new(5, 6, 7, 8), 22)));

        assert_eq!(
            verdict,
            Verdict::Match {
                source: IpAddr::V4(Ipv4Addr::new(5, 6, 7, 8)),
                dest_port: Some(22),
            }
        );
        assert_eq!(stats.filter_false_positives.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unlisted_source_is_clear() {
        let (classifier, _) = classifier(&["5.6.7.8"]);
        assert_eq!(
            classifier.classify(&frame_of(tcp_frame(Ipv4Addr::new(1, 1, 1, 1), 22))),
            Verdict::Clear
        );
    }

    #[test]
    fn test_filter_positive_without_membership_is_clear() {
        // On force un faux positif du filtre en y insérant une clé qui
        // n'appartient pas à l'ensemble exact
        let members: HashSet<String> = ["5.6.7.8".to_string()].into_iter().collect();
        let mut snapshot = BlacklistSnapshot::from_members(members, 0.01).unwrap();
        snapshot.filter_mut().add(b"1.2.3.4");

        let stats = Arc::new(MonitorStats::default());
        let classifier = PacketClassifier::new(Arc::new(snapshot), stats.clone());

        let verdict = classifier.classify(&frame_of(tcp_frame(Ipv4Addr::new(1, 2, 3, 4), 80)));
        assert_eq!(verdict, Verdict::Clear);
        assert_eq!(stats.filter_false_positives.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_parse_extracts_source_and_dest_port() {
        let data = tcp_frame(Ipv4Addr::new(10, 0, 0, 1), 443);
        let (source, port) = parse_frame(&data).unwrap();
        assert_eq!(source, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(port, Some(443));
    }
}
