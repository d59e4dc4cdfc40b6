// Byte-level behaviour of the inbound config protocol and outbound frames

use ntp_relay::protocol::{ConfigIngestor, FrameKind, checksum, encode, verify};

fn feed_all(ingestor: &mut ConfigIngestor, bytes: &[u8]) -> (usize, Vec<ntp_relay::server_config::ServerConfig>) {
    let mut acks = 0;
    let mut configs = Vec::new();
    for &byte in bytes {
        if let Some(outcome) = ingestor.push(byte) {
            if outcome.acknowledge {
                acks += 1;
            }
            configs.extend(outcome.config);
        }
    }
    (acks, configs)
}

#[test]
fn full_sequence_yields_both_addresses() {
    let mut ingestor = ConfigIngestor::new();
    let (acks, configs) = feed_all(&mut ingestor, b"192168u001002y192169w001001x");
    assert_eq!(acks, 4);
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].primary().as_str(), "192.168.1.2");
    assert_eq!(
        configs[0].secondary().map(|a| a.as_str()),
        Some("192.169.1.1")
    );
    assert!(ingestor.buffer().is_empty());
}

#[test]
fn noise_between_fragments_is_ignored() {
    let mut ingestor = ConfigIngestor::new();
    let (acks, configs) = feed_all(&mut ingestor, b"19\r\n2168u 001002y\n192169w-001001x");
    assert_eq!(acks, 4);
    assert_eq!(configs.len(), 1);
}

#[test]
fn sequence_without_primary_is_dropped() {
    let mut ingestor = ConfigIngestor::new();
    let (acks, configs) = feed_all(&mut ingestor, b"192169w001001x");
    assert_eq!(acks, 2);
    assert!(configs.is_empty());
    assert!(ingestor.buffer().is_empty());

    // The master can start over.
    let (_, configs) = feed_all(&mut ingestor, b"192168u001002y192169w001001x");
    assert_eq!(configs.len(), 1);
}

#[test]
fn overlong_fragment_is_not_acked() {
    let mut ingestor = ConfigIngestor::new();
    let (acks, configs) = feed_all(&mut ingestor, b"1921680u");
    assert_eq!(acks, 0);
    assert!(configs.is_empty());
}

#[test]
fn every_encoded_frame_verifies() {
    for payload in [*b"000000", *b"140725", *b"235959", *b"999999"] {
        for kind in [FrameKind::Date, FrameKind::Time] {
            let frame = encode(kind, payload).unwrap();
            assert_eq!(frame.check_byte() - kind.base(), checksum(&payload));
            assert_eq!(verify(frame.as_bytes()), Some(kind));
        }
    }
}

#[test]
fn corrupted_frame_is_rejected() {
    let frame = encode(FrameKind::Date, *b"140725").unwrap();
    let mut bytes = frame.as_bytes().to_vec();
    bytes[0] = b'2';
    assert_eq!(verify(&bytes), None);
}
