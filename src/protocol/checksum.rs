//! Single-digit checksum framing shared by the inbound and outbound links.
//!
//! A payload is a fixed run of ASCII digits. Its checksum is the sum of the
//! digit values modulo 10, carried as one letter offset from a base that
//! also identifies the frame kind: `'A'` for date frames, `'a'` for time
//! frames.

/// Number of payload digits in an outbound frame.
pub const PAYLOAD_LEN: usize = 6;
/// Payload plus the trailing checksum character.
pub const FRAME_LEN: usize = PAYLOAD_LEN + 1;

/// Sum of the digit values modulo 10. Non-digit bytes count as zero.
pub fn checksum(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .filter(|b| b.is_ascii_digit())
        .map(|b| u32::from(b - b'0'))
        .sum();
    (sum % 10) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// `DDMMYY`
    Date,
    /// `HHMMSS`
    Time,
}

impl FrameKind {
    pub fn base(self) -> u8 {
        match self {
            FrameKind::Date => b'A',
            FrameKind::Time => b'a',
        }
    }

    pub fn flipped(self) -> Self {
        match self {
            FrameKind::Date => FrameKind::Time,
            FrameKind::Time => FrameKind::Date,
        }
    }

    /// Recover the frame kind from a checksum character.
    pub fn from_check_byte(byte: u8) -> Option<Self> {
        match byte {
            b'A'..=b'J' => Some(FrameKind::Date),
            b'a'..=b'j' => Some(FrameKind::Time),
            _ => None,
        }
    }
}

/// A complete 7-byte outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundFrame {
    kind: FrameKind,
    bytes: [u8; FRAME_LEN],
}

impl OutboundFrame {
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[..PAYLOAD_LEN]
    }

    pub fn check_byte(&self) -> u8 {
        self.bytes[PAYLOAD_LEN]
    }
}

impl std::fmt::Display for OutboundFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Every byte is ASCII by construction.
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

/// Append the kind-specific checksum character to a 6-digit payload.
///
/// Returns `None` when the payload contains anything other than ASCII
/// digits.
pub fn encode(kind: FrameKind, payload: [u8; PAYLOAD_LEN]) -> Option<OutboundFrame> {
    if !payload.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let mut bytes = [0u8; FRAME_LEN];
    bytes[..PAYLOAD_LEN].copy_from_slice(&payload);
    bytes[PAYLOAD_LEN] = kind.base() + checksum(&payload);
    Some(OutboundFrame { kind, bytes })
}

/// Recompute the checksum of a received frame.
///
/// Returns the frame kind on success. A mismatch is a drop condition: the
/// sender produces a fresh frame every second, so nothing is retried.
pub fn verify(frame: &[u8]) -> Option<FrameKind> {
    if frame.len() != FRAME_LEN {
        return None;
    }
    let (payload, check) = frame.split_at(PAYLOAD_LEN);
    if !payload.iter().all(u8::is_ascii_digit) {
        return None;
    }
    let kind = FrameKind::from_check_byte(check[0])?;
    if check[0] - kind.base() == checksum(payload) {
        Some(kind)
    } else {
        tracing::debug!(
            "Checksum mismatch on frame {:?}",
            String::from_utf8_lossy(frame)
        );
        None
    }
}
