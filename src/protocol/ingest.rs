//! Inbound configuration protocol from the master board.
//!
//! The master sends two server addresses as four digit fragments, each
//! closed by a tag character:
//!
//! ```text
//! 192168u 001002y 192169w 001001x
//! ```
//!
//! `u`/`y` carry the first and second half of the primary address, `w`/`x`
//! those of the secondary. Each 6-digit fragment holds two 3-digit decimal
//! octets, so the line above configures `192.168.1.2` and `192.169.1.1`.
//! Completing the `x` fragment applies the whole configuration.

use crate::server_config::{Address, MIN_USABLE_ADDRESS_LEN, ServerConfig};

/// Digits in a well-formed fragment.
pub const FRAGMENT_LEN: usize = 6;

/// Reply written to the master after every well-formed fragment.
pub const ACK: &[u8] = b"ACK\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentTag {
    Addr1Part1,
    Addr1Part2,
    Addr2Part1,
    Addr2Part2,
}

impl FragmentTag {
    pub fn from_terminator(byte: u8) -> Option<Self> {
        match byte {
            b'u' => Some(FragmentTag::Addr1Part1),
            b'y' => Some(FragmentTag::Addr1Part2),
            b'w' => Some(FragmentTag::Addr2Part1),
            b'x' => Some(FragmentTag::Addr2Part2),
            _ => None,
        }
    }

    pub fn terminator(self) -> char {
        match self {
            FragmentTag::Addr1Part1 => 'u',
            FragmentTag::Addr1Part2 => 'y',
            FragmentTag::Addr2Part1 => 'w',
            FragmentTag::Addr2Part2 => 'x',
        }
    }

    fn slot(self) -> (usize, usize) {
        match self {
            FragmentTag::Addr1Part1 => (0, 0),
            FragmentTag::Addr1Part2 => (0, 1),
            FragmentTag::Addr2Part1 => (1, 0),
            FragmentTag::Addr2Part2 => (1, 1),
        }
    }
}

/// A fragment closed by a terminator, valid or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompletedFragment {
    tag: FragmentTag,
    digits: [u8; FRAGMENT_LEN],
    len: usize,
    overflowed: bool,
}

impl CompletedFragment {
    pub fn tag(&self) -> FragmentTag {
        self.tag
    }

    /// The accumulated digits, possibly fewer than six.
    pub fn digits(&self) -> &[u8] {
        &self.digits[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Exactly six digits and no digits dropped on the way.
    pub fn is_well_formed(&self) -> bool {
        self.len == FRAGMENT_LEN && !self.overflowed
    }
}

impl std::fmt::Display for CompletedFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}",
            String::from_utf8_lossy(self.digits()),
            self.tag.terminator()
        )
    }
}

/// Decode a 6-digit fragment into `"o1.o2"`. Octets above 255 pass through.
pub fn decode_octet_pair(digits: &[u8; FRAGMENT_LEN]) -> String {
    let group = |chunk: &[u8]| {
        chunk
            .iter()
            .fold(0u32, |acc, d| acc * 10 + u32::from(d - b'0'))
    };
    format!("{}.{}", group(&digits[..3]), group(&digits[3..]))
}

/// Join two decoded fragments; degenerate results are rejected.
pub fn assemble_address(
    first: &[u8; FRAGMENT_LEN],
    second: &[u8; FRAGMENT_LEN],
) -> Option<Address> {
    let joined = format!("{}.{}", decode_octet_pair(first), decode_octet_pair(second));
    (joined.len() > MIN_USABLE_ADDRESS_LEN).then(|| Address::new(joined))
}

/// Fragments received so far, one slot per address half.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundAssemblyBuffer {
    parts: [[Option<[u8; FRAGMENT_LEN]>; 2]; 2],
}

impl InboundAssemblyBuffer {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().flatten().all(Option::is_none)
    }

    fn store(&mut self, fragment: &CompletedFragment) {
        let (addr, part) = fragment.tag.slot();
        self.parts[addr][part] = if fragment.is_well_formed() {
            Some(fragment.digits)
        } else {
            None
        };
    }

    fn address(&self, addr: usize) -> Option<Address> {
        match &self.parts[addr] {
            [Some(first), Some(second)] => assemble_address(first, second),
            _ => None,
        }
    }

    fn has_both(&self, addr: usize) -> bool {
        self.parts[addr].iter().all(Option::is_some)
    }

    /// Stored fragments in wire form, for diagnostics.
    pub fn pending(&self) -> Vec<String> {
        const TAGS: [[FragmentTag; 2]; 2] = [
            [FragmentTag::Addr1Part1, FragmentTag::Addr1Part2],
            [FragmentTag::Addr2Part1, FragmentTag::Addr2Part2],
        ];
        let mut out = Vec::new();
        for (addr, slots) in self.parts.iter().enumerate() {
            for (part, slot) in slots.iter().enumerate() {
                if let Some(digits) = slot {
                    out.push(format!(
                        "{}{}",
                        String::from_utf8_lossy(digits),
                        TAGS[addr][part].terminator()
                    ));
                }
            }
        }
        out
    }
}

/// Result of pushing one byte through the ingestor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub fragment: CompletedFragment,
    /// Whether the master should receive [`ACK`].
    pub acknowledge: bool,
    pub config: Option<ServerConfig>,
}

#[derive(Debug, Default)]
pub struct ConfigIngestor {
    accumulator: [u8; FRAGMENT_LEN],
    len: usize,
    overflowed: bool,
    buffer: InboundAssemblyBuffer,
}

impl ConfigIngestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate one byte; a terminator closes and returns the fragment.
    ///
    /// Digits beyond the sixth mark the fragment as overflowed. Bytes that
    /// are neither digits nor terminators are ignored.
    pub fn feed(&mut self, byte: u8) -> Option<CompletedFragment> {
        if byte.is_ascii_digit() {
            if self.len < FRAGMENT_LEN {
                self.accumulator[self.len] = byte;
                self.len += 1;
            } else {
                self.overflowed = true;
            }
            return None;
        }
        let tag = FragmentTag::from_terminator(byte)?;
        let fragment = CompletedFragment {
            tag,
            digits: self.accumulator,
            len: self.len,
            overflowed: self.overflowed,
        };
        self.accumulator = [0; FRAGMENT_LEN];
        self.len = 0;
        self.overflowed = false;
        Some(fragment)
    }

    /// Store a closed fragment; returns a configuration once the secondary
    /// address completes.
    ///
    /// Completing the secondary always consumes the buffer. If the primary
    /// is incomplete at that point the whole sequence is dropped and the
    /// master has to start over.
    pub fn apply_if_complete(&mut self, fragment: &CompletedFragment) -> Option<ServerConfig> {
        self.buffer.store(fragment);
        if !fragment.is_well_formed() {
            tracing::debug!("Discarding malformed fragment {}", fragment);
            return None;
        }
        match fragment.tag {
            FragmentTag::Addr1Part2 => {
                if let Some(primary) = self.buffer.address(0) {
                    tracing::info!("Primary address assembled: {}", primary);
                }
                None
            }
            FragmentTag::Addr2Part2 if self.buffer.has_both(1) => {
                let secondary = self.buffer.address(1);
                let primary = self.buffer.address(0);
                self.buffer.clear();
                match primary {
                    Some(primary) => {
                        tracing::info!(
                            "Configuration complete: primary {} secondary {}",
                            primary,
                            secondary.as_ref().map_or("none", Address::as_str)
                        );
                        Some(ServerConfig::new(primary, secondary))
                    }
                    None => {
                        tracing::warn!("Secondary address complete without a primary, sequence dropped");
                        None
                    }
                }
            }
            _ => None,
        }
    }

    /// Feed a byte and, if it closed a fragment, apply it.
    pub fn push(&mut self, byte: u8) -> Option<IngestOutcome> {
        let fragment = self.feed(byte)?;
        tracing::debug!("Fragment from master: {}", fragment);
        let acknowledge = fragment.is_well_formed();
        let config = self.apply_if_complete(&fragment);
        Some(IngestOutcome {
            fragment,
            acknowledge,
            config,
        })
    }

    pub fn buffer(&self) -> &InboundAssemblyBuffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_all(ingestor: &mut ConfigIngestor, input: &[u8]) -> Vec<IngestOutcome> {
        input.iter().filter_map(|b| ingestor.push(*b)).collect()
    }

    #[test]
    fn decodes_reference_sequence() {
        let mut ingestor = ConfigIngestor::new();
        let outcomes = push_all(&mut ingestor, b"192168u001002y192169w001001x");
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes.iter().all(|o| o.acknowledge));
        let config = outcomes[3].config.clone().unwrap();
        assert_eq!(config.primary().as_str(), "192.168.1.2");
        assert_eq!(config.secondary().unwrap().as_str(), "192.169.1.1");
        assert!(outcomes[..3].iter().all(|o| o.config.is_none()));
        assert!(ingestor.buffer().is_empty());
    }

    #[test]
    fn short_fragment_is_returned_unpadded_and_not_acked() {
        let mut ingestor = ConfigIngestor::new();
        let fragment = b"1921u".iter().find_map(|b| ingestor.feed(*b)).unwrap();
        assert_eq!(fragment.digits(), b"1921");
        assert_eq!(fragment.tag(), FragmentTag::Addr1Part1);
        assert!(!fragment.is_well_formed());

        let outcome = ingestor.push(b'y').unwrap();
        assert!(outcome.fragment.is_empty());
        assert!(!outcome.acknowledge);
    }

    #[test]
    fn overflowing_fragment_is_malformed() {
        let mut ingestor = ConfigIngestor::new();
        let outcomes = push_all(&mut ingestor, b"1921680u");
        assert_eq!(outcomes.len(), 1);
        assert!(!outcomes[0].acknowledge);
        assert_eq!(outcomes[0].fragment.digits(), b"192168");
        assert!(ingestor.buffer().is_empty());
    }

    #[test]
    fn octets_are_not_range_checked() {
        assert_eq!(decode_octet_pair(b"999300"), "999.300");
        assert_eq!(decode_octet_pair(b"010007"), "10.7");
    }

    #[test]
    fn degenerate_address_is_rejected() {
        assert_eq!(assemble_address(b"000000", b"000000"), None);
        assert_eq!(
            assemble_address(b"010000", b"000001").unwrap().as_str(),
            "10.0.0.1"
        );
    }

    #[test]
    fn incomplete_primary_discards_sequence() {
        let mut ingestor = ConfigIngestor::new();
        let outcomes = push_all(&mut ingestor, b"192168u192169w001001x");
        assert!(outcomes.iter().all(|o| o.config.is_none()));
        assert!(ingestor.buffer().is_empty());

        // A late primary half does not revive the dropped sequence.
        let outcomes = push_all(&mut ingestor, b"001002y");
        assert!(outcomes[0].config.is_none());
    }

    #[test]
    fn degenerate_secondary_still_applies_primary() {
        let mut ingestor = ConfigIngestor::new();
        let outcomes = push_all(&mut ingestor, b"010000u000001y000000w000000x");
        let config = outcomes[3].config.clone().unwrap();
        assert_eq!(config.primary().as_str(), "10.0.0.1");
        assert!(config.secondary().is_none());
    }

    #[test]
    fn noise_between_fragments_is_ignored() {
        let mut ingestor = ConfigIngestor::new();
        let outcomes = push_all(&mut ingestor, b"19\r\n2168u 001002y\n192169w001001x\r\n");
        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[3].config.is_some());
    }

    #[test]
    fn malformed_fragment_clears_its_slot() {
        let mut ingestor = ConfigIngestor::new();
        push_all(&mut ingestor, b"192168u");
        assert_eq!(ingestor.buffer().pending(), vec!["192168u".to_string()]);
        push_all(&mut ingestor, b"12u");
        assert!(ingestor.buffer().is_empty());
    }
}
