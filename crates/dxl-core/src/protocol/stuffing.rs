//! Byte stuffing: keeps the packet start marker unique inside packet content.
//!
//! # Why stuffing is needed (for beginners)
//!
//! Every packet begins with the marker `FF FF FD`.  A receiver that has lost
//! track of where it is in the byte stream resynchronises by searching for
//! that marker.  If the same three bytes appeared inside a parameter block
//! (a perfectly legal register value), the receiver could mistake them for the
//! start of a new packet.
//!
//! The sender prevents this by *stuffing*: whenever `FF FF FD` occurs in the
//! content it inserts one extra `FD`, giving `FF FF FD FD`.  The receiver
//! *unstuffs* by dropping the last byte of every `FF FF FD FD`.  Because the
//! marker can never overlap itself, the two transforms are exact inverses for
//! every possible byte sequence.
//!
//! ```text
//! raw:      .. 10 FF FF FD 20 FF FF FD ..
//! stuffed:  .. 10 FF FF FD FD 20 FF FF FD FD ..
//! ```
//!
//! Both functions operate on a whole packet region at once, so a marker that
//! straddles the boundary between two header fields or two parameters is
//! detected exactly like one inside a single field.

use crate::protocol::messages::{MARKER, STUFFING_BYTE};

/// Returns `region` with one [`STUFFING_BYTE`] inserted after every occurrence
/// of the start marker.
///
/// The output never exceeds `2 * region.len()` bytes; the buffer is allocated
/// for that worst case up front.
///
/// # Examples
///
/// ```rust
/// use dxl_core::protocol::stuffing::stuff;
///
/// assert_eq!(stuff(&[0x01, 0xFF, 0xFF, 0xFD]), vec![0x01, 0xFF, 0xFF, 0xFD, 0xFD]);
/// assert_eq!(stuff(&[0xFF, 0xFD, 0xFF]), vec![0xFF, 0xFD, 0xFF]);
/// ```
pub fn stuff(region: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(region.len() * 2);
    for (i, &byte) in region.iter().enumerate() {
        out.push(byte);
        if i >= 2 && region[i - 2..=i] == MARKER {
            out.push(STUFFING_BYTE);
        }
    }
    out
}

/// Reverses [`stuff`]: drops the trailing byte of every `FF FF FD FD`.
///
/// # Examples
///
/// ```rust
/// use dxl_core::protocol::stuffing::{stuff, unstuff};
///
/// let raw = [0xFF, 0xFF, 0xFD, 0xFF, 0xFF, 0xFD];
/// assert_eq!(unstuff(&stuff(&raw)), raw.to_vec());
/// ```
pub fn unstuff(region: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(region.len());
    let mut i = 0;
    while i < region.len() {
        if region[i..].starts_with(&MARKER) && region.get(i + 3) == Some(&STUFFING_BYTE) {
            out.extend_from_slice(&MARKER);
            i += 4;
        } else {
            out.push(region[i]);
            i += 1;
        }
    }
    out
}

/// Counts how many stuffing bytes [`stuff`] would insert into `region`.
pub fn stuffed_overhead(region: &[u8]) -> usize {
    region.windows(3).filter(|w| *w == MARKER).count()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn round_trip(raw: &[u8]) {
        let stuffed = stuff(raw);
        assert_eq!(unstuff(&stuffed), raw.to_vec(), "stuffed form: {stuffed:02X?}");
    }

    // ── stuff ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_stuff_leaves_plain_content_untouched() {
        let raw = [0x00, 0x01, 0x07, 0x00, 0x03, 0x74, 0x00];
        assert_eq!(stuff(&raw), raw.to_vec());
    }

    #[test]
    fn test_stuff_inserts_after_marker_in_middle() {
        // Arrange
        let raw = [0x10, 0xFF, 0xFF, 0xFD, 0x20];

        // Act
        let stuffed = stuff(&raw);

        // Assert
        assert_eq!(stuffed, vec![0x10, 0xFF, 0xFF, 0xFD, 0xFD, 0x20]);
    }

    #[test]
    fn test_stuff_handles_marker_at_start_and_end() {
        let raw = [0xFF, 0xFF, 0xFD, 0x42, 0xFF, 0xFF, 0xFD];
        assert_eq!(
            stuff(&raw),
            vec![0xFF, 0xFF, 0xFD, 0xFD, 0x42, 0xFF, 0xFF, 0xFD, 0xFD]
        );
    }

    #[test]
    fn test_stuff_escapes_back_to_back_markers_independently() {
        let raw = [0xFF, 0xFF, 0xFD, 0xFF, 0xFF, 0xFD];
        assert_eq!(
            stuff(&raw),
            vec![0xFF, 0xFF, 0xFD, 0xFD, 0xFF, 0xFF, 0xFD, 0xFD]
        );
    }

    #[test]
    fn test_stuff_detects_marker_after_run_of_ff() {
        // Only the last two 0xFF bytes belong to the marker.
        let raw = [0xFF, 0xFF, 0xFF, 0xFD];
        assert_eq!(stuff(&raw), vec![0xFF, 0xFF, 0xFF, 0xFD, 0xFD]);
    }

    #[test]
    fn test_stuff_ignores_partial_markers() {
        let raw = [0xFF, 0xFD, 0xFF, 0xFF, 0xFC, 0xFF];
        assert_eq!(stuff(&raw), raw.to_vec());
    }

    #[test]
    fn test_stuffed_overhead_matches_inserted_byte_count() {
        let raw = [0xFF, 0xFF, 0xFD, 0x00, 0xFF, 0xFF, 0xFD, 0xFD];
        assert_eq!(stuffed_overhead(&raw), 2);
        assert_eq!(stuff(&raw).len(), raw.len() + 2);
    }

    // ── unstuff ───────────────────────────────────────────────────────────────

    #[test]
    fn test_unstuff_keeps_marker_without_stuffing_byte() {
        // A bare marker is not an escape sequence; nothing is dropped.
        let region = [0xFF, 0xFF, 0xFD, 0x00];
        assert_eq!(unstuff(&region), region.to_vec());
    }

    #[test]
    fn test_unstuff_drops_only_one_byte_per_escape() {
        let region = [0xFF, 0xFF, 0xFD, 0xFD, 0xFD];
        assert_eq!(unstuff(&region), vec![0xFF, 0xFF, 0xFD, 0xFD]);
    }

    // ── round trips ───────────────────────────────────────────────────────────

    #[test]
    fn test_round_trip_edge_sequences() {
        round_trip(&[]);
        round_trip(&[0xFF]);
        round_trip(&[0xFF, 0xFF]);
        round_trip(&[0xFF, 0xFF, 0xFD]);
        round_trip(&[0xFF, 0xFF, 0xFD, 0xFD]);
        round_trip(&[0xFF, 0xFF, 0xFD, 0xFD, 0xFD]);
        round_trip(&[0xFF, 0xFF, 0xFF, 0xFD, 0xFF, 0xFF, 0xFD, 0xFF]);
        round_trip(&[0x00, 0xFF, 0xFF, 0xFD, 0xFF, 0xFF, 0xFD, 0xFD, 0x00]);
    }

    #[test]
    fn test_round_trip_every_sequence_over_marker_alphabet() {
        // Every sequence up to 7 bytes drawn from the bytes that can form or
        // imitate a marker, plus one unrelated byte.
        let alphabet = [0xFF, 0xFD, 0x00];
        for len in 0..=7u32 {
            for n in 0..alphabet.len().pow(len) {
                let mut seq = Vec::with_capacity(len as usize);
                let mut rest = n;
                for _ in 0..len {
                    seq.push(alphabet[rest % alphabet.len()]);
                    rest /= alphabet.len();
                }
                round_trip(&seq);
            }
        }
    }

    #[test]
    fn test_stuffed_output_never_exceeds_double_length() {
        let raw: Vec<u8> = [0xFF, 0xFF, 0xFD].repeat(50);
        let stuffed = stuff(&raw);
        assert_eq!(stuffed.len(), raw.len() + 50);
        assert!(stuffed.len() <= raw.len() * 2);
    }

    // ── Properties ────────────────────────────────────────────────────────────

    /// Arbitrary bytes with whole markers, already-stuffed markers and lone
    /// marker bytes spliced in.
    fn marker_heavy_bytes() -> impl Strategy<Value = Vec<u8>> {
        prop::collection::vec(
            prop_oneof![
                3 => any::<u8>().prop_map(|b| vec![b]),
                1 => Just(MARKER.to_vec()),
                1 => Just(vec![0xFF, 0xFF, 0xFD, 0xFD]),
                1 => Just(vec![0xFF]),
                1 => Just(vec![0xFD]),
            ],
            0..96,
        )
        .prop_map(|chunks| chunks.concat())
    }

    proptest! {
        #[test]
        fn test_unstuff_inverts_stuff_for_any_bytes(raw in marker_heavy_bytes()) {
            prop_assert_eq!(unstuff(&stuff(&raw)), raw);
        }

        #[test]
        fn test_unstuff_inverts_stuff_for_uniform_bytes(
            raw in prop::collection::vec(any::<u8>(), 0..512)
        ) {
            prop_assert_eq!(unstuff(&stuff(&raw)), raw);
        }

        #[test]
        fn test_every_marker_in_stuffed_output_is_escaped(raw in marker_heavy_bytes()) {
            let stuffed = stuff(&raw);

            prop_assert_eq!(stuffed.len(), raw.len() + stuffed_overhead(&raw));
            for (at, window) in stuffed.windows(3).enumerate() {
                if window == MARKER {
                    prop_assert_eq!(stuffed.get(at + 3), Some(&STUFFING_BYTE));
                }
            }
        }
    }
}
