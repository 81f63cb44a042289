//! Streaming-capable UTF-8 validator for WebSocket text frames and
//! fragmented text messages.
//!
//! The scalar path is Bjoern Hoehrmann's shiftless DFA
//! (<https://bjoern.hoehrmann.de/utf-8/decoder/dfa/>), which validates in a
//! single pass without allocating. When the `simd` feature is enabled,
//! validation of complete buffers is delegated to `simdutf8` instead.

const UTF8_ACCEPT: u8 = 0;
// The transition table's error sink is row 1 (offset 12), not a small
// distinct sentinel — every malformed-class entry routes here.
const UTF8_REJECT: u8 = 12;

#[rustfmt::skip]
const UTF8D: [u8; 364] = [
    // The first part of the table maps bytes to character classes, to
    // reduce the size of the transition table and create bitmasks.
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1, 9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,
    7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,
    8,8,2,2,2,2,2,2,2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,
    10,3,3,3,3,3,3,3,3,3,3,3,3,4,3,3, 11,6,6,6,5,8,8,8,8,8,8,8,8,8,8,8,
    // The second part is a transition table that maps a combination of
    // a state of the automaton and a character class to a new state.
    0,12,24,36,60,96,84,12,12,12,48,72,
    12,12,12,12,12,12,12,12,12,12,12,12,
    12,0,12,12,12,12,12,0,12,0,12,12,
    12,24,12,12,12,12,12,24,12,24,12,12,
    12,12,12,12,12,12,12,24,12,12,12,12,
    12,24,12,12,12,12,12,12,12,24,12,12,
    12,12,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
];

fn decode(state: &mut u8, byte: u8) -> u8 {
    let class = UTF8D[byte as usize];
    // `state` already stores its row's offset into the transition section
    // (0, 12, 24, ... 96 for the 9 states), not a plain state index, so it
    // is added directly rather than multiplied by the row width.
    *state = UTF8D[256 + (*state as usize) + class as usize];
    *state
}

/// Validates a complete, non-streaming buffer. Used for control-frame
/// payloads and, with the `simd` feature on, full text messages.
#[cfg(not(feature = "simd"))]
pub fn valid(bytes: &[u8]) -> bool {
    let mut state = UTF8_ACCEPT;
    for &b in bytes {
        if decode(&mut state, b) == UTF8_REJECT {
            return false;
        }
    }
    state == UTF8_ACCEPT
}

#[cfg(feature = "simd")]
pub fn valid(bytes: &[u8]) -> bool {
    simdutf8::basic::from_utf8(bytes).is_ok()
}

/// Incremental validator for a message assembled across fragments: each
/// continuation frame's payload is fed in as it arrives so a boundary that
/// splits a multi-byte sequence doesn't produce a false rejection at the
/// split point. Call [`Utf8Validator::finish`] once the final fragment has
/// been pushed.
#[derive(Debug, Default)]
pub struct Utf8Validator {
    state: u8,
}

impl Utf8Validator {
    pub fn new() -> Self {
        Self { state: UTF8_ACCEPT }
    }

    pub fn push(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if decode(&mut self.state, b) == UTF8_REJECT {
                return false;
            }
        }
        true
    }

    pub fn finish(&self) -> bool {
        self.state == UTF8_ACCEPT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ascii() {
        assert!(valid(b"Hello, world!"));
    }

    #[test]
    fn accepts_multi_byte_sequences() {
        assert!(valid("héllo wörld ☃".as_bytes()));
    }

    #[test]
    fn rejects_overlong_encoding() {
        // C0 AF is an overlong encoding of '/' (0x2F) and must be rejected.
        assert!(!valid(&[0xC0, 0xAF]));
    }

    #[test]
    fn rejects_truncated_multi_byte_sequence() {
        assert!(!valid(&[0xE2, 0x82]));
    }

    #[test]
    fn incremental_validator_handles_split_sequence() {
        let full = "☃".as_bytes();
        let (first, second) = full.split_at(1);
        let mut validator = Utf8Validator::new();
        assert!(validator.push(first));
        assert!(validator.push(second));
        assert!(validator.finish());
    }

    #[test]
    fn incremental_validator_rejects_bad_tail() {
        let mut validator = Utf8Validator::new();
        assert!(validator.push(&[0xE2, 0x82]));
        assert!(!validator.finish());
    }
}
