// SPDX-License-Identifier: AGPL-3.0-only

//! Trivial byte-level token map.
//!
//! Stands in for a real tokenizer: each prompt byte becomes its own token
//! id, and ids below 128 detokenize back to their ASCII byte. Ids past the
//! ASCII range render as a bracketed placeholder so device output stays
//! legible either way.

/// Map a prompt to token ids, one per byte.
#[must_use]
pub fn tokenize(text: &str) -> Vec<u32> {
    text.bytes().map(u32::from).collect()
}

/// Render one token id as console text.
#[must_use]
pub fn detokenize(token: u32) -> String {
    if token < 128 {
        #[allow(clippy::cast_possible_truncation)]
        char::from(token as u8).to_string()
    } else {
        format!("[T{token}]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_maps_bytes() {
        assert_eq!(tokenize("hi"), vec![104, 105]);
        assert_eq!(tokenize(""), Vec::<u32>::new());
    }

    #[test]
    fn ascii_round_trips() {
        for b in [b'a', b' ', b'!', b'~'] {
            assert_eq!(detokenize(u32::from(b)), char::from(b).to_string());
        }
    }

    #[test]
    fn non_ascii_renders_placeholder() {
        assert_eq!(detokenize(300), "[T300]");
    }
}
