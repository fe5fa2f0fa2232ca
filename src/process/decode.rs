//! Incremental UTF-8 decoding of output chunks.

const REPLACEMENT: char = '\u{FFFD}';

/// Decodes a byte stream that may split multi-byte characters across reads.
///
/// Incomplete trailing sequences are held back until the next chunk;
/// invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut input = &self.pending[..];
        loop {
            match std::str::from_utf8(input) {
                Ok(valid) => {
                    text.push_str(valid);
                    input = &[];
                    break;
                }
                Err(err) => {
                    let (valid, rest) = input.split_at(err.valid_up_to());
                    text.push_str(std::str::from_utf8(valid).unwrap_or_default());
                    match err.error_len() {
                        Some(len) => {
                            text.push(REPLACEMENT);
                            input = &rest[len..];
                        }
                        None => {
                            input = rest;
                            break;
                        }
                    }
                }
            }
        }

        let held_back = input.to_vec();
        self.pending = held_back;
        text
    }

    /// Flush whatever is still held back at end of stream.
    pub(crate) fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_ascii() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"hi\n"), "hi\n");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decode_split_multibyte_character() {
        let bytes = "héllo".as_bytes();
        let mut decoder = Utf8Decoder::default();
        // split inside the two-byte 'é'
        assert_eq!(decoder.decode(&bytes[..2]), "h");
        assert_eq!(decoder.decode(&bytes[2..]), "éllo");
    }

    #[test]
    fn test_decode_invalid_byte_is_replaced() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{FFFD}b");
    }

    #[test]
    fn test_finish_flushes_truncated_sequence() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }
}
