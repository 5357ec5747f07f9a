//! Token encodings used for budget accounting.
//!
//! The [`TokenEncoding`] trait is the seam between the budgeter and a real
//! tokenizer. The application loads a model-specific tokenizer when one is
//! configured; [`ApproxEncoding`] is the built-in fallback that is always
//! available and needs no model files.

use anyhow::{bail, Result};

/// A reversible text ↔ token id mapping.
pub trait TokenEncoding: Send + Sync {
    /// Identifier shown in logs and stats.
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Result<Vec<u32>>;

    fn decode(&self, ids: &[u32]) -> Result<String>;
}

/// Maximum bytes packed into one fallback token.
const BYTES_PER_TOKEN: usize = 3;

/// General-purpose fallback encoding.
///
/// Text is pre-split into runs of word characters, whitespace, and
/// punctuation. Each run is packed into tokens of at most three UTF-8
/// bytes; a token id stores the byte count in its top byte and the bytes
/// in the low 24 bits. Decoding the full id sequence reproduces the input
/// exactly. The resulting counts sit close to what BPE tokenizers report
/// for source code.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxEncoding;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CharClass {
    Word,
    Space,
    Punct,
}

fn classify(c: char) -> CharClass {
    if c.is_alphanumeric() || c == '_' {
        CharClass::Word
    } else if c.is_whitespace() {
        CharClass::Space
    } else {
        CharClass::Punct
    }
}

fn pack(bytes: &[u8]) -> u32 {
    let mut id = (bytes.len() as u32) << 24;
    for (i, b) in bytes.iter().enumerate() {
        id |= (*b as u32) << (16 - 8 * i);
    }
    id
}

impl ApproxEncoding {
    fn runs(text: &str) -> impl Iterator<Item = &str> {
        let mut rest = text;
        std::iter::from_fn(move || {
            let first = rest.chars().next()?;
            let class = classify(first);
            let end = rest
                .char_indices()
                .find(|(_, c)| classify(*c) != class)
                .map_or(rest.len(), |(i, _)| i);
            let (run, tail) = rest.split_at(end);
            rest = tail;
            Some(run)
        })
    }
}

impl TokenEncoding for ApproxEncoding {
    fn name(&self) -> &str {
        "approx"
    }

    fn encode(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(text.len() / BYTES_PER_TOKEN + 1);
        for run in Self::runs(text) {
            ids.extend(run.as_bytes().chunks(BYTES_PER_TOKEN).map(pack));
        }
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        let mut bytes = Vec::with_capacity(ids.len() * BYTES_PER_TOKEN);
        for &id in ids {
            let len = (id >> 24) as usize;
            if len == 0 || len > BYTES_PER_TOKEN {
                bail!("invalid token id {id:#010x}");
            }
            for i in 0..len {
                bytes.push((id >> (16 - 8 * i)) as u8);
            }
        }
        match String::from_utf8(bytes) {
            Ok(s) => Ok(s),
            Err(e) => {
                // A prefix of the id sequence may end inside a multi-byte
                // character; drop the incomplete tail.
                let utf8 = e.utf8_error();
                if utf8.error_len().is_none() {
                    let mut bytes = e.into_bytes();
                    bytes.truncate(utf8.valid_up_to());
                    Ok(String::from_utf8(bytes)?)
                } else {
                    bail!("token ids decode to invalid UTF-8")
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_mixed_text() {
        let enc = ApproxEncoding;
        for text in [
            "",
            "fn main() { println!(\"hi\"); }",
            "naïve café « 日本語のテキスト » 🚀🚀",
            "\t\n  \r\n",
        ] {
            let ids = enc.encode(text).unwrap();
            assert_eq!(enc.decode(&ids).unwrap(), text);
        }
    }

    #[test]
    fn test_counts() {
        let enc = ApproxEncoding;
        assert_eq!(enc.encode("").unwrap().len(), 0);
        // "hello" -> 2 tokens, " " -> 1, "world" -> 2
        assert_eq!(enc.encode("hello world").unwrap().len(), 5);
        // punctuation runs pack together
        assert_eq!(enc.encode("();").unwrap().len(), 1);
    }

    #[test]
    fn test_prefix_decode_drops_partial_char() {
        let enc = ApproxEncoding;
        let ids = enc.encode("日本").unwrap();
        // Each character is three bytes, so one id holds exactly one char.
        assert_eq!(enc.decode(&ids[..1]).unwrap(), "日");

        let ids = enc.encode("🚀").unwrap();
        // Four bytes split across two ids.
        assert_eq!(ids.len(), 2);
        assert_eq!(enc.decode(&ids[..1]).unwrap(), "");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(ApproxEncoding.decode(&[0]).is_err());
        assert!(ApproxEncoding.decode(&[0x0900_0000]).is_err());
    }

    #[test]
    fn test_concatenation_never_costs_more() {
        let enc = ApproxEncoding;
        let a = "## File: a.py\n";
        let b = "\n```python\nx = 1\n```\n";
        let joined = format!("{a}{b}");
        let sum = enc.encode(a).unwrap().len() + enc.encode(b).unwrap().len();
        assert!(enc.encode(&joined).unwrap().len() <= sum);
    }
}
