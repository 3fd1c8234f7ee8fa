//! Minimal Solidity ABI codec for the TimeStore contract.
//!
//! Only the shapes the contract uses are supported: `(string,uint256)`
//! arguments and a `(uint256,uint256,string)[]` return value.

use sha3::{Digest, Keccak256};

use crate::message::StoredMessage;

/// Size of one ABI word in bytes.
pub const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Errors from encoding, decoding or validating the contract interface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    /// Needed `needed` bytes at `offset` but the data is `len` bytes long.
    Truncated { offset: usize, needed: usize, len: usize },
    /// A uint256 field does not fit the target integer.
    ValueOverflow { field: &'static str },
    InvalidUtf8,
    MissingFunction(String),
    SignatureMismatch { expected: String, found: String },
    InvalidDescriptor(String),
}

impl std::fmt::Display for AbiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated { offset, needed, len } => write!(
                f,
                "return data truncated: need {needed} bytes at offset {offset}, have {len}"
            ),
            Self::ValueOverflow { field } => write!(f, "{field} does not fit in 64 bits"),
            Self::InvalidUtf8 => write!(f, "stored message is not valid UTF-8"),
            Self::MissingFunction(name) => write!(f, "interface has no function {name}"),
            Self::SignatureMismatch { expected, found } => {
                write!(f, "expected {expected}, interface declares {found}")
            }
            Self::InvalidDescriptor(msg) => write!(f, "invalid interface descriptor: {msg}"),
        }
    }
}

impl std::error::Error for AbiError {}

/// First four bytes of the Keccak-256 hash of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Calldata for `storeMsg(string,uint256)`.
pub fn encode_store_msg(selector: [u8; 4], text: &str, unlock_at: u64) -> Vec<u8> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(4 + WORD * 3 + padded_len(bytes.len()));
    out.extend_from_slice(&selector);
    // head: offset of the string tail, then the timestamp
    out.extend_from_slice(&uint_word((2 * WORD) as u64));
    out.extend_from_slice(&uint_word(unlock_at));
    // tail: length-prefixed, zero-padded bytes
    out.extend_from_slice(&uint_word(bytes.len() as u64));
    out.extend_from_slice(bytes);
    out.resize(out.len() + padded_len(bytes.len()) - bytes.len(), 0);
    out
}

/// Calldata for a function without arguments.
pub fn encode_no_args(selector: [u8; 4]) -> Vec<u8> {
    selector.to_vec()
}

/// Split `storeMsg` calldata back into `(selector, text, unlock_at)`.
///
/// Used by the in-memory contract; a real node never hands calldata back.
pub fn decode_store_msg(calldata: &[u8]) -> Result<([u8; 4], String, u64), AbiError> {
    let sel = read_slice(calldata, 0, 4)?;
    let selector = [sel[0], sel[1], sel[2], sel[3]];
    let args = &calldata[4..];
    let text_at = read_offset(args, 0, 0)?;
    let unlock_at = read_u64(args, WORD, "unlockTimestamp")?;
    let text = read_string(args, text_at)?;
    Ok((selector, text, unlock_at))
}

/// Decode `getMsgTimed()` return data.
pub fn decode_messages(data: &[u8]) -> Result<Vec<StoredMessage>, AbiError> {
    let array_at = read_offset(data, 0, 0)?;
    let count = read_usize(data, array_at, "array length")?;
    let elems_at = checked(array_at, WORD)?;

    // every element needs at least its offset word
    let table_len = count.checked_mul(WORD).ok_or(AbiError::ValueOverflow {
        field: "array length",
    })?;
    read_slice(data, elems_at, table_len)?;

    let mut out = Vec::with_capacity(count);
    for i in 0..count {
        let tuple_at = read_offset(data, elems_at + i * WORD, elems_at)?;
        let id = read_u64(data, tuple_at, "id")?;
        let unlock_time = read_u64(data, checked(tuple_at, WORD)?, "unlockTime")?;
        let text_at = read_offset(data, checked(tuple_at, 2 * WORD)?, tuple_at)?;
        let text = read_string(data, text_at)?;
        out.push(StoredMessage {
            id,
            unlock_time,
            text,
        });
    }
    Ok(out)
}

/// Encode a `getMsgTimed()` return value. Inverse of [`decode_messages`].
pub fn encode_messages(messages: &[StoredMessage]) -> Vec<u8> {
    let mut tails: Vec<Vec<u8>> = Vec::with_capacity(messages.len());
    for m in messages {
        let bytes = m.text.as_bytes();
        let mut t = Vec::with_capacity(WORD * 4 + padded_len(bytes.len()));
        t.extend_from_slice(&uint_word(m.id));
        t.extend_from_slice(&uint_word(m.unlock_time));
        t.extend_from_slice(&uint_word((3 * WORD) as u64));
        t.extend_from_slice(&uint_word(bytes.len() as u64));
        t.extend_from_slice(bytes);
        t.resize(t.len() + padded_len(bytes.len()) - bytes.len(), 0);
        tails.push(t);
    }

    let mut out = Vec::new();
    out.extend_from_slice(&uint_word(WORD as u64));
    out.extend_from_slice(&uint_word(messages.len() as u64));
    let mut offset = messages.len() * WORD;
    for t in &tails {
        out.extend_from_slice(&uint_word(offset as u64));
        offset += t.len();
    }
    for t in tails {
        out.extend_from_slice(&t);
    }
    out
}

/// Extract the reason from `Error(string)` revert data, if that is what it is.
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let payload = data.strip_prefix(&ERROR_STRING_SELECTOR[..])?;
    let at = read_offset(payload, 0, 0).ok()?;
    read_string(payload, at).ok()
}

fn checked(a: usize, b: usize) -> Result<usize, AbiError> {
    a.checked_add(b).ok_or(AbiError::ValueOverflow { field: "offset" })
}

fn read_slice(data: &[u8], offset: usize, needed: usize) -> Result<&[u8], AbiError> {
    let end = checked(offset, needed)?;
    data.get(offset..end).ok_or(AbiError::Truncated {
        offset,
        needed,
        len: data.len(),
    })
}

fn read_u64(data: &[u8], offset: usize, field: &'static str) -> Result<u64, AbiError> {
    let word = read_slice(data, offset, WORD)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(AbiError::ValueOverflow { field });
    }
    let mut low = [0u8; 8];
    low.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(low))
}

fn read_usize(data: &[u8], offset: usize, field: &'static str) -> Result<usize, AbiError> {
    let v = read_u64(data, offset, field)?;
    usize::try_from(v).map_err(|_| AbiError::ValueOverflow { field })
}

/// Read a relative offset word and resolve it against `base`.
fn read_offset(data: &[u8], offset: usize, base: usize) -> Result<usize, AbiError> {
    let rel = read_usize(data, offset, "offset")?;
    checked(base, rel)
}

fn read_string(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = read_usize(data, offset, "string length")?;
    let bytes = read_slice(data, checked(offset, WORD)?, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn word_hex(v: u64) -> String {
        format!("{v:064x}")
    }

    #[test]
    fn selectors_match_deployed_contract() {
        assert_eq!(selector("storeMsg(string,uint256)"), [0x28, 0x8e, 0x72, 0x5f]);
        assert_eq!(selector("getMsgTimed()"), [0x54, 0x90, 0xeb, 0xdf]);
        assert_eq!(selector("Error(string)"), ERROR_STRING_SELECTOR);
    }

    #[test]
    fn store_msg_calldata_layout() {
        let data = encode_store_msg([0x28, 0x8e, 0x72, 0x5f], "hello", 1_700_000_000);
        let expected = format!(
            "288e725f{}{}{}{}",
            word_hex(0x40),
            word_hex(1_700_000_000),
            word_hex(5),
            format!("{:0<64}", hex::encode("hello")),
        );
        assert_eq!(hex::encode(&data), expected);
        assert_eq!((data.len() - 4) % WORD, 0);
    }

    #[test]
    fn store_msg_calldata_decodes() {
        let text = "a message longer than a single thirty-two byte word";
        let data = encode_store_msg(selector("storeMsg(string,uint256)"), text, 42);
        let (sel, decoded, unlock) = decode_store_msg(&data).unwrap();
        assert_eq!(sel, selector("storeMsg(string,uint256)"));
        assert_eq!(decoded, text);
        assert_eq!(unlock, 42);
    }

    #[test]
    fn decodes_hand_built_response() {
        // [{1, 1700000000, "hello"}, {0, 0, ""}]
        let words = [
            word_hex(0x20),          // array offset
            word_hex(2),             // length
            word_hex(0x40),          // elem 0 offset (relative to elems)
            word_hex(0xe0),          // elem 1 offset
            word_hex(1),             // elem 0 id
            word_hex(1_700_000_000), // elem 0 unlockTime
            word_hex(0x60),          // elem 0 string offset (relative to tuple)
            word_hex(5),             // "hello" length
            format!("{:0<64}", hex::encode("hello")),
            word_hex(0),    // elem 1 id
            word_hex(0),    // elem 1 unlockTime
            word_hex(0x60), // elem 1 string offset
            word_hex(0),    // "" length
        ];
        let data = hex::decode(words.concat()).unwrap();
        let msgs = decode_messages(&data).unwrap();
        assert_eq!(
            msgs,
            vec![
                StoredMessage {
                    id: 1,
                    unlock_time: 1_700_000_000,
                    text: "hello".into()
                },
                StoredMessage {
                    id: 0,
                    unlock_time: 0,
                    text: String::new()
                },
            ]
        );
        assert_eq!(encode_messages(&msgs), data);
    }

    #[test]
    fn empty_array() {
        let data = hex::decode(format!("{}{}", word_hex(0x20), word_hex(0))).unwrap();
        assert!(decode_messages(&data).unwrap().is_empty());
    }

    #[test]
    fn empty_return_data_is_truncated() {
        assert!(matches!(
            decode_messages(&[]),
            Err(AbiError::Truncated { offset: 0, .. })
        ));
    }

    #[test]
    fn absurd_length_rejected_without_allocating() {
        let data = hex::decode(format!("{}{}", word_hex(0x20), word_hex(u32::MAX as u64))).unwrap();
        assert!(matches!(decode_messages(&data), Err(AbiError::Truncated { .. })));
    }

    #[test]
    fn wide_id_overflows() {
        let mut data = encode_messages(&[StoredMessage {
            id: 9,
            unlock_time: 1,
            text: "x".into(),
        }]);
        // first byte of the id word
        data[WORD * 3] = 1;
        assert_eq!(
            decode_messages(&data),
            Err(AbiError::ValueOverflow { field: "id" })
        );
    }

    #[test]
    fn revert_reason() {
        let mut data = ERROR_STRING_SELECTOR.to_vec();
        data.extend_from_slice(&uint_word(0x20));
        data.extend_from_slice(&uint_word(6));
        let mut reason = b"locked".to_vec();
        reason.resize(WORD, 0);
        data.extend_from_slice(&reason);
        assert_eq!(decode_revert_reason(&data).as_deref(), Some("locked"));
        assert_eq!(decode_revert_reason(&[0xde, 0xad]), None);
    }
}
