//! Minimal ABI codec for the voting contract's fixed surface.
//!
//! Only the types that appear in the contract's functions are supported:
//! `uint256` (values must fit in a `u64`), `address`, `string`, `bool`, the
//! `(bool,uint256,uint256)` status tuple and the `(uint256,string,uint256)[]`
//! candidate array.

use thiserror::Error;
use votechain_models::{Candidate, ChainCandidateId, VotingStatus};

const WORD: usize = 32;

/// `vote(uint256)`
pub const VOTE: [u8; 4] = [0x01, 0x21, 0xb9, 0x3f];
/// `getCandidates()`
pub const GET_CANDIDATES: [u8; 4] = [0x06, 0xa4, 0x9f, 0xce];
/// `voters(address)`
pub const VOTERS: [u8; 4] = [0xa3, 0xec, 0x13, 0x8d];
/// `getVotingStatus()`
pub const GET_VOTING_STATUS: [u8; 4] = [0x58, 0x1c, 0x28, 0x1c];
/// `addCandidate(string)`
pub const ADD_CANDIDATE: [u8; 4] = [0x46, 0x2e, 0x91, 0xec];
/// `startVoting()`
pub const START_VOTING: [u8; 4] = [0x1e, 0xc6, 0xb6, 0x0a];
/// `endVoting()`
pub const END_VOTING: [u8; 4] = [0xc3, 0x40, 0x3d, 0xdf];
/// `owner()`
pub const OWNER: [u8; 4] = [0x8d, 0xa5, 0xcb, 0x5b];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("return data too short: need {needed} bytes, have {len}")]
    OutOfBounds { needed: usize, len: usize },
    #[error("integer at offset {0} does not fit in 64 bits")]
    Overflow(usize),
    #[error("string is not valid utf-8")]
    InvalidUtf8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Uint(u64),
    Address([u8; 20]),
    Str(String),
}

pub fn encode_call(selector: [u8; 4], tokens: &[Token]) -> Vec<u8> {
    let head_len = WORD * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => {
                let mut word = [0u8; WORD];
                word[12..].copy_from_slice(address);
                head.extend_from_slice(&word);
            }
            Token::Str(value) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(value.len() as u64));
                tail.extend_from_slice(value.as_bytes());
                let padding = (WORD - value.len() % WORD) % WORD;
                tail.resize(tail.len() + padding, 0);
            }
        }
    }

    let mut out = Vec::with_capacity(4 + head.len() + tail.len());
    out.extend_from_slice(&selector);
    out.extend_from_slice(&head);
    out.extend_from_slice(&tail);
    out
}

pub fn decode_bool(data: &[u8]) -> Result<bool, AbiError> {
    Ok(read_u64(data, 0)? != 0)
}

pub fn decode_address(data: &[u8]) -> Result<String, AbiError> {
    let word = read_word(data, 0)?;
    Ok(encode_hex(&word[12..]))
}

pub fn decode_voting_status(data: &[u8]) -> Result<VotingStatus, AbiError> {
    Ok(VotingStatus {
        active: read_u64(data, 0)? != 0,
        total_votes: read_u64(data, WORD)?,
        candidate_count: read_u64(data, 2 * WORD)?,
    })
}

/// Decodes the single dynamic return value `(uint256,string,uint256)[]`.
pub fn decode_candidates(data: &[u8]) -> Result<Vec<Candidate>, AbiError> {
    let array_start = read_usize(data, 0)?;
    let len = read_usize(data, array_start)?;
    let elements = at(array_start, WORD)?;

    let mut candidates = Vec::with_capacity(len.min(256));
    for i in 0..len {
        let slot = i
            .checked_mul(WORD)
            .ok_or(AbiError::Overflow(elements))
            .and_then(|rel| at(elements, rel))?;
        let tuple = at(elements, read_usize(data, slot)?)?;
        let id = read_u64(data, tuple)?;
        let name_at = at(tuple, read_usize(data, at(tuple, WORD)?)?)?;
        let vote_count = read_u64(data, at(tuple, 2 * WORD)?)?;
        candidates.push(Candidate {
            id: ChainCandidateId(id),
            name: read_string(data, name_at)?,
            vote_count,
        });
    }
    Ok(candidates)
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("0x");
    for b in bytes {
        out.push_str(&format!("{:02x}", b));
    }
    out
}

pub fn decode_hex(value: &str) -> Result<Vec<u8>, AbiError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.len() % 2 != 0 || !digits.chars().all(|ch| ch.is_ascii_hexdigit()) {
        return Err(AbiError::InvalidHex(value.to_string()));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|_| AbiError::InvalidHex(value.to_string()))
        })
        .collect()
}

pub fn parse_address(value: &str) -> Result<[u8; 20], AbiError> {
    let bytes = decode_hex(value).map_err(|_| AbiError::InvalidAddress(value.to_string()))?;
    bytes
        .try_into()
        .map_err(|_| AbiError::InvalidAddress(value.to_string()))
}

/// Parses a JSON-RPC hex quantity such as `"0x539"`.
pub fn parse_quantity(value: &str) -> Result<u64, AbiError> {
    let trimmed = value.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| AbiError::InvalidHex(value.to_string()))?;
    if digits.is_empty() {
        return Err(AbiError::InvalidHex(value.to_string()));
    }
    u64::from_str_radix(digits, 16).map_err(|_| AbiError::InvalidHex(value.to_string()))
}

pub fn format_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `base + rel`, as an error when it overflows.
fn at(base: usize, rel: usize) -> Result<usize, AbiError> {
    base.checked_add(rel).ok_or(AbiError::Overflow(base))
}

fn read_word(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD).ok_or(AbiError::Overflow(offset))?;
    data.get(offset..end).ok_or(AbiError::OutOfBounds {
        needed: end,
        len: data.len(),
    })
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, AbiError> {
    let word = read_word(data, offset)?;
    if word[..24].iter().any(|b| *b != 0) {
        return Err(AbiError::Overflow(offset));
    }
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&word[24..]);
    Ok(u64::from_be_bytes(bytes))
}

fn read_usize(data: &[u8], offset: usize) -> Result<usize, AbiError> {
    usize::try_from(read_u64(data, offset)?).map_err(|_| AbiError::Overflow(offset))
}

fn read_string(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = read_usize(data, offset)?;
    let start = at(offset, WORD)?;
    let end = at(start, len)?;
    let bytes = data.get(start..end).ok_or(AbiError::OutOfBounds {
        needed: end,
        len: data.len(),
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)
}
