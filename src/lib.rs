//! Decoder and matcher for the compressed content-path grant embedded in
//! v3 entitlement certificate extensions. A grant payload decodes into an
//! immutable [`PathTree`]; repository URLs are checked against it with
//! [`PathTree::match_path`].

mod bitstream;
mod header;
mod huffman;
mod pathtree;

pub use pathtree::{PathTree, MAX_ENUMERATED_PATHS};

use thiserror::Error;

/// Failures raised while decoding a grant payload. Matching never fails;
/// a path that cannot be authorized is an ordinary `false`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty payload")]
    EmptyPayload,

    #[error("payload truncated mid-read")]
    TruncatedInput,

    #[error("malformed header: {0}")]
    MalformedHeader(&'static str),

    #[error("bad word dictionary: {0}")]
    BadDictionary(&'static str),

    #[error("bit accumulator exceeded the longest known code")]
    UnknownCode,
}
