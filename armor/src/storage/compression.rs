use crate::ArmorError;
use serde::{Deserialize, Serialize};
use std::fmt;

const ZSTD_LEVEL: i32 = 3;

/// Codec applied to column file payloads. Encoded payloads start with a one byte tag,
/// so decoding does not depend on the writer's configuration.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None = 0,
    #[default]
    Zstd = 1,
    Lz4 = 2,
}

impl Compression {
    pub fn from_tag(tag: u8) -> Option<Compression> {
        match tag {
            0 => Some(Compression::None),
            1 => Some(Compression::Zstd),
            2 => Some(Compression::Lz4),
            _ => None,
        }
    }

    pub fn encode(&self, data: &[u8]) -> Result<Vec<u8>, ArmorError> {
        let mut out = vec![*self as u8];
        match self {
            Compression::None => out.extend_from_slice(data),
            Compression::Zstd => out.extend(zstd::encode_all(data, ZSTD_LEVEL)?),
            Compression::Lz4 => out.extend(lz4_flex::compress_prepend_size(data)),
        }
        Ok(out)
    }

    pub fn decode(path: &str, bytes: &[u8]) -> Result<Vec<u8>, ArmorError> {
        let (tag, payload) = bytes.split_first().ok_or_else(|| ArmorError::corrupted(path, "empty payload"))?;
        match Compression::from_tag(*tag) {
            Some(Compression::None) => Ok(payload.to_vec()),
            Some(Compression::Zstd) => zstd::decode_all(payload).map_err(|e| ArmorError::corrupted(path, e)),
            Some(Compression::Lz4) => lz4_flex::decompress_size_prepended(payload).map_err(|e| ArmorError::corrupted(path, e)),
            None => Err(ArmorError::corrupted(path, format!("unknown compression tag {}", tag))),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => f.write_str("none"),
            Compression::Zstd => f.write_str("zstd"),
            Compression::Lz4 => f.write_str("lz4"),
        }
    }
}
