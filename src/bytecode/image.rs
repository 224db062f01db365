use serde::{Deserialize, Serialize};

use crate::bytecode::code::ByteCode;

pub const MAGIC: [u8; 4] = *b"POPI";
pub const VERSION: u16 = 1;

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image encoding failed: {0}")]
    Encode(#[source] postcard::Error),

    #[error("image decoding failed: {0}")]
    Decode(#[source] postcard::Error),

    #[error("not a popi image (magic {found:?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported image version {found} (expected {VERSION})")]
    UnsupportedVersion { found: u16 },
}

/// A compiled program as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub magic: [u8; 4],
    pub version: u16,
    pub code: ByteCode,
}

impl Image {
    pub fn new(code: ByteCode) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            code,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ImageError> {
        postcard::to_allocvec(self).map_err(ImageError::Encode)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        let image: Image = postcard::from_bytes(bytes).map_err(ImageError::Decode)?;
        if image.magic != MAGIC {
            return Err(ImageError::BadMagic { found: image.magic });
        }
        if image.version != VERSION {
            return Err(ImageError::UnsupportedVersion {
                found: image.version,
            });
        }
        Ok(image)
    }

    pub fn into_code(self) -> ByteCode {
        self.code
    }
}
