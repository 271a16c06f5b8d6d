//! Data-set identity

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// Stable 31-bit identifier of a data-set.
///
/// The identifier is a content hash of the data-set's descriptive fields, so
/// two descriptors with identical fields map to the same queue. That collision
/// is how duplicate clip loads are deduplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(transparent)]
pub struct DataSetId(u32);

impl DataSetId {
    /// Largest value a data-set id can take.
    pub const MAX: u32 = 0x7fff_ffff;

    /// Build an id from a raw value, masking it to 31 bits.
    pub fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MAX)
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DataSetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Descriptive fields of a data-set, hashed into its [`DataSetId`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DataSetDescriptor {
    /// The network stream
    Live { name: String, address: IpAddr, port: u16 },

    /// A clip loaded from storage
    Clip { name: String, path: PathBuf, local: bool },
}

impl DataSetDescriptor {
    pub fn name(&self) -> &str {
        match self {
            DataSetDescriptor::Live { name, .. } | DataSetDescriptor::Clip { name, .. } => name,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, DataSetDescriptor::Live { .. })
    }

    /// Compute the content-hash identifier.
    pub fn id(&self) -> DataSetId {
        let mut hasher = Sha256::new();
        match self {
            DataSetDescriptor::Live { name, address, port } => {
                hasher.update(b"live\0");
                hasher.update(name.as_bytes());
                hasher.update(b"\0");
                hasher.update(address.to_string().as_bytes());
                hasher.update(b"\0");
                hasher.update(port.to_le_bytes());
            }
            DataSetDescriptor::Clip { name, path, local } => {
                hasher.update(b"clip\0");
                hasher.update(name.as_bytes());
                hasher.update(b"\0");
                hasher.update(path.to_string_lossy().as_bytes());
                hasher.update(b"\0");
                hasher.update([u8::from(*local)]);
            }
        }
        let digest = hasher.finalize();
        DataSetId::from_raw(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
    }
}
