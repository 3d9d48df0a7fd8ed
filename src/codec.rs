//! On-disk encoding of nose prints: a byte string of little-endian `f32`s.

use anyhow::Result;

pub fn to_le_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

pub fn from_le_bytes(bytes: &[u8]) -> Result<Vec<f32>> {
    anyhow::ensure!(
        bytes.len() % 4 == 0,
        "embedding byte length {} is not a multiple of 4",
        bytes.len()
    );
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// `#[serde(with = "codec::embedding_le")]`
pub mod embedding_le {
    use noseprint_vision::Embedding;
    use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

    use super::{from_le_bytes, to_le_bytes};

    pub fn serialize<S: Serializer>(embedding: &Embedding, s: S) -> Result<S::Ok, S::Error> {
        serde_bytes::Bytes::new(&to_le_bytes(embedding.as_slice())).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Embedding, D::Error> {
        let buf = serde_bytes::ByteBuf::deserialize(d)?;
        from_le_bytes(&buf)
            .map(Embedding::from_vec)
            .map_err(|e| D::Error::custom(format!("{:#}", e)))
    }
}
