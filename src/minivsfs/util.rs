use std::time::{self, SystemTime};

/// Reflected CRC-32 (poly 0xEDB88320, init and final xor 0xFFFFFFFF).
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(bytes);
    hasher.finalize()
}

pub fn xor8(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn div_ceil(n: u64, d: u64) -> u64 {
    (n + d - 1) / d
}

/// Serde glue for the fixed 58-byte name field. bincode writes tuples
/// without a length prefix, so the field stays exactly 58 bytes on disk.
pub mod name_field {
    use crate::minivsfs::NAME_LEN;
    use serde::{
        de::{self, SeqAccess, Visitor},
        ser::SerializeTuple,
        Deserializer, Serializer,
    };
    use std::fmt;

    pub fn serialize<S>(name: &[u8; NAME_LEN], s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut tup = s.serialize_tuple(NAME_LEN)?;
        for b in name.iter() {
            tup.serialize_element(b)?;
        }
        tup.end()
    }

    pub fn deserialize<'de, D>(d: D) -> Result<[u8; NAME_LEN], D::Error>
    where
        D: Deserializer<'de>,
    {
        struct NameVisitor;

        impl<'de> Visitor<'de> for NameVisitor {
            type Value = [u8; NAME_LEN];

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{} name bytes", NAME_LEN)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut name = [0u8; NAME_LEN];
                for (i, b) in name.iter_mut().enumerate() {
                    *b = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(name)
            }
        }

        d.deserialize_tuple(NAME_LEN, NameVisitor)
    }
}
