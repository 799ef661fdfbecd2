//! Serde helpers for byte strings written as `0x`-prefixed hex
//!
//! Use with `#[serde(with = "vesta_primitives::serde_hex")]`.

use serde::{Deserialize, Deserializer, Serializer};

/// Serialize bytes as a `0x`-prefixed hex string
pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
}

/// Deserialize bytes from a hex string, with or without `0x`
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    let s = String::deserialize(deserializer)?;
    let s = s.strip_prefix("0x").unwrap_or(&s);
    hex::decode(s).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Blob {
        #[serde(with = "super")]
        data: Vec<u8>,
    }

    #[test]
    fn test_hex_bytes_json() {
        let blob = Blob {
            data: vec![0x60, 0x00],
        };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"0x6000"}"#);

        let parsed: Blob = serde_json::from_str(r#"{"data":"6000"}"#).unwrap();
        assert_eq!(parsed, blob);
        assert!(serde_json::from_str::<Blob>(r#"{"data":"0xzz"}"#).is_err());
    }

    #[test]
    fn test_empty_bytes() {
        let parsed: Blob = serde_json::from_str(r#"{"data":"0x"}"#).unwrap();
        assert!(parsed.data.is_empty());
    }
}
