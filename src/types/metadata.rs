use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Opaque entity payload. Stored verbatim as a BLOB and never interpreted.
///
/// Serializes as `{"encoding": "utf8", "data": "..."}` when the bytes are valid
/// UTF-8 and as `{"encoding": "base64", "data": "..."}` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Metadata(Vec<u8>);

impl Metadata {
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Metadata {
    fn from(value: &str) -> Self {
        Self(value.as_bytes().to_vec())
    }
}

impl From<String> for Metadata {
    fn from(value: String) -> Self {
        Self(value.into_bytes())
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "lowercase")]
enum Encoded {
    Utf8(String),
    Base64(String),
}

impl Serialize for Metadata {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = match std::str::from_utf8(&self.0) {
            Ok(text) => Encoded::Utf8(text.to_string()),
            Err(_) => Encoded::Base64(STANDARD.encode(&self.0)),
        };
        encoded.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Metadata {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Encoded::deserialize(deserializer)? {
            Encoded::Utf8(text) => Ok(Self(text.into_bytes())),
            Encoded::Base64(data) => STANDARD
                .decode(data.as_bytes())
                .map(Self)
                .map_err(|e| D::Error::custom(format!("invalid base64 metadata: {e}"))),
        }
    }
}
