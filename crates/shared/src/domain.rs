use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);
    };
}

id_newtype!(AnalysisId);

/// Media types the intake validator accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Jpeg,
    Png,
    Tiff,
}

impl MediaType {
    /// Parses a client-declared MIME string against the allow-list.
    /// Returns `None` for anything outside JPEG/PNG/TIFF.
    pub fn from_declared(declared: &str) -> Option<Self> {
        match declared.trim().to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/tiff" => Some(Self::Tiff),
            _ => None,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
        }
    }
}

/// Binary classification emitted by the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prediction {
    Benign,
    Malignant,
}

impl Prediction {
    pub fn is_positive(&self) -> bool {
        matches!(self, Self::Malignant)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Benign => "Benign",
            Self::Malignant => "Malignant",
        }
    }
}

/// Opaque displayable image reference: a URL or a data URI. The workflow
/// never dereferences these; the presentation layer renders them directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(pub String);

impl ImageRef {
    /// Builds an in-memory preview reference from raw image bytes.
    pub fn data_uri(media_type: MediaType, bytes: &[u8]) -> Self {
        Self(format!(
            "data:{};base64,{}",
            media_type.as_mime(),
            STANDARD.encode(bytes)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64 payload of a data-URI reference, if this is one.
    pub fn base64_payload(&self) -> Option<&str> {
        self.0.strip_prefix("data:")?.split_once(";base64,").map(|(_, b64)| b64)
    }
}
