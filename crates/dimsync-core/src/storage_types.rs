use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// Storage backends an asset row can point at.
///
/// The `storage` column is free text owned by the upload pipeline; only these
/// two values are handled. Rows naming anything else are left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// File lives under the local storage root.
    Local,
    /// File is hosted by the Cloudinary CDN.
    Cloudinary,
}

impl StorageBackend {
    /// Value stored in the `storage` column for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageBackend::Local => "local",
            StorageBackend::Cloudinary => "cloudinary",
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(StorageBackend::Local),
            "cloudinary" => Ok(StorageBackend::Cloudinary),
            _ => Err(anyhow::anyhow!("Unsupported storage backend: {}", s)),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_backends_case_insensitively() {
        assert_eq!("local".parse::<StorageBackend>().unwrap(), StorageBackend::Local);
        assert_eq!(
            "Cloudinary".parse::<StorageBackend>().unwrap(),
            StorageBackend::Cloudinary
        );
        assert!("s3".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn display_matches_column_value() {
        assert_eq!(StorageBackend::Local.to_string(), "local");
        assert_eq!(StorageBackend::Cloudinary.to_string(), "cloudinary");
    }
}
