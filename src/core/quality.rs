//! Driver-reported data quality.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Quality code attached to every value a driver returns.
///
/// Drivers report quality as a short status string. `"OK"` means the value is
/// usable; anything else is a fault code that the gateway forwards to clients
/// in place of the value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    /// Value is valid (`"OK"`).
    #[default]
    Good,

    /// Fault code reported by the driver.
    Bad(String),
}

impl Quality {
    /// Code used by drivers for a good value.
    pub const OK: &'static str = "OK";

    /// Parse a driver quality code.
    pub fn from_code(code: &str) -> Self {
        if code == Self::OK {
            Self::Good
        } else {
            Self::Bad(code.to_string())
        }
    }

    /// Create a fault quality.
    pub fn bad(code: impl Into<String>) -> Self {
        Self::Bad(code.into())
    }

    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good)
    }

    /// The quality code as reported on the wire.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Good => Self::OK,
            Self::Bad(code) => code,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Quality {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Quality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_codes() {
        assert!(Quality::from_code("OK").is_good());
        assert_eq!(Quality::from_code("BAD_COMM"), Quality::bad("BAD_COMM"));
        assert_eq!(Quality::bad("BAD_COMM").to_string(), "BAD_COMM");
        assert_eq!(Quality::Good.as_str(), "OK");
    }

    #[test]
    fn test_quality_serde() {
        let json = serde_json::to_string(&Quality::bad("STALE")).unwrap();
        assert_eq!(json, "\"STALE\"");
        let q: Quality = serde_json::from_str("\"OK\"").unwrap();
        assert_eq!(q, Quality::Good);
    }
}
