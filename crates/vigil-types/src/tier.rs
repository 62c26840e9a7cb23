//! Subscription tier types

use serde::{Deserialize, Serialize};

/// Subscription tier levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Free tier
    Free,
    /// Pro tier - individual subscribers
    Pro,
    /// Team tier - shared seats
    Team,
    /// Enterprise tier - custom limits
    Enterprise,
}

impl Tier {
    /// Get the rate limit for this tier (requests per minute)
    pub const fn rate_limit(&self) -> u32 {
        match self {
            Self::Free => 60,
            Self::Pro => 600,
            Self::Team => 3_000,
            Self::Enterprise => 30_000,
        }
    }
}

impl Default for Tier {
    fn default() -> Self {
        Self::Free
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Team => write!(f, "team"),
            Self::Enterprise => write!(f, "enterprise"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = TierParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "team" => Ok(Self::Team),
            "enterprise" => Ok(Self::Enterprise),
            other => Err(TierParseError(other.to_string())),
        }
    }
}

/// Error parsing a tier from a string
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tier: {0}")]
pub struct TierParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_roundtrip() {
        for tier in [Tier::Free, Tier::Pro, Tier::Team, Tier::Enterprise] {
            assert_eq!(tier.to_string().parse::<Tier>().unwrap(), tier);
        }
    }

    #[test]
    fn test_tier_parse_rejects_unknown() {
        assert!("platinum".parse::<Tier>().is_err());
    }

    #[test]
    fn test_tier_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Tier::Team).unwrap(), "\"team\"");
    }
}
