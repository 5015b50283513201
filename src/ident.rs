use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Advertising platform an account or insight row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meta,
    Google,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Meta => "meta",
            Platform::Google => "google",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "meta" | "facebook" | "fb" => Ok(Platform::Meta),
            "google" | "gads" => Ok(Platform::Google),
            other => Err(Error::InvalidIdentifier(format!(
                "unknown platform: {other} (expected meta or google)"
            ))),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Granularity of an insight row within an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Campaign,
    Adset,
    Ad,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Campaign, Level::Adset, Level::Ad];

    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Campaign => "campaign",
            Level::Adset => "adset",
            Level::Ad => "ad",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "campaign" => Ok(Level::Campaign),
            "adset" | "ad_set" | "ad-set" => Ok(Level::Adset),
            "ad" => Ok(Level::Ad),
            other => Err(Error::InvalidIdentifier(format!(
                "unknown level: {other} (expected campaign, adset, or ad)"
            ))),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical key for a platform-scoped entity, e.g. `meta:1234567890`.
pub fn entity_key(platform: Platform, entity_id: &str) -> String {
    format!("{platform}:{entity_id}")
}

/// Split an entity key back into platform and id.
pub fn parse_entity_key(key: &str) -> Result<(Platform, &str)> {
    let (platform, id) = key
        .split_once(':')
        .ok_or_else(|| Error::InvalidIdentifier(format!("not an entity key: {key}")))?;
    if id.is_empty() {
        return Err(Error::InvalidIdentifier(format!("empty id in key: {key}")));
    }
    Ok((Platform::parse(platform)?, id))
}

/// Meta account ids are stored without the `act_` prefix the Ads API uses.
pub fn normalize_meta_account_id(id: &str) -> &str {
    id.strip_prefix("act_").unwrap_or(id)
}

/// Normalize an account id for the given platform.
pub fn normalize_account_id(platform: Platform, id: &str) -> &str {
    match platform {
        Platform::Meta => normalize_meta_account_id(id),
        Platform::Google => id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_parse() {
        assert_eq!(Platform::parse("meta").unwrap(), Platform::Meta);
        assert_eq!(Platform::parse("Facebook").unwrap(), Platform::Meta);
        assert_eq!(Platform::parse("google").unwrap(), Platform::Google);
        assert!(Platform::parse("tiktok").is_err());
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("campaign").unwrap(), Level::Campaign);
        assert_eq!(Level::parse("ad_set").unwrap(), Level::Adset);
        assert_eq!(Level::parse("AD").unwrap(), Level::Ad);
        assert!(Level::parse("keyword").is_err());
    }

    #[test]
    fn test_entity_key_round_trip() {
        let key = entity_key(Platform::Meta, "123");
        assert_eq!(key, "meta:123");
        let (platform, id) = parse_entity_key(&key).unwrap();
        assert_eq!(platform, Platform::Meta);
        assert_eq!(id, "123");
    }

    #[test]
    fn test_parse_entity_key_invalid() {
        assert!(parse_entity_key("nocolon").is_err());
        assert!(parse_entity_key("meta:").is_err());
        assert!(parse_entity_key("tiktok:123").is_err());
    }

    #[test]
    fn test_normalize_meta_account_id() {
        assert_eq!(normalize_meta_account_id("act_1234"), "1234");
        assert_eq!(normalize_meta_account_id("1234"), "1234");
    }
}
