use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    Facebook,
    Google,
    TikTok,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Facebook, Platform::Google, Platform::TikTok];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "Facebook",
            Platform::Google => "Google",
            Platform::TikTok => "TikTok",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            Platform::Facebook => "#1877F2",
            Platform::Google => "#34A853",
            Platform::TikTok => "#000000",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "facebook" | "meta" => Ok(Platform::Facebook),
            "google" | "google ads" => Ok(Platform::Google),
            "tiktok" => Ok(Platform::TikTok),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}
