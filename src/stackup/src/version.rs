//! Numeric version parsing and ordering.
//!
//! Versions compare component-wise as integers, so `3.9 < 3.11` even though
//! the strings order the other way.
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Find the first dotted version in free-form tool output,
    /// e.g. `Python 3.11.4` or `Docker version 24.0.7, build afdd53b`.
    pub fn extract(text: &str) -> Option<Version> {
        text.split(|c: char| c.is_whitespace() || c == ',')
            .map(|word| word.trim_start_matches('v'))
            .filter(|word| word.starts_with(|c: char| c.is_ascii_digit()) && word.contains('.'))
            .find_map(|word| word.parse().ok())
    }

    pub fn satisfies(&self, minimum: &Version) -> bool {
        self >= minimum
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("empty version string".to_string());
        }

        let mut parts = [0u64; 3];
        let mut seen = 0;
        for (i, raw) in trimmed.split('.').enumerate() {
            if i >= 3 {
                break;
            }
            // Pre-release suffixes such as `0rc1` keep their numeric prefix
            let digits: String = raw.chars().take_while(|c| c.is_ascii_digit()).collect();
            if digits.is_empty() {
                if i == 0 {
                    return Err(format!("invalid version: {}", s));
                }
                break;
            }
            parts[i] = digits
                .parse()
                .map_err(|e| format!("invalid version component '{}': {}", raw, e))?;
            seen += 1;
            if digits.len() != raw.len() {
                break;
            }
        }

        if seen == 0 {
            return Err(format!("invalid version: {}", s));
        }

        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl<'de> serde::Deserialize<'de> for Version {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for Version {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
