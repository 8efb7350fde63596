//! Internal implementation of the identifier types.

use crate::UuidError;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

const URN_PREFIX: &str = "urn:uuid:";

/// Identifier of a single FHIR resource inside a bundle.
///
/// Displayed in the hyphenated form FHIR documents conventionally carry
/// (`550e8400-e29b-41d4-a716-446655440000`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(Uuid);

impl Default for ResourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceId {
    /// Generates a fresh random resource identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the `urn:uuid:<id>` form used for `fullUrl` and references.
    pub fn urn(&self) -> String {
        format!("{URN_PREFIX}{}", self.0.hyphenated())
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A time-prefixed identifier for one stored bundle.
///
/// Format:
/// `YYYYMMDDTHHMMSS.mmmZ-<canonical_uuid>`
///
/// The timestamp is held at millisecond precision so that the displayed form round-trips
/// exactly and ordering by value matches ordering by string.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BundleId {
    timestamp: DateTime<Utc>,
    uuid: Uuid,
}

impl BundleId {
    /// Generate a new bundle identifier.
    ///
    /// If `last` is provided, the timestamp is guaranteed to be strictly greater than the last
    /// one (by at least 1 ms).
    pub fn generate(last: Option<&BundleId>) -> Self {
        let now = truncate_to_millis(Utc::now());

        let timestamp = match last {
            Some(prev) if now <= prev.timestamp => prev.timestamp + Duration::milliseconds(1),
            _ => now,
        };

        Self {
            timestamp,
            uuid: Uuid::new_v4(),
        }
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }
}

impl FromStr for BundleId {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (ts_str, uuid_str) = s.split_once('-').ok_or_else(|| {
            UuidError::InvalidInput(format!("Invalid bundle id format: '{}'", s))
        })?;

        let ts_no_z = ts_str.strip_suffix('Z').ok_or_else(|| {
            UuidError::InvalidInput(format!("Timestamp must end with 'Z': '{}'", ts_str))
        })?;

        let naive =
            chrono::NaiveDateTime::parse_from_str(ts_no_z, "%Y%m%dT%H%M%S%.3f").map_err(|e| {
                UuidError::InvalidInput(format!("Invalid timestamp format '{}': {}", ts_str, e))
            })?;

        if !is_canonical(uuid_str) {
            return Err(UuidError::InvalidInput(format!(
                "UUID must be 32 lowercase hex characters without hyphens, got: '{}'",
                uuid_str
            )));
        }
        let uuid = Uuid::parse_str(uuid_str)
            .map_err(|e| UuidError::InvalidInput(format!("Invalid UUID '{}': {}", uuid_str, e)))?;

        Ok(Self {
            timestamp: DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc),
            uuid,
        })
    }
}

impl fmt::Display for BundleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
            self.uuid.simple()
        )
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for BundleId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for BundleId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Process-wide source of strictly increasing [`BundleId`]s.
///
/// Stores share one generator so that concurrent inserts into the same collection still get
/// distinct, ordered file names.
#[derive(Debug, Default)]
pub struct BundleIdGenerator {
    last: Mutex<Option<BundleId>>,
}

impl BundleIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the next identifier, strictly later than every one handed out before.
    pub fn next_id(&self) -> BundleId {
        // A poisoned lock still holds a valid last id.
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        let id = BundleId::generate(last.as_ref());
        *last = Some(id.clone());
        id
    }
}

fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

fn is_canonical(input: &str) -> bool {
    input.len() == 32
        && input
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
