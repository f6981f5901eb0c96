//! Lenient deserializers shared by the wire types.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de;
use serde::Deserialize;

/// Accept an id as either a JSON number or a stringified number.
pub fn string_or_u64<'de, D: de::Deserializer<'de>>(d: D) -> std::result::Result<u64, D::Error> {
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = u64;
        fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
            f.write_str("u64 or stringified u64")
        }
        fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<u64, E> {
            Ok(v)
        }
        fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<u64, E> {
            u64::try_from(v).map_err(E::custom)
        }
        fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<u64, E> {
            v.trim().parse().map_err(E::custom)
        }
    }
    d.deserialize_any(Visitor)
}

/// A user reference that is either a bare id or an embedded user object.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UserRef {
    Id(#[serde(deserialize_with = "string_or_u64")] u64),
    Object(super::RawUser),
}

impl UserRef {
    pub fn id(&self) -> u64 {
        match self {
            UserRef::Id(id) => *id,
            UserRef::Object(user) => user.id,
        }
    }
}

/// Parse an API timestamp. RFC 3339 first, then a naive ISO-8601 form taken as UTC.
///
/// Returns `None` for anything unparseable; callers sort `None` as epoch zero.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
