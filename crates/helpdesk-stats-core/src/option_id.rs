//! Identifiers for taxonomy options in the editor.
//!
//! Published options are addressed by their definition id. Options that
//! exist only as create-drafts are addressed by their draft row id. On the
//! wire the two share one id space: published ids are plain numbers, draft
//! ids are strings of the form `new_<draft id>`.

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::StatsError;

const DRAFT_PREFIX: &str = "new_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OptionId {
    /// Row id in `option_definitions`.
    Published(i64),
    /// Row id in `option_drafts` of a not yet published create-draft.
    Draft(i64),
}

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionId::Published(id) => write!(f, "{}", id),
            OptionId::Draft(id) => write!(f, "{}{}", DRAFT_PREFIX, id),
        }
    }
}

impl FromStr for OptionId {
    type Err = StatsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || StatsError::validation("id", format!("'{}' is not an option id", s));
        let (raw, draft) = match s.strip_prefix(DRAFT_PREFIX) {
            Some(rest) => (rest, true),
            None => (s, false),
        };
        let id: i64 = raw.parse().map_err(|_| invalid())?;
        if id <= 0 {
            return Err(invalid());
        }
        Ok(if draft {
            OptionId::Draft(id)
        } else {
            OptionId::Published(id)
        })
    }
}

impl Serialize for OptionId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            OptionId::Published(id) => serializer.serialize_i64(*id),
            OptionId::Draft(_) => serializer.collect_str(self),
        }
    }
}

impl<'de> Deserialize<'de> for OptionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OptionIdVisitor;

        impl Visitor<'_> for OptionIdVisitor {
            type Value = OptionId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a positive integer or a \"new_<n>\" string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<OptionId, E> {
                if v <= 0 {
                    return Err(E::custom(format!("option id must be positive, got {}", v)));
                }
                Ok(OptionId::Published(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<OptionId, E> {
                let v = i64::try_from(v).map_err(|_| E::custom("option id out of range"))?;
                self.visit_i64(v)
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<OptionId, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(OptionIdVisitor)
    }
}
