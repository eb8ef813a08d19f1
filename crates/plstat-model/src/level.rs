use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A logical addressing level within a record.
///
/// `MOUS` is the record's own top level; the others name the required
/// sub-groups keyed by entity identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Mous,
    Eb,
    Spw,
    Target,
    Stage,
}

impl Level {
    /// The fixed probe order used by `Record::level_of`.
    ///
    /// A field name present at two levels resolves to the earlier one; this
    /// precedence is a deliberate, known ambiguity of the query scheme.
    pub const PROBE_ORDER: [Level; 5] =
        [Level::Mous, Level::Eb, Level::Spw, Level::Target, Level::Stage];

    /// The group key this level uses inside a record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mous => "MOUS",
            Self::Eb => "EB",
            Self::Spw => "SPW",
            Self::Target => "TARGET",
            Self::Stage => "STAGE",
        }
    }

    /// The derived index field listing this level's entity names.
    pub fn list_field(&self) -> Option<&'static str> {
        match self {
            Self::Eb => Some("eb_list"),
            Self::Spw => Some("spw_list"),
            Self::Target => Some("target_list"),
            Self::Mous | Self::Stage => None,
        }
    }

    /// The derived count field for this level.
    pub fn count_field(&self) -> Option<&'static str> {
        match self {
            Self::Eb => Some("n_EB"),
            Self::Spw => Some("n_spw"),
            Self::Target => Some("n_target"),
            Self::Mous | Self::Stage => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "MOUS" => Ok(Self::Mous),
            "EB" => Ok(Self::Eb),
            "SPW" => Ok(Self::Spw),
            "TARGET" => Ok(Self::Target),
            "STAGE" => Ok(Self::Stage),
            other => Err(ModelError::LevelNotFound(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_order_starts_at_mous() {
        assert_eq!(Level::PROBE_ORDER[0], Level::Mous);
        assert_eq!(Level::PROBE_ORDER[4], Level::Stage);
    }

    #[test]
    fn parse_roundtrip() {
        for level in Level::PROBE_ORDER {
            assert_eq!(level.as_str().parse::<Level>().unwrap(), level);
        }
    }

    #[test]
    fn unknown_level_is_an_error() {
        assert!("IMAGE".parse::<Level>().is_err());
    }

    #[test]
    fn index_fields() {
        assert_eq!(Level::Eb.list_field(), Some("eb_list"));
        assert_eq!(Level::Eb.count_field(), Some("n_EB"));
        assert_eq!(Level::Stage.list_field(), None);
    }
}
