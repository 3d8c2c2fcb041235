// ── Selection criteria ──
//
// One immutable value describing a selection request. Built by the CLI
// from flags layered over config defaults, validated once, then passed by
// reference through every pipeline stage.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::CoreError;
use crate::model::{Category, Coordinates, Protocol};

/// Which countries a request covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CountryScope {
    /// No country filtering (listing across the whole directory).
    All,
    /// Lowercase two-letter country code.
    Code(String),
}

impl CountryScope {
    pub fn matches(&self, country_code: &str) -> bool {
        match self {
            Self::All => true,
            Self::Code(code) => code.eq_ignore_ascii_case(country_code),
        }
    }
}

impl FromStr for CountryScope {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Ok(Self::Code(trimmed.to_ascii_lowercase()));
        }
        Err(CoreError::InvalidCriteria {
            field: "country".into(),
            reason: format!("'{s}' is not a two-letter country code"),
        })
    }
}

impl fmt::Display for CountryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Code(code) => f.write_str(code),
        }
    }
}

/// How the final server is picked from the latency-ranked pool.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum SelectionPolicy {
    /// Uniformly at random among the top-K.
    #[default]
    Random,
    /// Always the lowest-latency candidate.
    Best,
}

/// A single selection request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    pub country: CountryScope,
    pub area: Option<String>,
    pub location: Option<Coordinates>,
    pub protocol: Protocol,
    pub category: Category,
    /// Endpoints at or above this load are dropped.
    pub max_load: u8,
    /// Endpoints below this load are treated as stale and dropped.
    pub load_floor: u8,
    /// Size of the load-ranked candidate set.
    pub top_n: usize,
    /// Size of the final pool after latency ranking.
    pub top_k: usize,
    pub policy: SelectionPolicy,
}

impl Default for SelectionCriteria {
    fn default() -> Self {
        Self {
            country: CountryScope::All,
            area: None,
            location: None,
            protocol: Protocol::Udp,
            category: Category::Standard,
            max_load: 70,
            load_floor: 4,
            top_n: 10,
            top_k: 10,
            policy: SelectionPolicy::Random,
        }
    }
}

impl SelectionCriteria {
    pub fn for_country(country: CountryScope) -> Self {
        Self {
            country,
            ..Self::default()
        }
    }

    /// Check the internal consistency of the request.
    pub fn validate(&self) -> Result<(), CoreError> {
        fn invalid(field: &str, reason: impl Into<String>) -> CoreError {
            CoreError::InvalidCriteria {
                field: field.into(),
                reason: reason.into(),
            }
        }

        if self.top_n == 0 {
            return Err(invalid("top_servers", "must be at least 1"));
        }
        if self.top_k == 0 || self.top_k > self.top_n {
            return Err(invalid(
                "top_k",
                format!("must be between 1 and top_servers ({})", self.top_n),
            ));
        }
        if self.max_load > 101 {
            return Err(invalid("max_load", "must be at most 101"));
        }
        if self.load_floor >= self.max_load {
            return Err(invalid(
                "load_floor",
                format!("must be below max_load ({})", self.max_load),
            ));
        }
        if self.area.is_some() && self.location.is_some() {
            return Err(invalid("area", "cannot be combined with an exact location"));
        }
        if self.area.as_deref().is_some_and(|a| a.trim().is_empty()) {
            return Err(invalid("area", "must not be empty"));
        }
        Ok(())
    }

    /// Short human description used in "no servers match" messages.
    pub fn describe(&self) -> String {
        let mut parts = vec![format!("country={}", self.country)];
        if let Some(area) = &self.area {
            parts.push(format!("area={area}"));
        }
        if let Some(location) = &self.location {
            parts.push(format!("location={location}"));
        }
        parts.push(format!("category={}", self.category));
        parts.push(format!("protocol={}", self.protocol));
        parts.push(format!("load {}..{}", self.load_floor, self.max_load));
        parts.join(", ")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn country_scope_parsing() {
        assert_eq!("AU".parse::<CountryScope>().unwrap(), CountryScope::Code("au".into()));
        assert_eq!("all".parse::<CountryScope>().unwrap(), CountryScope::All);
        assert!("aus".parse::<CountryScope>().is_err());
        assert!("a1".parse::<CountryScope>().is_err());
    }

    #[test]
    fn scope_matching_is_case_insensitive() {
        let scope = CountryScope::Code("us".into());
        assert!(scope.matches("US"));
        assert!(!scope.matches("ca"));
        assert!(CountryScope::All.matches("anything"));
    }

    #[test]
    fn defaults_are_valid() {
        SelectionCriteria::default().validate().unwrap();
    }

    #[test]
    fn top_k_must_not_exceed_top_n() {
        let criteria = SelectionCriteria {
            top_n: 3,
            top_k: 4,
            ..SelectionCriteria::default()
        };
        let err = criteria.validate().unwrap_err();
        assert!(matches!(err, CoreError::InvalidCriteria { ref field, .. } if field == "top_k"));
    }

    #[test]
    fn floor_must_be_below_ceiling() {
        let criteria = SelectionCriteria {
            max_load: 10,
            load_floor: 10,
            ..SelectionCriteria::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn area_and_location_are_exclusive() {
        let criteria = SelectionCriteria {
            area: Some("Sydney".into()),
            location: Some(Coordinates::new(1.0, 2.0)),
            ..SelectionCriteria::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn describe_mentions_filters() {
        let criteria = SelectionCriteria {
            country: CountryScope::Code("au".into()),
            area: Some("Sydney".into()),
            category: Category::P2p,
            ..SelectionCriteria::default()
        };
        let text = criteria.describe();
        assert!(text.contains("country=au"));
        assert!(text.contains("area=Sydney"));
        assert!(text.contains("category=p2p"));
    }
}
