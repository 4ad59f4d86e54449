//! Field path selection (`a.b[0].c`).

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::error::ConvertError;

static SEGMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<key>[^\[]+)(\[(?P<index>\d+)\])?$").expect("Invalid segment pattern")
});

#[derive(Debug, Clone, PartialEq, Eq)]
struct Segment {
    key: String,
    index: Option<usize>,
}

/// A dotted path with optional list indices, e.g. `items[0].id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<Segment>,
}

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, ConvertError> {
        let segments = raw
            .split('.')
            .map(|token| {
                let caps = SEGMENT
                    .captures(token)
                    .ok_or_else(|| ConvertError::InvalidPath(token.to_string()))?;
                let index = match caps.name("index") {
                    Some(m) => Some(
                        m.as_str()
                            .parse::<usize>()
                            .map_err(|_| ConvertError::InvalidPath(token.to_string()))?,
                    ),
                    None => None,
                };
                Ok(Segment {
                    key: caps["key"].to_string(),
                    index,
                })
            })
            .collect::<Result<Vec<_>, ConvertError>>()?;

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Parse a comma-separated list, ignoring blank entries.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ConvertError> {
        list.split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Self::parse)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Resolve against a value. Missing keys and out-of-range indices
    /// resolve to `None`.
    pub fn resolve<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        let mut current = value;
        for segment in &self.segments {
            current = current.as_object()?.get(&segment.key)?;
            if let Some(index) = segment.index {
                current = current.as_array()?.get(index)?;
            }
        }
        Some(current)
    }
}
