// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Application-assigned user identity, the push address (§3, GLOSSARY).
///
/// `user-id-fn` may legitimately return "no identity" for an anonymous
/// visitor; rather than smuggling that through a magic string the way the
/// source spec's `:nil-uid` keyword does, it gets its own enum variant so
/// registry code can never collide an application uid with the sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Uid {
    /// `user-id-fn` returned nothing — the connection is still tracked
    /// (and can still be pushed to as a group), it just has no stable
    /// per-user identity across reconnects from a different client-id.
    Nil,
    Known(String),
}

impl Uid {
    pub fn known(id: impl Into<String>) -> Self {
        Self::Known(id.into())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Nil => "chsk/nil-uid",
            Self::Known(s) => s,
        }
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Option<String>> for Uid {
    fn from(value: Option<String>) -> Self {
        match value {
            Some(s) if !s.is_empty() => Self::Known(s),
            _ => Self::Nil,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_from_none() {
        assert_eq!(Uid::from(None), Uid::Nil);
    }

    #[test]
    fn nil_from_empty_string() {
        assert_eq!(Uid::from(Some(String::new())), Uid::Nil);
    }

    #[test]
    fn known_from_some() {
        assert_eq!(Uid::from(Some("alice".to_owned())), Uid::known("alice"));
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Uid::Nil.to_string(), "chsk/nil-uid");
        assert_eq!(Uid::known("bob").to_string(), "bob");
    }
}
