/*
    tag - Tag index resolver

    A post's tag never appears in the log as text. The record store emits
    keccak256(tag) as an indexed topic, and readers match a filter string by
    hashing it the same way.

    Hashing is case-sensitive. A `TagPolicy` decides whether the client folds
    case first; it must run on BOTH the write and the read path, otherwise
    "News" posted and "news" filtered never meet.

    The hash is a public derived identifier, not a secret: anyone can hash a
    guessed tag and compare it with every record.
*/

use crate::primitives::{keccak256, H256};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// Keccak-256 of the tag's UTF-8 bytes.
///
/// This is the exact function the record store uses when it emits the
/// `NewPost` tag topic.
pub fn hash_tag(tag: &str) -> H256 {
    keccak256(tag.as_bytes())
}

/// Normalization applied to tag text before it is hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagPolicy {
    /// Hash the text exactly as entered
    #[default]
    Exact,
    /// Lowercase the text before hashing
    Lowercase,
}

impl TagPolicy {
    pub fn normalize<'a>(&self, tag: &'a str) -> Cow<'a, str> {
        match self {
            TagPolicy::Exact => Cow::Borrowed(tag),
            TagPolicy::Lowercase => {
                if tag.chars().any(char::is_uppercase) {
                    Cow::Owned(tag.to_lowercase())
                } else {
                    Cow::Borrowed(tag)
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TagPolicy::Exact => "exact",
            TagPolicy::Lowercase => "lowercase",
        }
    }
}

impl fmt::Display for TagPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "exact" => Ok(TagPolicy::Exact),
            "lowercase" => Ok(TagPolicy::Lowercase),
            other => Err(format!("unknown tag policy: {}", other)),
        }
    }
}

/// Resolves tag text to the topic the ledger indexes it under
#[derive(Debug, Clone, Copy, Default)]
pub struct TagIndex {
    policy: TagPolicy,
}

impl TagIndex {
    pub fn new(policy: TagPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> TagPolicy {
        self.policy
    }

    /// The tag text as it must be submitted on the write path
    pub fn normalize<'a>(&self, tag: &'a str) -> Cow<'a, str> {
        self.policy.normalize(tag)
    }

    /// The topic a post written through this index carries for `tag`
    pub fn hash(&self, tag: &str) -> H256 {
        hash_tag(&self.normalize(tag))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn prop_write_and_read_paths_agree(tag in "\\PC{0,32}", lowercase in any::<bool>()) {
            let policy = if lowercase { TagPolicy::Lowercase } else { TagPolicy::Exact };
            let index = TagIndex::new(policy);
            // Write path: normalize then hash on the ledger side
            let written = hash_tag(&index.normalize(&tag));
            prop_assert_eq!(written, index.hash(&tag));
            prop_assert_eq!(index.hash(&tag), index.hash(&tag));
        }
    }
}
