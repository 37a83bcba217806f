//! Property selectors: how products and queries name sets of properties.
//!
//! A selector is resolved against the index at query time; matching is a
//! pure function over one property so callers can evaluate it anywhere.
//! A list of selectors matches when any one of them does.

use serde::{Deserialize, Serialize};

use crate::model::{normalize_domain, Property, PropertyIdentifier};

/// One way of naming a set of properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectorExpression {
    /// Every property published by `domain`, optionally narrowed to one tag.
    Publisher {
        domain: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tag: Option<String>,
    },
    /// Every property carrying `tag`, across all publishers.
    Tag { tag: String },
    /// Any property carrying at least one of the listed identifiers.
    Identifiers {
        identifiers: Vec<PropertyIdentifier>,
    },
}

impl SelectorExpression {
    pub fn publisher(domain: impl Into<String>) -> Self {
        SelectorExpression::Publisher {
            domain: domain.into(),
            tag: None,
        }
    }

    pub fn publisher_tag(domain: impl Into<String>, tag: impl Into<String>) -> Self {
        SelectorExpression::Publisher {
            domain: domain.into(),
            tag: Some(tag.into()),
        }
    }

    pub fn tag(tag: impl Into<String>) -> Self {
        SelectorExpression::Tag { tag: tag.into() }
    }

    pub fn identifiers(identifiers: Vec<PropertyIdentifier>) -> Self {
        SelectorExpression::Identifiers { identifiers }
    }

    /// Whether this selector matches `property`.
    pub fn matches(&self, property: &Property) -> bool {
        match self {
            SelectorExpression::Publisher { domain, tag } => {
                if property.publisher_domain != normalize_domain(domain) {
                    return false;
                }
                match tag {
                    Some(t) => property.has_tag(t),
                    None => true,
                }
            }
            SelectorExpression::Tag { tag } => property.has_tag(tag),
            SelectorExpression::Identifiers { identifiers } => identifiers
                .iter()
                .any(|id| property.has_identifier(id.identifier_type, &id.value)),
        }
    }
}

impl std::fmt::Display for SelectorExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectorExpression::Publisher { domain, tag: None } => {
                write!(f, "publisher:{domain}")
            }
            SelectorExpression::Publisher {
                domain,
                tag: Some(tag),
            } => write!(f, "publisher:{domain}#{tag}"),
            SelectorExpression::Tag { tag } => write!(f, "tag:{tag}"),
            SelectorExpression::Identifiers { identifiers } => {
                write!(f, "identifiers[{}]", identifiers.len())
            }
        }
    }
}

/// OR across a selector list: true when any selector matches.
pub fn any_match(selectors: &[SelectorExpression], property: &Property) -> bool {
    selectors.iter().any(|s| s.matches(property))
}
