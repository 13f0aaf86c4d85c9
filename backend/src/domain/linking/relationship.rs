//! Contact relationship kinds and their display labels.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of relationships a contact may have to its owner.
///
/// # Examples
/// ```
/// use tandem::domain::linking::Relationship;
///
/// assert_eq!(Relationship::parse("Co-Parent"), Some(Relationship::CoParent));
/// assert_eq!(Relationship::CoParent.display_label(), "My Co-Parent");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relationship {
    CoParent,
    Child,
    Partner,
    Family,
    Friend,
    Professional,
    Other,
}

impl Relationship {
    /// Storage form, e.g. `co-parent`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CoParent => "co-parent",
            Self::Child => "child",
            Self::Partner => "partner",
            Self::Family => "family",
            Self::Friend => "friend",
            Self::Professional => "professional",
            Self::Other => "other",
        }
    }

    /// Lenient parse: case-insensitive, accepts `_` or space for `-` and the
    /// unhyphenated `coparent`.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_lowercase().replace(['_', ' '], "-");
        match key.as_str() {
            "co-parent" | "coparent" => Some(Self::CoParent),
            "child" => Some(Self::Child),
            "partner" => Some(Self::Partner),
            "family" => Some(Self::Family),
            "friend" => Some(Self::Friend),
            "professional" => Some(Self::Professional),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Label shown in contact lists.
    #[must_use]
    pub const fn display_label(self) -> &'static str {
        match self {
            Self::CoParent => "My Co-Parent",
            Self::Child => "My Child",
            Self::Partner => "My Partner",
            Self::Family => "Family Member",
            Self::Friend => "Friend",
            Self::Professional => "Professional",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("co-parent", Some(Relationship::CoParent))]
    #[case(" CoParent ", Some(Relationship::CoParent))]
    #[case("co_parent", Some(Relationship::CoParent))]
    #[case("Professional", Some(Relationship::Professional))]
    #[case("neighbour", None)]
    #[case("", None)]
    fn parse_is_lenient(#[case] raw: &str, #[case] expected: Option<Relationship>) {
        assert_eq!(Relationship::parse(raw), expected);
    }

    #[rstest]
    fn storage_form_parses_back() {
        for relationship in [
            Relationship::CoParent,
            Relationship::Child,
            Relationship::Partner,
            Relationship::Family,
            Relationship::Friend,
            Relationship::Professional,
            Relationship::Other,
        ] {
            assert_eq!(Relationship::parse(relationship.as_str()), Some(relationship));
        }
    }

    #[rstest]
    fn serde_uses_storage_form() {
        let value = serde_json::to_value(Relationship::CoParent).expect("serialise");
        assert_eq!(value, serde_json::json!("co-parent"));
    }
}
