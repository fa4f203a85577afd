use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// The static type of an hlb value, encoded as `primary` or
/// `primary::secondary`.
///
/// Only `option` admits a secondary; the secondary names the function the
/// option bag belongs to (`option::run`, `option::mount`, ...).
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct Kind(String);

impl Kind {
    pub const STRING: &'static str = "string";
    pub const INT: &'static str = "int";
    pub const BOOL: &'static str = "bool";
    pub const FS: &'static str = "fs";
    pub const PIPELINE: &'static str = "pipeline";
    pub const OPTION: &'static str = "option";
    pub const NONE: &'static str = "none";

    /// The deprecated spelling of [`Kind::PIPELINE`], rewritten by the linter.
    pub const GROUP: &'static str = "group";

    pub fn new(encoding: impl Into<String>) -> Self {
        Self(encoding.into())
    }

    pub fn string() -> Self {
        Self::new(Self::STRING)
    }

    pub fn int() -> Self {
        Self::new(Self::INT)
    }

    pub fn bool() -> Self {
        Self::new(Self::BOOL)
    }

    pub fn fs() -> Self {
        Self::new(Self::FS)
    }

    pub fn pipeline() -> Self {
        Self::new(Self::PIPELINE)
    }

    pub fn none() -> Self {
        Self::new(Self::NONE)
    }

    /// A bare `option` kind, matching any `option::x`.
    pub fn option() -> Self {
        Self::new(Self::OPTION)
    }

    /// The option kind owned by the function `func`, e.g. `option::run`.
    pub fn option_of(func: &str) -> Self {
        Self::new(format!("{}::{func}", Self::OPTION))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part before `::`.
    pub fn primary(&self) -> &str {
        match self.0.split_once("::") {
            Some((primary, _)) => primary,
            None => &self.0,
        }
    }

    /// The part after `::`, if any.
    pub fn secondary(&self) -> Option<&str> {
        self.0.split_once("::").map(|(_, secondary)| secondary)
    }

    pub fn is_option(&self) -> bool {
        self.primary() == Self::OPTION
    }

    pub fn is_none(&self) -> bool {
        self.0 == Self::NONE
    }

    /// Returns whether this names one of the primaries a declaration may be
    /// typed with.
    pub fn is_primary(&self) -> bool {
        matches!(
            self.0.as_str(),
            Self::STRING | Self::INT | Self::BOOL | Self::FS | Self::PIPELINE | Self::OPTION
        )
    }

    /// Kind equality: encodings must match, except that a bare `option`
    /// matches any `option::x` (and vice versa).
    pub fn equals(&self, other: &Kind) -> bool {
        if self.0 == other.0 {
            return true;
        }
        self.is_option() && other.is_option() && (self.secondary().is_none() || other.secondary().is_none())
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Kind {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// An unordered set of kinds with sorted iteration.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KindSet(BTreeSet<Kind>);

impl KindSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: Kind) {
        self.0.insert(kind);
    }

    pub fn contains(&self, kind: &Kind) -> bool {
        self.0.iter().any(|k| k.equals(kind))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Kinds in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &Kind> {
        self.0.iter()
    }
}

impl FromIterator<Kind> for KindSet {
    fn from_iter<I: IntoIterator<Item = Kind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for KindSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in self.iter() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{kind}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn primary_secondary_split() {
        let kind = Kind::option_of("run");
        assert_eq!(kind.primary(), "option");
        assert_eq!(kind.secondary(), Some("run"));
        assert_eq!(Kind::fs().primary(), "fs");
        assert_eq!(Kind::fs().secondary(), None);
    }

    #[test]
    fn equals_is_reflexive_and_symmetric() {
        let kinds =
            [Kind::string(), Kind::fs(), Kind::option(), Kind::option_of("run"), Kind::none()];
        for a in &kinds {
            assert!(a.equals(a));
            for b in &kinds {
                assert_eq!(a.equals(b), b.equals(a));
            }
        }
    }

    #[test]
    fn option_relaxation() {
        assert!(Kind::option().equals(&Kind::option_of("run")));
        assert!(Kind::option_of("run").equals(&Kind::option()));
        assert!(!Kind::option_of("run").equals(&Kind::option_of("mount")));
        assert!(!Kind::option().equals(&Kind::fs()));
    }

    #[test]
    fn set_iterates_sorted() {
        let set: KindSet =
            [Kind::string(), Kind::fs(), Kind::bool()].into_iter().collect();
        let names: Vec<_> = set.iter().map(|k| k.as_str().to_string()).collect();
        assert_eq!(names, vec!["bool", "fs", "string"]);
        assert_eq!(set.to_string(), "bool, fs, string");
    }

    #[test]
    fn set_contains_applies_relaxation() {
        let set: KindSet = [Kind::option_of("run")].into_iter().collect();
        assert!(set.contains(&Kind::option()));
        assert!(!set.contains(&Kind::option_of("mount")));
    }
}
