//! Read-only parameter groups consumed by catalog renderers.
use std::collections::BTreeMap;

/// A single entry of a parameter group.
///
/// # Examples
///
/// ```
/// use syscfg::config::Entry;
///
/// let flag = Entry::Scalar("quiet".into());
/// let pair = Entry::Pair("Storage".into(), "none".into());
/// assert_ne!(flag, pair);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// A bare value (kernel parameter, module name, package name).
    Scalar(String),
    /// A key/value setting.
    Pair(String, String),
}

/// Named parameter groups, each an ordered sequence of entries.
///
/// Group order is irrelevant (lookups are by name); entry order within a
/// group is preserved and drives output ordering in rendered files.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationState {
    groups: BTreeMap<String, Vec<Entry>>,
}

impl ConfigurationState {
    /// Create an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style helper that sets a group of scalars.
    #[must_use]
    pub fn with_scalars<I, S>(mut self, group: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_group(
            group,
            values.into_iter().map(|v| Entry::Scalar(v.into())).collect(),
        );
        self
    }

    /// Builder-style helper that sets a group of key/value pairs.
    #[must_use]
    pub fn with_pairs<I, K, V>(mut self, group: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.set_group(
            group,
            pairs
                .into_iter()
                .map(|(k, v)| Entry::Pair(k.into(), v.into()))
                .collect(),
        );
        self
    }

    /// Replace a group wholesale.
    pub fn set_group(&mut self, group: &str, entries: Vec<Entry>) {
        self.groups.insert(group.to_string(), entries);
    }

    /// Entries of a group, or an empty slice if the group is not defined.
    #[must_use]
    pub fn group(&self, group: &str) -> &[Entry] {
        self.groups.get(group).map_or(&[], Vec::as_slice)
    }

    /// Whether a group is defined (possibly empty).
    #[must_use]
    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    /// Names of all defined groups, sorted.
    pub fn group_names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }

    /// Scalar entries of a group, in order. Pair entries are skipped.
    pub fn scalars<'a>(&'a self, group: &str) -> impl Iterator<Item = &'a str> + use<'a> {
        self.group(group).iter().filter_map(|e| match e {
            Entry::Scalar(v) => Some(v.as_str()),
            Entry::Pair(..) => None,
        })
    }

    /// Key/value entries of a group, in order. Scalar entries are skipped.
    pub fn pairs<'a>(&'a self, group: &str) -> impl Iterator<Item = (&'a str, &'a str)> + use<'a> {
        self.group(group).iter().filter_map(|e| match e {
            Entry::Pair(k, v) => Some((k.as_str(), v.as_str())),
            Entry::Scalar(_) => None,
        })
    }

    /// Value for `key` in a pair group (first match wins).
    #[must_use]
    pub fn value(&self, group: &str, key: &str) -> Option<&str> {
        self.pairs(group).find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Overlay `other` on top of `self`: each group present in `other`
    /// replaces the group of the same name.
    pub fn merge(&mut self, other: Self) {
        for (name, entries) in other.groups {
            self.groups.insert(name, entries);
        }
    }
}
