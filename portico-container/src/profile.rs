//! Environment tags.
//!
//! A [`Profile`] selects which implementation binding of a contract is
//! active (production adapters vs. test fakes). Profiles are
//! case-insensitive and extensible; [`Profile::ALL`] (`*`) matches
//! every environment.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An environment label such as `production` or `test`.
///
/// ```
/// use portico_container::profile::Profile;
///
/// assert_eq!(Profile::new("PROD-EU"), Profile::new("prod-eu"));
/// assert_eq!(Profile::TEST.as_str(), "test");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Profile(Cow<'static, str>);

impl Profile {
    pub const PRODUCTION: Profile = Profile(Cow::Borrowed("production"));
    pub const TEST: Profile = Profile(Cow::Borrowed("test"));
    pub const DEVELOPMENT: Profile = Profile(Cow::Borrowed("development"));
    pub const STAGING: Profile = Profile(Cow::Borrowed("staging"));
    pub const CI: Profile = Profile(Cow::Borrowed("ci"));
    /// Wildcard: an implementation tagged `*` is active under every profile.
    pub const ALL: Profile = Profile(Cow::Borrowed("*"));

    /// Creates a profile, lower-casing the label.
    pub fn new(label: impl AsRef<str>) -> Self {
        Profile(Cow::Owned(label.as_ref().to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[inline]
    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Profile {
    fn from(value: &str) -> Self {
        Profile::new(value)
    }
}

impl From<String> for Profile {
    fn from(value: String) -> Self {
        Profile::new(value)
    }
}

impl From<Profile> for String {
    fn from(value: Profile) -> Self {
        value.0.into_owned()
    }
}

/// The set of environment tags an implementation binding is active under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileSet(BTreeSet<Profile>);

impl ProfileSet {
    /// The `{*}` set: active everywhere.
    pub fn all() -> Self {
        let mut set = BTreeSet::new();
        set.insert(Profile::ALL);
        ProfileSet(set)
    }

    pub fn of(profiles: impl IntoIterator<Item = Profile>) -> Self {
        let set: BTreeSet<Profile> = profiles.into_iter().collect();
        if set.is_empty() {
            return Self::all();
        }
        ProfileSet(set)
    }

    /// Whether a binding with this tag set is active under `active`.
    ///
    /// No active profile means no filtering.
    pub fn matches(&self, active: Option<&Profile>) -> bool {
        match active {
            None => true,
            Some(profile) => self.is_wildcard() || self.0.contains(profile),
        }
    }

    /// Whether some environment would activate both sets at once.
    pub fn overlaps(&self, other: &ProfileSet) -> bool {
        self.is_wildcard() || other.is_wildcard() || !self.0.is_disjoint(&other.0)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.contains(&Profile::ALL)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.0.iter()
    }
}

impl Default for ProfileSet {
    fn default() -> Self {
        Self::all()
    }
}

impl fmt::Display for ProfileSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<&str> = self.0.iter().map(Profile::as_str).collect();
        write!(f, "[{}]", labels.join(", "))
    }
}
