//! Delegable permissions and the set type used for authority decisions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A capability one organization may exercise against another.
///
/// The set is closed; declaration order is the canonical order used when a
/// [`PermissionMask`] is iterated or serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelegationPermission {
    ManageCampaigns,
    ViewCampaigns,
    ManageAffiliates,
    ViewAffiliates,
    ManageTrackingLinks,
    ViewTrackingLinks,
    ViewAnalytics,
    ManageBilling,
    ViewBilling,
}

impl DelegationPermission {
    pub const ALL: [DelegationPermission; 9] = [
        Self::ManageCampaigns,
        Self::ViewCampaigns,
        Self::ManageAffiliates,
        Self::ViewAffiliates,
        Self::ManageTrackingLinks,
        Self::ViewTrackingLinks,
        Self::ViewAnalytics,
        Self::ManageBilling,
        Self::ViewBilling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManageCampaigns => "manage_campaigns",
            Self::ViewCampaigns => "view_campaigns",
            Self::ManageAffiliates => "manage_affiliates",
            Self::ViewAffiliates => "view_affiliates",
            Self::ManageTrackingLinks => "manage_tracking_links",
            Self::ViewTrackingLinks => "view_tracking_links",
            Self::ViewAnalytics => "view_analytics",
            Self::ManageBilling => "manage_billing",
            Self::ViewBilling => "view_billing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl fmt::Display for DelegationPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DelegationPermission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown permission: {}", s))
    }
}

/// A set of [`DelegationPermission`] values.
///
/// Equality is set equality. Serialized as a list in declaration order.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PermissionMask(u16);

impl PermissionMask {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self((1 << DelegationPermission::ALL.len()) - 1)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_all(&self) -> bool {
        *self == Self::all()
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn contains(&self, permission: DelegationPermission) -> bool {
        self.0 & permission.bit() != 0
    }

    pub fn insert(&mut self, permission: DelegationPermission) {
        self.0 |= permission.bit();
    }

    pub fn remove(&mut self, permission: DelegationPermission) {
        self.0 &= !permission.bit();
    }

    pub fn with(mut self, permission: DelegationPermission) -> Self {
        self.insert(permission);
        self
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_subset(&self, other: &Self) -> bool {
        other.is_superset(self)
    }

    pub fn iter(&self) -> impl Iterator<Item = DelegationPermission> + '_ {
        DelegationPermission::ALL
            .into_iter()
            .filter(|p| self.contains(*p))
    }

    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|p| p.as_str().to_string()).collect()
    }

    /// Parse a list of permission names, failing on the first unknown one.
    pub fn parse_all<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        names
            .iter()
            .map(|n| n.as_ref().parse::<DelegationPermission>())
            .collect()
    }
}

impl fmt::Debug for PermissionMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<DelegationPermission> for PermissionMask {
    fn from_iter<I: IntoIterator<Item = DelegationPermission>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for p in iter {
            mask.insert(p);
        }
        mask
    }
}

impl<const N: usize> From<[DelegationPermission; N]> for PermissionMask {
    fn from(permissions: [DelegationPermission; N]) -> Self {
        permissions.into_iter().collect()
    }
}

impl Serialize for PermissionMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for PermissionMask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let permissions = Vec::<DelegationPermission>::deserialize(deserializer)?;
        Ok(permissions.into_iter().collect())
    }
}
