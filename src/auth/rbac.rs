/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Defines the four roles of the ordering system and the precedence used when
 * a principal holds more than one of them: Admin > Manager > Staff > Customer.
 */

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use strum::{EnumIter, IntoEnumIterator};

/// A named role. Variant order is precedence order (highest first), so the
/// derived `Ord` makes the smallest role the most privileged.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumIter,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[strum(ascii_case_insensitive)]
pub enum Role {
    Admin,
    Manager,
    Staff,
    Customer,
}

impl Role {
    pub fn description(self) -> &'static str {
        match self {
            Role::Admin => "Full system access with all administrative privileges",
            Role::Manager => "Manager who can oversee operations and generate reports",
            Role::Staff => "Restaurant staff who can manage orders and food items",
            Role::Customer => "Regular customer who can browse and order food",
        }
    }

    /// Staff and above work on other principals' orders.
    pub fn is_privileged(self) -> bool {
        self != Role::Customer
    }

    pub fn all() -> impl Iterator<Item = Role> {
        Role::iter()
    }
}

/// The roles held by one principal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSet(BTreeSet<Role>);

impl RoleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from stored role names. Names that match no known role
    /// are ignored.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .filter_map(|name| name.as_ref().trim().parse::<Role>().ok())
            .collect()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0.contains(&role)
    }

    pub fn contains_any(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.contains(*role))
    }

    /// The highest-precedence role held, if any.
    pub fn primary(&self) -> Option<Role> {
        self.0.iter().next().copied()
    }

    pub fn is_privileged(&self) -> bool {
        self.0.iter().any(|role| role.is_privileged())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        self.0.iter().copied()
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<T: IntoIterator<Item = Role>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|r| r.as_ref()).collect();
        f.write_str(&names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parses_role_names_case_insensitively() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("STAFF".parse::<Role>().unwrap(), Role::Staff);
        assert!("owner".parse::<Role>().is_err());
    }

    #[test]
    fn unknown_names_are_dropped() {
        let roles = RoleSet::from_names(["Customer", "superuser", " Manager "]);
        assert_eq!(roles.iter().collect::<Vec<_>>(), vec![Role::Manager, Role::Customer]);
    }

    #[test]
    fn admin_wins_over_every_other_role() {
        let roles: RoleSet = [Role::Customer, Role::Staff, Role::Admin].into_iter().collect();
        assert_eq!(roles.primary(), Some(Role::Admin));
        assert_eq!(roles.to_string(), "Admin,Staff,Customer");
    }

    #[test]
    fn empty_set_has_no_primary_role() {
        assert_eq!(RoleSet::new().primary(), None);
        assert!(!RoleSet::new().is_privileged());
    }

    fn role_strategy() -> impl Strategy<Value = Role> {
        prop_oneof![
            Just(Role::Admin),
            Just(Role::Manager),
            Just(Role::Staff),
            Just(Role::Customer),
        ]
    }

    proptest! {
        #[test]
        fn primary_is_highest_precedence(roles in proptest::collection::vec(role_strategy(), 1..8)) {
            let set: RoleSet = roles.iter().copied().collect();
            let expected = Role::all().find(|r| roles.contains(r));
            prop_assert_eq!(set.primary(), expected);
        }
    }
}
