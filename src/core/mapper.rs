//! Mapping discovered serial endpoints to firmware roles.
//!
//! Discovery gives no identity for a board, so the mapping is positional:
//! in sorted order the first endpoint is the primary and the second the
//! secondary. Explicit overrides replace that guess per role, independently.

use serde::Serialize;

use crate::core::endpoint::SerialEndpoint;
use crate::core::target::Role;

/// Endpoints pinned on the command line or in config.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleOverrides {
    pub primary: Option<SerialEndpoint>,
    pub secondary: Option<SerialEndpoint>,
}

impl RoleOverrides {
    pub fn get(&self, role: Role) -> Option<&SerialEndpoint> {
        match role {
            Role::Primary => self.primary.as_ref(),
            Role::Secondary => self.secondary.as_ref(),
        }
    }
}

/// Where a role's endpoint came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "endpoint", rename_all = "lowercase")]
pub enum Assignment {
    /// Given explicitly.
    Override(SerialEndpoint),
    /// Picked by enumeration order.
    Discovered(SerialEndpoint),
}

impl Assignment {
    pub fn endpoint(&self) -> &SerialEndpoint {
        match self {
            Assignment::Override(e) | Assignment::Discovered(e) => e,
        }
    }

    pub fn is_discovered(&self) -> bool {
        matches!(self, Assignment::Discovered(_))
    }
}

/// Endpoint assignment for both roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RoleMap {
    pub primary: Option<Assignment>,
    pub secondary: Option<Assignment>,
}

impl RoleMap {
    pub fn get(&self, role: Role) -> Option<&Assignment> {
        match role {
            Role::Primary => self.primary.as_ref(),
            Role::Secondary => self.secondary.as_ref(),
        }
    }

    /// Roles whose endpoint was guessed from enumeration order.
    pub fn discovered_roles(&self) -> Vec<Role> {
        Role::ALL
            .into_iter()
            .filter(|r| self.get(*r).is_some_and(Assignment::is_discovered))
            .collect()
    }
}

/// Assign endpoints to roles.
///
/// `discovered` is sorted and deduplicated here, so callers cannot make the
/// mapping depend on probe order. At most two endpoints are used.
pub fn map_roles(discovered: &[SerialEndpoint], overrides: &RoleOverrides) -> RoleMap {
    let mut sorted = discovered.to_vec();
    sorted.sort();
    sorted.dedup();

    let assign = |role: Role, index: usize| match overrides.get(role) {
        Some(endpoint) => Some(Assignment::Override(endpoint.clone())),
        None => sorted.get(index).cloned().map(Assignment::Discovered),
    };

    RoleMap {
        primary: assign(Role::Primary, 0),
        secondary: assign(Role::Secondary, 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoints(paths: &[&str]) -> Vec<SerialEndpoint> {
        paths.iter().copied().map(SerialEndpoint::from).collect()
    }

    fn discovered(path: &str) -> Option<Assignment> {
        Some(Assignment::Discovered(SerialEndpoint::from(path)))
    }

    #[test]
    fn test_no_endpoints_no_roles() {
        let map = map_roles(&[], &RoleOverrides::default());
        assert_eq!(map, RoleMap::default());
    }

    #[test]
    fn test_single_endpoint_is_primary_only() {
        let map = map_roles(&endpoints(&["/dev/ttyUSB0"]), &RoleOverrides::default());
        assert_eq!(map.primary, discovered("/dev/ttyUSB0"));
        assert_eq!(map.secondary, None);
    }

    #[test]
    fn test_two_endpoints_in_sorted_order() {
        let map = map_roles(
            &endpoints(&["/dev/ttyACM1", "/dev/ttyACM0"]),
            &RoleOverrides::default(),
        );
        assert_eq!(map.primary, discovered("/dev/ttyACM0"));
        assert_eq!(map.secondary, discovered("/dev/ttyACM1"));
        assert_eq!(map.discovered_roles(), [Role::Primary, Role::Secondary]);
    }

    #[test]
    fn test_assigns_min_of_n_and_two() {
        let all = ["/dev/ttyUSB1", "/dev/ttyACM2", "/dev/ttyACM0", "/dev/ttyUSB0"];
        for n in 0..=all.len() {
            let map = map_roles(&endpoints(&all[..n]), &RoleOverrides::default());
            let assigned = Role::ALL.iter().filter(|r| map.get(**r).is_some()).count();
            assert_eq!(assigned, n.min(2), "n = {}", n);
        }

        let map = map_roles(&endpoints(&all), &RoleOverrides::default());
        assert_eq!(map.primary, discovered("/dev/ttyACM0"));
        assert_eq!(map.secondary, discovered("/dev/ttyACM2"));
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let map = map_roles(
            &endpoints(&["/dev/ttyACM0", "/dev/ttyACM0"]),
            &RoleOverrides::default(),
        );
        assert_eq!(map.primary, discovered("/dev/ttyACM0"));
        assert_eq!(map.secondary, None);
    }

    #[test]
    fn test_overrides_win_independently() {
        let found = endpoints(&["/dev/ttyACM0", "/dev/ttyACM1"]);

        let secondary_only = RoleOverrides {
            primary: None,
            secondary: Some("/dev/ttyUSB3".into()),
        };
        let map = map_roles(&found, &secondary_only);
        assert_eq!(map.primary, discovered("/dev/ttyACM0"));
        assert_eq!(
            map.secondary,
            Some(Assignment::Override("/dev/ttyUSB3".into()))
        );
        assert_eq!(map.discovered_roles(), [Role::Primary]);

        let primary_only = RoleOverrides {
            primary: Some("/dev/ttyUSB3".into()),
            secondary: None,
        };
        let map = map_roles(&[], &primary_only);
        assert_eq!(map.primary, Some(Assignment::Override("/dev/ttyUSB3".into())));
        assert_eq!(map.secondary, None);
    }
}
