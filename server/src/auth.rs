use std::collections::HashSet;

use dcs_protocol::Permission;
use tokio::net::UnixStream;

use crate::config::Config;

/// Identity of the process on the other end of an accepted socket, read via
/// `SO_PEERCRED` (`UnixStream::peer_cred`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerIdentity {
    pub uid: u32,
    pub pid: i32,
}

pub fn peer_identity(stream: &UnixStream) -> std::io::Result<PeerIdentity> {
    let cred = stream.peer_cred()?;
    Ok(PeerIdentity {
        uid: cred.uid(),
        pid: cred.pid().unwrap_or(-1),
    })
}

/// The permission set the connecting process is authorized for, independent
/// of whatever subset it asks for in its client-hello.
pub fn authorized_permissions(config: &Config, identity: PeerIdentity) -> HashSet<Permission> {
    config.permissions_for_uid(identity.uid)
}

/// A client-hello may only request a subset of what its peer identity is
/// authorized for; anything else is a handshake-time protocol fault.
pub fn requested_permissions_are_authorized(
    requested: &HashSet<Permission>,
    authorized: &HashSet<Permission>,
) -> bool {
    requested.is_subset(authorized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(uid: u32, perms: &[Permission]) -> Config {
        let mut config = Config::default();
        config.authorization.insert(uid, perms.iter().copied().collect());
        config
    }

    #[test]
    fn unknown_uid_authorizes_nothing() {
        let config = Config::default();
        let identity = PeerIdentity { uid: 1000, pid: 1 };
        assert!(authorized_permissions(&config, identity).is_empty());
    }

    #[test]
    fn requesting_a_subset_of_the_authorized_set_is_allowed() {
        let authorized: HashSet<Permission> =
            [Permission::CommandExecution, Permission::ObjectModelRead].into_iter().collect();
        let requested: HashSet<Permission> = [Permission::CommandExecution].into_iter().collect();
        assert!(requested_permissions_are_authorized(&requested, &authorized));
    }

    #[test]
    fn requesting_more_than_authorized_is_rejected() {
        let authorized: HashSet<Permission> = [Permission::CommandExecution].into_iter().collect();
        let requested: HashSet<Permission> =
            [Permission::CommandExecution, Permission::ManagePlugins].into_iter().collect();
        assert!(!requested_permissions_are_authorized(&requested, &authorized));
    }

    #[test]
    fn config_lookup_round_trips() {
        let config = config_with(1001, &[Permission::ManagePlugins]);
        let identity = PeerIdentity { uid: 1001, pid: 42 };
        let _ = HashMap::<u32, HashSet<Permission>>::new();
        assert!(authorized_permissions(&config, identity).contains(&Permission::ManagePlugins));
    }
}
