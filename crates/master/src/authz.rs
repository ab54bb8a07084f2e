// Copyright (c) 2023 - 2026 Restate Software, Inc., Restate GmbH.
// All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Coarse grained authorization of master rpcs.
//!
//! The transport authenticates the caller and attaches a [`RemoteUser`] to the request
//! extensions. Every call then names the set of [`UserRole`]s it accepts and the caller must be
//! a member of at least one of them, as decided by the configured ACLs.

use std::collections::HashSet;
use std::fmt;

use enumset::{EnumSet, EnumSetType};
use tonic::{Request, Status};
use tracing::warn;

use tessera_types::config::MasterOptions;

/// How the transport established the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum AuthenticationType {
    Unauthenticated,
    Kerberos,
    ClientCertificate,
    /// The caller presented an authn token previously issued by a master.
    AuthnToken,
}

/// Proven identity of the caller of an rpc.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUser {
    pub username: String,
    pub authenticated_by: AuthenticationType,
}

impl RemoteUser {
    pub fn new(username: impl Into<String>, authenticated_by: AuthenticationType) -> Self {
        Self {
            username: username.into(),
            authenticated_by,
        }
    }
}

impl fmt::Display for RemoteUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.authenticated_by)
    }
}

// PartialEq+Eq+Clone+Copy are implemented by EnumSetType
#[derive(Debug, Hash, EnumSetType, strum::Display)]
pub enum UserRole {
    SuperUser,
    User,
    ServiceUser,
}

/// Roles accepted by client facing metadata calls.
pub const CLIENT: EnumSet<UserRole> = enumset::enum_set!(UserRole::SuperUser | UserRole::User);
/// Roles accepted by calls reserved to tablet servers. Superusers are deliberately excluded,
/// heartbeat responses hand out signed certificates.
pub const SERVICE: EnumSet<UserRole> = enumset::enum_set!(UserRole::ServiceUser);
/// Roles accepted by discovery calls.
pub const CLIENT_OR_SERVICE: EnumSet<UserRole> =
    enumset::enum_set!(UserRole::SuperUser | UserRole::User | UserRole::ServiceUser);

/// A list of user names, or everybody.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acl {
    Everybody,
    Users(HashSet<String>),
}

impl Acl {
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self {
        if entries.iter().any(|entry| entry.as_ref().trim() == "*") {
            return Acl::Everybody;
        }
        Acl::Users(
            entries
                .iter()
                .map(|entry| entry.as_ref().trim().to_owned())
                .collect(),
        )
    }

    pub fn allows(&self, username: &str) -> bool {
        match self {
            Acl::Everybody => true,
            Acl::Users(users) => users.contains(username),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Authorizer {
    superusers: Acl,
    users: Acl,
    service_users: Acl,
}

impl Authorizer {
    pub fn new(options: &MasterOptions) -> Self {
        Self {
            superusers: Acl::from_entries(&options.superuser_acl),
            users: Acl::from_entries(&options.user_acl),
            service_users: Acl::from_entries(&options.service_acl),
        }
    }

    /// All roles the given user holds.
    pub fn roles_of(&self, user: &RemoteUser) -> EnumSet<UserRole> {
        let mut roles = EnumSet::empty();
        if self.superusers.allows(&user.username) {
            roles.insert(UserRole::SuperUser);
        }
        if self.users.allows(&user.username) {
            roles.insert(UserRole::User);
        }
        if self.service_users.allows(&user.username) {
            roles.insert(UserRole::ServiceUser);
        }
        roles
    }

    /// Returns the caller of `request` if it holds any of the `allowed` roles.
    pub fn authorize<T>(
        &self,
        request: &Request<T>,
        allowed: EnumSet<UserRole>,
    ) -> Result<RemoteUser, Status> {
        let Some(user) = request.extensions().get::<RemoteUser>() else {
            return Err(Status::unauthenticated("no authenticated user attached to call"));
        };

        if self.roles_of(user).is_disjoint(allowed) {
            warn!(
                user = %user,
                peer = ?request.remote_addr(),
                ?allowed,
                "Rejecting unauthorized call"
            );
            return Err(Status::permission_denied(format!(
                "Not authorized: {} is not allowed to perform this call",
                user.username
            )));
        }

        Ok(user.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use googletest::prelude::*;
    use tessera_types::config::MasterOptionsBuilder;
    use tonic::Code;

    fn request_from(user: &str, authenticated_by: AuthenticationType) -> Request<()> {
        let mut request = Request::new(());
        request
            .extensions_mut()
            .insert(RemoteUser::new(user, authenticated_by));
        request
    }

    fn authorizer() -> Authorizer {
        Authorizer::new(
            &MasterOptionsBuilder::default()
                .superuser_acl(vec!["admin".to_owned()])
                .user_acl(vec!["alice".to_owned(), "admin".to_owned()])
                .service_acl(vec!["tessera".to_owned()])
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn wildcard_acl_allows_everybody() {
        let acl = Acl::from_entries(&["bob", "*"]);
        assert_that!(acl.allows("anyone"), eq(true));
        assert_that!(Acl::from_entries::<&str>(&[]).allows("anyone"), eq(false));
    }

    #[test]
    fn roles_follow_acls() {
        let authz = authorizer();
        let admin = RemoteUser::new("admin", AuthenticationType::Kerberos);
        assert_that!(
            authz.roles_of(&admin),
            eq(UserRole::SuperUser | UserRole::User)
        );
        let service = RemoteUser::new("tessera", AuthenticationType::ClientCertificate);
        assert_that!(authz.roles_of(&service), eq(EnumSet::only(UserRole::ServiceUser)));
    }

    #[test]
    fn superusers_cannot_act_as_tablet_servers() {
        let authz = authorizer();
        let status = authz
            .authorize(&request_from("admin", AuthenticationType::Kerberos), SERVICE)
            .unwrap_err();
        assert_that!(status.code(), eq(Code::PermissionDenied));

        let user = authz
            .authorize(
                &request_from("tessera", AuthenticationType::ClientCertificate),
                SERVICE,
            )
            .unwrap();
        assert_that!(user.username, eq("tessera"));
    }

    #[test]
    fn missing_identity_is_unauthenticated() {
        let status = authorizer()
            .authorize(&Request::new(()), CLIENT_OR_SERVICE)
            .unwrap_err();
        assert_that!(status.code(), eq(Code::Unauthenticated));
    }
}
