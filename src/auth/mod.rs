/*!
 * # Actor identity
 *
 * The service does not authenticate anyone itself. An upstream proxy resolves
 * the caller and forwards the result in two headers:
 *
 * - `x-actor-id`: the user's UUID
 * - `x-actor-role`: one of `admin`, `staff`, `viewer`
 *
 * Handlers take an [`Actor`] extractor; a missing or malformed header yields
 * `401 Unauthorized`. The role is evaluated as given on every call and is never
 * stored alongside ledger records.
 */

pub mod policy;

use crate::errors::ServiceError;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;

pub use policy::{evaluate, Decision, DenyReason};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, ToSchema,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    Admin,
    Staff,
    Viewer,
}

impl Role {
    /// Staff and admins may create items and record movements.
    pub fn can_write(&self) -> bool {
        matches!(self, Role::Admin | Role::Staff)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

/// The user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    /// Fails with `Forbidden` unless the actor may write item data.
    pub fn require_writer(&self) -> Result<(), ServiceError> {
        if self.role.can_write() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} is read-only",
                self.role
            )))
        }
    }

    /// Fails with `Forbidden` unless the actor is an admin.
    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.role.is_admin() {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(format!(
                "role {} cannot perform admin operations",
                self.role
            )))
        }
    }

    fn from_parts(parts: &Parts) -> Result<Self, ServiceError> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ServiceError::Unauthorized(format!("missing {} header", name)))
        };

        let user_id = Uuid::parse_str(header(ACTOR_ID_HEADER)?).map_err(|_| {
            ServiceError::Unauthorized(format!("{} must be a UUID", ACTOR_ID_HEADER))
        })?;
        let role = Role::from_str(header(ACTOR_ROLE_HEADER)?).map_err(|_| {
            ServiceError::Unauthorized(format!(
                "{} must be one of admin, staff, viewer",
                ACTOR_ROLE_HEADER
            ))
        })?;

        Ok(Actor { user_id, role })
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Actor::from_parts(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use axum::http::Request;

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn parses_actor_from_headers() {
        let id = Uuid::new_v4();
        let p = parts(&[
            (ACTOR_ID_HEADER, &id.to_string()),
            (ACTOR_ROLE_HEADER, "Staff"),
        ]);
        let actor = Actor::from_parts(&p).unwrap();
        assert_eq!(actor, Actor::new(id, Role::Staff));
    }

    #[test]
    fn missing_or_malformed_headers_are_unauthorized() {
        let id = Uuid::new_v4().to_string();
        assert_matches!(
            Actor::from_parts(&parts(&[(ACTOR_ROLE_HEADER, "admin")])),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            Actor::from_parts(&parts(&[
                (ACTOR_ID_HEADER, "not-a-uuid"),
                (ACTOR_ROLE_HEADER, "admin")
            ])),
            Err(ServiceError::Unauthorized(_))
        );
        assert_matches!(
            Actor::from_parts(&parts(&[
                (ACTOR_ID_HEADER, id.as_str()),
                (ACTOR_ROLE_HEADER, "owner")
            ])),
            Err(ServiceError::Unauthorized(_))
        );
    }

    #[test]
    fn role_gates() {
        let viewer = Actor::new(Uuid::new_v4(), Role::Viewer);
        let staff = Actor::new(Uuid::new_v4(), Role::Staff);
        let admin = Actor::new(Uuid::new_v4(), Role::Admin);

        assert_matches!(viewer.require_writer(), Err(ServiceError::Forbidden(_)));
        assert!(staff.require_writer().is_ok());
        assert_matches!(staff.require_admin(), Err(ServiceError::Forbidden(_)));
        assert!(admin.require_admin().is_ok());
        assert_eq!(Role::Viewer.to_string(), "viewer");
    }
}
