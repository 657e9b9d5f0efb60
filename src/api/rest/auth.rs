use std::str::FromStr;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use serde::{Deserialize, Serialize};

use crate::broadcast::Audience;
use crate::error::AppError;

/// Header carrying the role verified by the upstream auth layer.
pub const ROLE_HEADER: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Manager,
    Dispatcher,
    Operator,
    Driver,
    Customer,
}

impl Role {
    pub fn audience(self) -> Audience {
        match self {
            Role::Customer => Audience::Customer,
            _ => Audience::Operations,
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "manager" => Ok(Role::Manager),
            "dispatcher" => Ok(Role::Dispatcher),
            "operator" => Ok(Role::Operator),
            "driver" => Ok(Role::Driver),
            "customer" => Ok(Role::Customer),
            other => Err(AppError::Unauthorized(format!("unknown role: {other}"))),
        }
    }
}

/// The caller as annotated by the auth layer. Identity is trusted, not
/// re-verified here.
#[derive(Debug, Clone, Copy)]
pub struct Caller {
    pub role: Role,
}

impl Caller {
    pub fn require(&self, allowed: &[Role]) -> Result<(), AppError> {
        if allowed.contains(&self.role) {
            return Ok(());
        }

        let names: Vec<String> = allowed
            .iter()
            .map(|role| format!("{role:?}").to_lowercase())
            .collect();
        Err(AppError::Forbidden(format!(
            "requires one of the following roles: [{}]",
            names.join(", ")
        )))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(ROLE_HEADER)
            .ok_or_else(|| AppError::Unauthorized("missing user role".to_string()))?
            .to_str()
            .map_err(|_| AppError::Unauthorized("malformed user role".to_string()))?;

        Ok(Self {
            role: raw.parse()?,
        })
    }
}
