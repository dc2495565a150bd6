//! Exchange models and their required-field validation.
//!
//! Every model arriving from an upstream service, the message bus, or an
//! inbound request is validated before it may mutate state.

use crate::types::Role;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

/// Validation error types.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("Validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    /// Payload does not have the expected shape.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// Lead credential as exported by the CRM or Reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeadAuthExchange {
    /// Upstream user id.
    #[serde(default)]
    pub id: i32,

    /// Login email.
    #[validate(length(min = 1))]
    pub email: String,

    /// Opaque role.
    #[serde(default)]
    pub role: Role,

    /// Stored hash in `iterations:salt:hash` form.
    #[validate(length(min = 1))]
    pub hash_password: String,
}

/// Lead add/change/ban message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeadFullExchange {
    /// Upstream user id.
    #[serde(default)]
    pub id: i32,

    /// Login email.
    #[validate(length(min = 1))]
    pub email: String,

    /// Stored password hash carried by the message.
    #[validate(length(min = 1))]
    pub password: String,

    /// Opaque role.
    #[serde(default)]
    pub role: Role,

    /// Whether the lead has been banned.
    #[validate(required)]
    pub is_banned: Option<bool>,
}

/// Lead role change message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeadShortExchange {
    /// Upstream user id.
    #[serde(default)]
    pub id: i32,

    /// Login email.
    #[validate(length(min = 1))]
    pub email: String,

    /// New role.
    #[validate(custom(function = "validate_role"))]
    pub role: Role,
}

/// A configuration key/value as served by the configuration authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    /// Key.
    #[validate(length(min = 1))]
    pub key: String,

    /// Value.
    #[validate(length(min = 1))]
    pub value: String,
}

/// A configuration-change message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ConfigChange {
    /// Key.
    #[validate(length(min = 1))]
    pub key: String,

    /// Value.
    #[validate(length(min = 1))]
    pub value: String,

    /// Target service, when the bus carries it.
    #[serde(default)]
    pub service: Option<String>,
}

/// Login request body.
#[derive(Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Login email.
    #[validate(length(min = 1))]
    #[serde(default)]
    pub email: String,

    /// Plain-text password.
    #[validate(length(min = 1))]
    #[serde(default)]
    pub password: String,
}

impl std::fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

fn validate_role(role: &Role) -> Result<(), validator::ValidationError> {
    if role.is_absent() {
        return Err(validator::ValidationError::new("length"));
    }
    Ok(())
}

/// Validate every item; the first failure fails the batch.
///
/// # Errors
///
/// Returns `ValidationError::Invalid` for the first invalid item.
pub fn validate_all<T: Validate>(items: &[T]) -> Result<(), ValidationError> {
    for item in items {
        item.validate()?;
    }
    Ok(())
}

/// Decode a JSON array and validate every element.
///
/// # Errors
///
/// Returns `ValidationError::JsonError` if the payload is not an array of `T`,
/// or `ValidationError::Invalid` if any element fails validation.
pub fn parse_validated_list<T>(payload: serde_json::Value) -> Result<Vec<T>, ValidationError>
where
    T: DeserializeOwned + Validate,
{
    let items: Vec<T> = serde_json::from_value(payload)?;
    validate_all(&items)?;
    Ok(items)
}
