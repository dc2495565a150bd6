//! # Marvelous Auth Core
//!
//! Core types, configuration, and exchange models for the Marvelous
//! authentication hub.
//!
//! This crate provides:
//! - Service, frontend, and audience identifiers of the constellation
//! - Configuration loading and validation (JSON5 format)
//! - Exchange models received from upstream services and the message bus,
//!   with their required-field validation

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod types;
pub mod validation;

pub use config::{Config, ConfigError, LiveConfig};
pub use types::{Audience, Frontend, Microservice, Role};
pub use validation::{
    ConfigChange, ConfigEntry, LeadAuthExchange, LeadFullExchange, LeadShortExchange,
    LoginRequest, ValidationError, parse_validated_list, validate_all,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{Config, LiveConfig};
    pub use crate::types::*;
    pub use crate::validation::ValidationError;
}
