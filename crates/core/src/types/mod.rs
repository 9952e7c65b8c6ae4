//! Core types for Wildflower.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod code;
pub mod email;
pub mod id;
pub mod identity;
pub mod money;
pub mod status;

pub use code::{CardCode, CardCodeError, CODE_ALPHABET, GROUP_LEN};
pub use email::{Email, EmailError};
pub use id::*;
pub use identity::IdentityId;
pub use money::{Money, MoneyError};
pub use status::*;
