//! # Stored record types
//!
//! The wire [`User`] message doubles as the stored record: the store holds
//! the exact value returned by `CreateUsers`, so `GetUser` round-trips it
//! without conversion.
//!
//! ## Identity keys
//!
//! A user's identity key is always `{first_name}_{last_name}`. The optional
//! `display_name` is carried as a plain attribute and never used for
//! identity, so two inputs with the same first and last name address the same
//! record regardless of their display names (last writer wins).

use crate::proto::{CreateUserInput, User};

/// Separator placed between first and last name in an identity key.
pub const KEY_SEPARATOR: char = '_';

/// Derives the identity key for a user from its first and last name.
pub fn user_key(first_name: &str, last_name: &str) -> String {
    format!("{first_name}{KEY_SEPARATOR}{last_name}")
}

impl From<CreateUserInput> for User {
    fn from(input: CreateUserInput) -> Self {
        Self {
            name: user_key(&input.first_name, &input.last_name),
            first_name: input.first_name,
            last_name: input.last_name,
            language: input.language,
            display_name: input.display_name,
        }
    }
}
