use thiserror::Error;

/// The typed failure handed to an interactive registration caller; maps
/// to the user-visible "Invalid account name or registration password."
/// message (spec §7).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid account name or registration password")]
    InvalidCredentials,
}
