//! User-facing messages
//!
//! Every string a person may see as the result of a failed action lives here
//! so the front ends stay consistent.

pub const TITLE_REQUIRED: &str = "Title is required";
pub const NOTHING_TO_UPDATE: &str = "No changes to save";
pub const TODO_NOT_FOUND: &str = "Todo not found";
pub const TODO_TO_UPDATE_NOT_FOUND: &str = "The todo to update was not found";
pub const TODO_TO_DELETE_NOT_FOUND: &str = "The todo to delete was not found";
pub const TODO_CHANGED_ELSEWHERE: &str =
    "This todo was changed somewhere else. Reload and try again";

pub const CREDENTIALS_REQUIRED: &str = "Email address and password are required";
pub const INVALID_EMAIL: &str = "Please enter a valid email address";
pub const PASSWORD_TOO_SHORT: &str = "Password must be at least 6 characters";
pub const PASSWORDS_DO_NOT_MATCH: &str = "Passwords do not match";
pub const INVALID_CREDENTIALS: &str = "Incorrect email address or password";
pub const SIGN_IN_REQUIRED: &str = "You need to sign in first";
pub const SESSION_EXPIRED: &str = "Your session has expired. Please sign in again";

pub const UNEXPECTED_ERROR: &str = "An unexpected error occurred";

/// Substring the identity service uses when email/password do not match
pub const BACKEND_INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;
