//! Field-level validation for profile and security forms.
//!
//! Failures are reported per field and never leave the form boundary.

use serde::{Deserialize, Serialize};

/// Minimum accepted length for a new password.
pub const MIN_PASSWORD_LEN: usize = 8;

/// A single field failing a rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: &'static str,
}

impl FieldError {
    fn new(field: &'static str, message: &'static str) -> Self {
        Self { field, message }
    }
}

/// Collected field errors for one form submission.
pub type FieldErrors = Vec<FieldError>;

/// Validate a US phone number entered without country code.
///
/// Every failing rule is reported, in the order the form displays them.
///
/// # Errors
///
/// Returns the list of failing rules for the `phone_number` field.
pub fn validate_phone_number(phone_number: &str) -> Result<(), FieldErrors> {
    const FIELD: &str = "phone_number";

    if phone_number.is_empty() {
        return Err(vec![FieldError::new(FIELD, "Phone number is required.")]);
    }

    let mut errors = Vec::new();
    if phone_number.chars().any(char::is_whitespace) {
        errors.push(FieldError::new(FIELD, "Phone number must not contain spaces."));
    }
    if phone_number.starts_with("+1") {
        errors.push(FieldError::new(FIELD, "Phone number should not start with '+1'."));
    }
    if phone_number.chars().count() != 10 {
        errors.push(FieldError::new(FIELD, "Phone number must be exactly 10 digits."));
    }
    if !is_nanp_number(phone_number) {
        errors.push(FieldError::new(
            FIELD,
            "Invalid US phone number format (Area code and exchange code can't start with 1).",
        ));
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Ten ASCII digits where the area code and exchange start with 2-9.
fn is_nanp_number(value: &str) -> bool {
    let bytes = value.as_bytes();
    bytes.len() == 10
        && bytes.iter().all(u8::is_ascii_digit)
        && bytes[0] >= b'2'
        && bytes[3] >= b'2'
}

/// Name change form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NameChange {
    pub first_name: String,
    pub last_name: String,
}

impl NameChange {
    /// # Errors
    ///
    /// Returns an entry for each name that is blank after trimming.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = Vec::new();
        if self.first_name.trim().is_empty() {
            errors.push(FieldError::new("first_name", "First name is required."));
        }
        if self.last_name.trim().is_empty() {
            errors.push(FieldError::new("last_name", "Last name is required."));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Password change form.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PasswordChange {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    /// # Errors
    ///
    /// Returns an entry for each failing field.
    pub fn validate(&self) -> Result<(), FieldErrors> {
        let mut errors = Vec::new();
        if self.current_password.is_empty() {
            errors.push(FieldError::new(
                "current_password",
                "Current password is required.",
            ));
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(FieldError::new(
                "new_password",
                "Password must be at least 8 characters.",
            ));
        }
        if self.confirm_password != self.new_password {
            errors.push(FieldError::new("confirm_password", "Passwords do not match."));
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
