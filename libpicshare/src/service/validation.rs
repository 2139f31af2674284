//! Client-side input checks, run before any backend call

use secrecy::{ExposeSecret, SecretString};

use crate::error::{PicshareError, Result};

/// Minimum password length accepted by the backend
pub const MIN_PASSWORD_LENGTH: usize = 6;

fn invalid(message: &str) -> PicshareError {
    PicshareError::Validation(message.to_string())
}

pub fn validate_sign_up(username: &str, email: &str, password: &SecretString) -> Result<()> {
    if username.trim().is_empty() || email.trim().is_empty() || password.expose_secret().is_empty()
    {
        return Err(invalid("Please fill in all fields"));
    }
    validate_username(username)?;
    validate_email(email)?;
    validate_password(password)
}

pub fn validate_login(email: &str, password: &SecretString) -> Result<()> {
    if email.trim().is_empty() || password.expose_secret().is_empty() {
        return Err(invalid("Please fill in all fields"));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<()> {
    if username.is_empty() {
        return Err(invalid("Username cannot be empty"));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(invalid("Username must not contain spaces"));
    }
    Ok(())
}

/// Shape check only: `local@domain.tld`, no whitespace
pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(invalid("Invalid email address"))
    }
}

pub fn validate_password(password: &SecretString) -> Result<()> {
    if password.expose_secret().chars().count() < MIN_PASSWORD_LENGTH {
        return Err(PicshareError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn message(result: Result<()>) -> String {
        result.unwrap_err().to_string()
    }

    #[test]
    fn test_sign_up_requires_all_fields() {
        assert_eq!(
            message(validate_sign_up("", "a@b.co", &secret("secret1"))),
            "Please fill in all fields"
        );
        assert_eq!(
            message(validate_sign_up("ada", "  ", &secret("secret1"))),
            "Please fill in all fields"
        );
        assert_eq!(
            message(validate_sign_up("ada", "a@b.co", &secret(""))),
            "Please fill in all fields"
        );
    }

    #[test]
    fn test_sign_up_checks_each_field() {
        assert!(validate_sign_up("ada", "ada@example.com", &secret("secret1")).is_ok());
        assert_eq!(
            message(validate_sign_up("ada l", "ada@example.com", &secret("secret1"))),
            "Username must not contain spaces"
        );
        assert_eq!(
            message(validate_sign_up("ada", "ada.example.com", &secret("secret1"))),
            "Invalid email address"
        );
        assert_eq!(
            message(validate_sign_up("ada", "ada@example.com", &secret("12345"))),
            "Password must be at least 6 characters"
        );
    }

    #[test]
    fn test_email_shapes() {
        assert!(validate_email("a@b.co").is_ok());
        assert!(validate_email(" a@b.co ").is_ok());
        assert!(validate_email("@b.co").is_err());
        assert!(validate_email("a@b").is_err());
        assert!(validate_email("a@.co").is_err());
        assert!(validate_email("a@b.").is_err());
        assert!(validate_email("a@@b.co").is_err());
        assert!(validate_email("a b@c.co").is_err());
    }

    #[test]
    fn test_login_requires_fields() {
        assert!(validate_login("a@b.co", &secret("x")).is_ok());
        assert!(validate_login("", &secret("x")).is_err());
        assert!(validate_login("a@b.co", &secret("")).is_err());
    }
}
