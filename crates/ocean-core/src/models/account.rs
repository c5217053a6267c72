//! Account and authentication models.
//!
//! Field names follow the API's camelCase JSON.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Minimum password length accepted at sign-up.
pub const PASSWORD_MIN_LENGTH: usize = 6;

/// Maximum password length accepted at sign-up.
pub const PASSWORD_MAX_LENGTH: usize = 20;

/// Email and password for a sign-in request. Never persisted.
#[derive(Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

// Keep the password out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Access and refresh token issued by sign-in and rotated by refresh.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest<'a> {
    pub refresh_token: &'a str,
}

/// Sign-up form payload.
#[derive(Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct RegisterAccountRequest {
    pub email: String,
    pub password: String,
    pub firstname: String,
    pub lastname: String,
    pub company: String,
    /// The API requires the field; sign-up always sends it empty.
    pub username: String,
}

impl RegisterAccountRequest {
    /// Check the form rules enforced before the request is sent.
    ///
    /// Returns the first violated rule as a user-facing message.
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("Email is required.".to_string());
        }
        if !is_valid_email(&self.email) {
            return Err("Invalid email address".to_string());
        }
        let password_len = self.password.chars().count();
        if password_len == 0 {
            return Err("Password is required.".to_string());
        }
        if password_len < PASSWORD_MIN_LENGTH {
            return Err(format!("Must be {} or more characters", PASSWORD_MIN_LENGTH));
        }
        if password_len > PASSWORD_MAX_LENGTH {
            return Err(format!("Must be {} characters or less", PASSWORD_MAX_LENGTH));
        }
        if self.firstname.trim().is_empty() {
            return Err("Firstname is required.".to_string());
        }
        if self.lastname.trim().is_empty() {
            return Err("Lastname is required.".to_string());
        }
        if self.company.trim().is_empty() {
            return Err("Company is required.".to_string());
        }
        Ok(())
    }

    /// Credentials for the sign-in that follows a successful registration.
    pub fn credentials(&self) -> Credentials {
        Credentials::new(self.email.clone(), self.password.clone())
    }
}

impl fmt::Debug for RegisterAccountRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisterAccountRequest")
            .field("email", &self.email)
            .field("firstname", &self.firstname)
            .field("lastname", &self.lastname)
            .field("company", &self.company)
            .finish_non_exhaustive()
    }
}

/// A registered account as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct Account {
    pub id: Option<String>,
    pub email: String,
    pub firstname: Option<String>,
    pub lastname: Option<String>,
    pub company: Option<String>,
    pub username: Option<String>,
}

impl Account {
    pub fn display_name(&self) -> String {
        match (&self.firstname, &self.lastname) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            (None, Some(last)) => last.clone(),
            (None, None) => self.email.clone(),
        }
    }
}

/// Loose shape check: one `@` with a non-empty local part and a dotted domain.
fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .map(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
            .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> RegisterAccountRequest {
        RegisterAccountRequest {
            email: "jane@example.com".to_string(),
            password: "secret1".to_string(),
            firstname: "Jane".to_string(),
            lastname: "Doe".to_string(),
            company: "Acme".to_string(),
            username: String::new(),
        }
    }

    #[test]
    fn test_token_pair_uses_camel_case() {
        let pair: TokenPair =
            serde_json::from_str(r#"{"accessToken":"a","refreshToken":"r"}"#).unwrap();
        assert_eq!(pair, TokenPair::new("a", "r"));

        let json = serde_json::to_string(&RefreshTokenRequest { refresh_token: "r" }).unwrap();
        assert_eq!(json, r#"{"refreshToken":"r"}"#);
    }

    #[test]
    fn test_debug_output_hides_secrets() {
        let creds = Credentials::new("e", "hunter2");
        assert!(!format!("{:?}", creds).contains("hunter2"));

        let pair = TokenPair::new("access-secret", "refresh-secret");
        let debug = format!("{:?}", pair);
        assert!(!debug.contains("access-secret"));
        assert!(!debug.contains("refresh-secret"));
    }

    #[test]
    fn test_register_validation_accepts_valid_form() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn test_register_validation_rules() {
        let mut req = valid_request();
        req.email = "not-an-email".to_string();
        assert_eq!(req.validate().unwrap_err(), "Invalid email address");

        let mut req = valid_request();
        req.password = "12345".to_string();
        assert_eq!(req.validate().unwrap_err(), "Must be 6 or more characters");

        let mut req = valid_request();
        req.password = "x".repeat(21);
        assert_eq!(req.validate().unwrap_err(), "Must be 20 characters or less");

        let mut req = valid_request();
        req.company = "  ".to_string();
        assert_eq!(req.validate().unwrap_err(), "Company is required.");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("a@b.co"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@@b.co"));
        assert!(!is_valid_email("a b@c.de"));
    }

    #[test]
    fn test_account_display_name() {
        let account: Account = serde_json::from_str(
            r#"{"id":"1","email":"jane@example.com","firstname":"Jane","lastname":"Doe"}"#,
        )
        .unwrap();
        assert_eq!(account.display_name(), "Jane Doe");

        let bare: Account = serde_json::from_str(r#"{"email":"x@y.z"}"#).unwrap();
        assert_eq!(bare.display_name(), "x@y.z");
    }
}
