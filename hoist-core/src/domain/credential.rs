//! Secret-bearing domain types
//!
//! Values wrapped in [`Secret`] never appear in `Debug` or `Display` output and
//! are not serializable, so they cannot leak into logs, run records or API
//! responses by accident.

use subtle::ConstantTimeEq;

/// An opaque secret value
#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the raw value
    ///
    /// Only call this at the point the value is handed to an external process.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Compares against a presented value in constant time
    pub fn matches(&self, presented: &str) -> bool {
        let expected = self.0.as_bytes();
        let presented = presented.as_bytes();

        if expected.len() != presented.len() {
            return false;
        }

        expected.ct_eq(presented).into()
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.matches(&other.0)
    }
}

impl Eq for Secret {}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for Secret {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Registry username/token pair
///
/// Held only for the duration of one authenticated publish session.
#[derive(Debug, Clone)]
pub struct RegistryCredential {
    pub username: Secret,
    pub token: Secret,
}

impl RegistryCredential {
    pub fn new(username: impl Into<Secret>, token: impl Into<Secret>) -> Self {
        Self {
            username: username.into(),
            token: token.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_is_redacted() {
        let secret = Secret::new("hunter2");
        assert_eq!(format!("{:?}", secret), "Secret(***)");
        assert_eq!(secret.to_string(), "***");
        assert_eq!(secret.expose(), "hunter2");
    }

    #[test]
    fn test_credential_debug_hides_both_fields() {
        let credential = RegistryCredential::new("dhaval", "dckr_pat_123");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("dhaval"));
        assert!(!debug.contains("dckr_pat_123"));
    }

    #[test]
    fn test_matches_exact_value_only() {
        let secret = Secret::new("hook-secret");
        assert!(secret.matches("hook-secret"));
        assert!(!secret.matches("hook-secreT"));
        assert!(!secret.matches("hook-secret-longer"));
        assert!(!secret.matches(""));
        assert_eq!(secret, Secret::new("hook-secret"));
        assert_ne!(secret, Secret::new("other"));
    }

    #[test]
    fn test_blank_secret_is_empty() {
        assert!(Secret::new("  ").is_empty());
        assert!(!Secret::new("x").is_empty());
    }
}
