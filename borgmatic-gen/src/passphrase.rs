//! Repository passphrases.
//!
//! A passphrase only ever leaves the process in two places: the generated
//! job configuration and the one-time console banner.

use crate::utils::{GenError, Result};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fmt;

/// Length of generated passphrases
pub const PASSPHRASE_LENGTH: usize = 64;

const BANNER_RULE: &str =
    "#########################################################################";

#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase(String);

impl Passphrase {
    /// Generate a new random passphrase over `[0-9a-zA-Z]`
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let secret: String = rng
            .sample_iter(&Alphanumeric)
            .take(PASSPHRASE_LENGTH)
            .map(char::from)
            .collect();
        Self(secret)
    }

    /// Wrap an operator-supplied passphrase.
    ///
    /// It ends up inside a double-quoted YAML scalar, so quotes, backslashes
    /// and line breaks are refused.
    pub fn from_operator(secret: &str) -> Result<Self> {
        if secret.is_empty() {
            return Err(GenError::validation("passphrase must not be empty"));
        }
        if secret.chars().any(|c| matches!(c, '"' | '\\') || c.is_control()) {
            return Err(GenError::validation(
                "passphrase must not contain quotes, backslashes or control characters",
            ));
        }
        Ok(Self(secret.to_string()))
    }

    /// Use `supplied` if present, otherwise generate one.
    pub fn resolve(supplied: Option<&str>) -> Result<Self> {
        match supplied {
            Some(secret) => Self::from_operator(secret),
            None => Ok(Self::generate()),
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Framed block shown once so the operator can store the secret off-band.
    pub fn banner(&self, job_name: &str) -> String {
        format!(
            "{BANNER_RULE}\n                       Passphrase for {job_name}:\n    {}\n{BANNER_RULE}",
            self.0
        )
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_generated_length_and_alphabet() {
        for _ in 0..50 {
            let passphrase = Passphrase::generate();
            assert_eq!(passphrase.expose().len(), PASSPHRASE_LENGTH);
            assert!(passphrase.expose().chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let a = Passphrase::generate_with(&mut StdRng::seed_from_u64(7));
        let b = Passphrase::generate_with(&mut StdRng::seed_from_u64(7));
        let c = Passphrase::generate_with(&mut StdRng::seed_from_u64(8));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_generation_covers_alphabet_classes() {
        let mut rng = StdRng::seed_from_u64(42);
        let sample: String = (0..20)
            .map(|_| Passphrase::generate_with(&mut rng).expose().to_string())
            .collect();
        assert!(sample.chars().any(|c| c.is_ascii_digit()));
        assert!(sample.chars().any(|c| c.is_ascii_lowercase()));
        assert!(sample.chars().any(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_operator_passphrase_validation() {
        assert!(Passphrase::from_operator("correct horse battery").is_ok());
        assert!(Passphrase::from_operator("").is_err());
        assert!(Passphrase::from_operator("bad\"quote").is_err());
        assert!(Passphrase::from_operator("two\nlines").is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let passphrase = Passphrase::from_operator("hunter2").unwrap();
        let debug = format!("{passphrase:?}");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_banner_contains_secret_once() {
        let passphrase = Passphrase::from_operator("s3cr3t").unwrap();
        let banner = passphrase.banner("app-demo");
        assert_eq!(banner.matches("s3cr3t").count(), 1);
        assert!(banner.contains("app-demo"));
        assert!(banner.starts_with('#'));
    }
}
