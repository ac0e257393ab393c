//! Argon2 password hashing.

use argon2::{
    Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version,
    password_hash::SaltString,
};
use rand::rngs::OsRng;

use crate::{EngineError, ResultEngine};

/// Cost parameters used when hashing new passwords.
///
/// Verification always uses the parameters embedded in the stored hash, so
/// changing the policy does not invalidate existing passwords.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PasswordPolicy {
    pub memory_kb: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            memory_kb: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

impl PasswordPolicy {
    /// Cheapest parameters argon2 accepts; meant for tests only.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kb: Params::MIN_M_COST,
            iterations: Params::MIN_T_COST,
            parallelism: Params::MIN_P_COST,
        }
    }

    fn argon2(&self) -> ResultEngine<Argon2<'static>> {
        let params = Params::new(self.memory_kb, self.iterations, self.parallelism, None)
            .map_err(|err| EngineError::Internal(format!("invalid argon2 params: {err}")))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

pub fn hash_password(policy: &PasswordPolicy, password: &str) -> ResultEngine<String> {
    if password.is_empty() {
        return Err(EngineError::BadRequest(
            "password must not be empty".to_string(),
        ));
    }
    let salt = SaltString::generate(&mut OsRng);
    let hash = policy
        .argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| EngineError::Internal(format!("failed to hash password: {err}")))?;
    Ok(hash.to_string())
}

/// Returns `false` for a wrong password and for a malformed stored hash.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let policy = PasswordPolicy::insecure_fast();
        let hash = hash_password(&policy, "correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("battery staple", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        assert!(!verify_password("anything", "plaintext"));
        assert!(hash_password(&PasswordPolicy::insecure_fast(), "").is_err());
    }
}
