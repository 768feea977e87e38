use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use uuid::Uuid;

pub const NONCE_ACTION: &str = "wcs_staging_control";
pub const NONCE_FIELD: &str = "wcs_staging_nonce";

const MAX_OUTSTANDING_NONCES: usize = 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum NonceError {
    Missing,
    Unknown,
    Expired,
    WrongAction,
}

impl std::fmt::Display for NonceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NonceError::Missing => write!(f, "form token missing"),
            NonceError::Unknown => write!(f, "form token unknown or already used"),
            NonceError::Expired => write!(f, "form token expired"),
            NonceError::WrongAction => write!(f, "form token issued for another action"),
        }
    }
}

impl std::error::Error for NonceError {}

struct IssuedNonce {
    action: String,
    issued_at: Instant,
    sequence: u64,
}

/// Anti-forgery tokens handed out with each admin page render. A token is
/// bound to one action, lives for `ttl` and is consumed by its first use.
pub struct NonceRegistry {
    ttl: Duration,
    issued: Mutex<HashMap<String, IssuedNonce>>,
    sequence: AtomicU64,
}

impl NonceRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            issued: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(0),
        }
    }

    pub fn issue(&self, action: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        let mut issued = self.lock();
        let ttl = self.ttl;
        issued.retain(|_, nonce| nonce.issued_at.elapsed() < ttl);
        while issued.len() >= MAX_OUTSTANDING_NONCES {
            let Some(oldest) = issued
                .iter()
                .min_by_key(|(_, nonce)| nonce.sequence)
                .map(|(token, _)| token.clone())
            else {
                break;
            };
            issued.remove(&oldest);
        }
        issued.insert(
            token.clone(),
            IssuedNonce {
                action: action.to_string(),
                issued_at: Instant::now(),
                sequence: self.sequence.fetch_add(1, Ordering::Relaxed),
            },
        );
        token
    }

    pub fn verify(&self, action: &str, token: Option<&str>) -> Result<(), NonceError> {
        let token = token
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(NonceError::Missing)?;
        let nonce = self.lock().remove(token).ok_or(NonceError::Unknown)?;
        if nonce.issued_at.elapsed() >= self.ttl {
            return Err(NonceError::Expired);
        }
        if nonce.action != action {
            return Err(NonceError::WrongAction);
        }
        Ok(())
    }

    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, IssuedNonce>> {
        self.issued
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_single_use() {
        let registry = NonceRegistry::new(Duration::from_secs(60));
        let token = registry.issue(NONCE_ACTION);
        assert_eq!(registry.verify(NONCE_ACTION, Some(&token)), Ok(()));
        assert_eq!(
            registry.verify(NONCE_ACTION, Some(&token)),
            Err(NonceError::Unknown)
        );
    }

    #[test]
    fn token_is_scoped_to_its_action() {
        let registry = NonceRegistry::new(Duration::from_secs(60));
        let token = registry.issue("other_action");
        assert_eq!(
            registry.verify(NONCE_ACTION, Some(&token)),
            Err(NonceError::WrongAction)
        );
    }

    #[test]
    fn missing_and_expired_tokens_are_rejected() {
        let registry = NonceRegistry::new(Duration::ZERO);
        assert_eq!(registry.verify(NONCE_ACTION, None), Err(NonceError::Missing));
        assert_eq!(
            registry.verify(NONCE_ACTION, Some("  ")),
            Err(NonceError::Missing)
        );
        let token = registry.issue(NONCE_ACTION);
        assert_eq!(
            registry.verify(NONCE_ACTION, Some(&token)),
            Err(NonceError::Expired)
        );
    }

    #[test]
    fn outstanding_tokens_are_capped() {
        let registry = NonceRegistry::new(Duration::from_secs(60));
        let first = registry.issue(NONCE_ACTION);
        for _ in 0..MAX_OUTSTANDING_NONCES {
            registry.issue(NONCE_ACTION);
        }
        assert_eq!(registry.outstanding(), MAX_OUTSTANDING_NONCES);
        assert_eq!(
            registry.verify(NONCE_ACTION, Some(&first)),
            Err(NonceError::Unknown)
        );
    }
}
