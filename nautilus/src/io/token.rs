//! Single-slot store for the one-use stream token.
//!
//! The browser's event-stream request cannot carry custom headers, so the
//! client fetches a token first and passes it as a query parameter.

use parking_lot::Mutex;
use rand::RngCore;
use tracing::debug;

use crate::error::AuthRejection;

const TOKEN_BYTES: usize = 32;

#[derive(Debug, Default)]
pub struct TokenStore {
    slot: Mutex<Option<String>>,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh token, replacing any unconsumed one.
    pub fn issue(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let replaced = self.slot.lock().replace(token.clone()).is_some();
        debug!(replaced, "issued stream token");
        token
    }

    /// Take the stored token and compare it to `candidate`.
    ///
    /// The slot is emptied whether or not the comparison succeeds.
    pub fn consume(&self, candidate: &str) -> Result<(), AuthRejection> {
        let stored = self.slot.lock().take();
        match stored {
            Some(token) if !token.is_empty() && token == candidate => Ok(()),
            Some(_) => {
                debug!("stream token mismatch");
                Err(AuthRejection::InvalidToken)
            }
            None => {
                debug!("no stream token outstanding");
                Err(AuthRejection::InvalidToken)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_single_use() {
        let store = TokenStore::new();
        let token = store.issue();
        assert_eq!(store.consume(&token), Ok(()));
        assert_eq!(store.consume(&token), Err(AuthRejection::InvalidToken));
    }

    #[test]
    fn issuing_replaces_the_previous_token() {
        let store = TokenStore::new();
        let first = store.issue();
        let second = store.issue();
        assert_ne!(first, second);
        assert_eq!(store.consume(&first), Err(AuthRejection::InvalidToken));
    }

    #[test]
    fn consuming_without_a_token_fails() {
        let store = TokenStore::new();
        assert_eq!(store.consume(""), Err(AuthRejection::InvalidToken));
    }

    #[test]
    fn wrong_guess_burns_the_token() {
        let store = TokenStore::new();
        let token = store.issue();
        assert_eq!(store.consume("guess"), Err(AuthRejection::InvalidToken));
        assert_eq!(store.consume(&token), Err(AuthRejection::InvalidToken));
    }

    #[test]
    fn tokens_are_hex_encoded_random_bytes() {
        let token = TokenStore::new().issue();
        assert_eq!(token.len(), TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
