//! Time-sortable identifier generation.
//!
//! Identifiers are 26-character Crockford base32 ULIDs. A single monotonic
//! generator is shared per [`AppState`](crate::app::AppState) so that two ids
//! created in the same millisecond still sort in creation order.

use parking_lot::Mutex;
use ulid::Generator;

use crate::error::{CoreError, CoreResult};

/// Length of every generated identifier.
pub const ID_LEN: usize = 26;

#[derive(Default)]
pub struct IdGenerator {
    inner: Mutex<Generator>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Next identifier. Fails only when the random component overflows within
    /// a single millisecond.
    pub fn next_id(&self) -> CoreResult<String> {
        let ulid = self
            .inner
            .lock()
            .generate()
            .map_err(|e| CoreError::Validation(format!("identifier generation failed: {e}")))?;
        Ok(ulid.to_string())
    }
}

impl std::fmt::Debug for IdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_26_chars_and_sorted() {
        let ids = IdGenerator::new();
        let generated: Vec<String> = (0..100).map(|_| ids.next_id().unwrap()).collect();
        assert!(generated.iter().all(|id| id.len() == ID_LEN));

        let mut sorted = generated.clone();
        sorted.sort();
        assert_eq!(generated, sorted);
    }
}
