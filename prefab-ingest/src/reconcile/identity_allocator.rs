// Reconcile stage 3: Identity Allocator
//
// Concept: Project-unique human-readable component identifiers
// Synchronization: Accepts base label + optional row key + collision set,
// outputs a free identifier and records it in the set
//
// Algorithm:
// 1. Candidate = "<base>-<rowKey>", or "<base>" without per-row context
// 2. Candidate is free unless it, or a suffixed member of its family
//    ("<candidate>-A", "<candidate>-AB", ...), is already taken
// 3. Otherwise try "<candidate>-A", "-B", ... "-Z", "-AA", ... in order
// 4. Bounded: after max_attempts suffixes apply the exhaustion policy

use std::collections::HashSet;
use tracing::warn;

use prefab_common::config::{AllocatorConfig, ExhaustionPolicy};
use prefab_common::time::millis_fragment;

use super::error::{ReconcileError, ReconcileResult};

/// Bijective base-26 suffix: 1 → A, 26 → Z, 27 → AA, 28 → AB, ...
pub fn suffix_for(mut n: usize) -> String {
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push(b'A' + (n % 26) as u8);
        n /= 26;
    }
    letters.reverse();
    String::from_utf8(letters).unwrap_or_default()
}

/// Candidate identifier before collision resolution
pub fn candidate(base_label: &str, row_key: Option<&str>) -> String {
    match row_key.map(str::trim).filter(|k| !k.is_empty()) {
        Some(key) => format!("{}-{}", base_label.trim(), key),
        None => base_label.trim().to_string(),
    }
}

fn is_family_suffix(rest: &str) -> bool {
    !rest.is_empty() && rest.chars().all(|c| c.is_ascii_uppercase())
}

/// Identifier allocator
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    max_attempts: usize,
    on_exhausted: ExhaustionPolicy,
}

impl Default for IdentityAllocator {
    fn default() -> Self {
        Self::from_config(&AllocatorConfig::default())
    }
}

impl IdentityAllocator {
    pub fn from_config(config: &AllocatorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            on_exhausted: config.on_exhausted,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_exhaustion_policy(mut self, policy: ExhaustionPolicy) -> Self {
        self.on_exhausted = policy;
        self
    }

    /// Allocate a free identifier and record it in `existing`
    ///
    /// Later allocations against the same set see this one, so a batch never
    /// hands out the same identifier twice.
    pub fn allocate(
        &self,
        base_label: &str,
        row_key: Option<&str>,
        existing: &mut HashSet<String>,
    ) -> ReconcileResult<String> {
        let id = self.suggest(base_label, row_key, existing)?;
        existing.insert(id.clone());
        Ok(id)
    }

    /// The identifier `allocate` would return, without recording it
    pub fn suggest(
        &self,
        base_label: &str,
        row_key: Option<&str>,
        existing: &HashSet<String>,
    ) -> ReconcileResult<String> {
        let candidate = candidate(base_label, row_key);
        if candidate.is_empty() {
            return Err(ReconcileError::Validation(
                "Component identifier cannot be empty".to_string(),
            ));
        }

        if !Self::family_taken(&candidate, existing) {
            return Ok(candidate);
        }

        for n in 1..=self.max_attempts {
            let suffixed = format!("{}-{}", candidate, suffix_for(n));
            if !existing.contains(&suffixed) {
                return Ok(suffixed);
            }
        }

        match self.on_exhausted {
            ExhaustionPolicy::Error => {
                warn!(
                    candidate = %candidate,
                    attempts = self.max_attempts,
                    "Identifier allocation exhausted"
                );
                Err(ReconcileError::AllocationExhausted {
                    candidate,
                    attempts: self.max_attempts,
                })
            }
            ExhaustionPolicy::Timestamp => {
                let stamped = format!("{}-{}", candidate, millis_fragment());
                let mut id = stamped.clone();
                let mut counter = 1;
                while existing.contains(&id) {
                    id = format!("{}-{}", stamped, counter);
                    counter += 1;
                }
                warn!(
                    candidate = %candidate,
                    assigned = %id,
                    "Identifier allocation fell back to time-derived suffix"
                );
                Ok(id)
            }
        }
    }

    fn family_taken(candidate: &str, existing: &HashSet<String>) -> bool {
        existing.contains(candidate)
            || existing.iter().any(|id| {
                id.strip_prefix(candidate)
                    .and_then(|rest| rest.strip_prefix('-'))
                    .is_some_and(is_family_suffix)
            })
    }
}
