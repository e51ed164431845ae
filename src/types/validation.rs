//! Memoized acceptance checks for composite type signatures.
//!
//! Acceptance queries recur on hot paths, typically once per frame per
//! resource slot. A cold check walks the signature tree and costs O(tree
//! size); every later check of the same signature is a single memo lookup.

use crate::types::{Signature, SignatureKind, TypeToken};
use dashmap::{DashMap, DashSet};
use log::trace;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Accepted base-type set plus an append-only memo table from signature
/// to acceptability.
///
/// Results are memoized per signature handle and never overwritten.
/// Registering a base type after a negative result has been cached does
/// not fix that cached result; a freshly constructed signature validates
/// against the current accepted set. Register base types before issuing
/// queries that reference them.
#[derive(Debug, Default)]
pub struct CachedTypeRegistry {
    accepted: DashSet<TypeToken>,
    memo: DashMap<u64, bool>,
    cold_validations: AtomicUsize,
}

impl CachedTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a token to the accepted leaf set. No-op when already present.
    pub fn register_base_type(&self, token: TypeToken) {
        if self.accepted.insert(token) {
            trace!("[Type Validation] Accepted base type {token}");
        }
    }

    /// Registers a concrete Rust type as a base type and returns its token.
    pub fn register_base<T: ?Sized + 'static>(&self) -> TypeToken {
        let token = TypeToken::of::<T>();
        self.register_base_type(token);
        token
    }

    /// Whether a signature is legal to cache.
    ///
    /// A leaf is acceptable iff its token is in the accepted set; a
    /// combinator is acceptable iff all of its children are. An unknown
    /// leaf yields `false`, never an error. Callers that need a hard
    /// failure must translate `false` themselves.
    pub fn is_acceptable(&self, signature: &Signature) -> bool {
        if let Some(cached) = self.memo.get(&signature.instance_id()) {
            return *cached;
        }

        self.cold_validations.fetch_add(1, Ordering::Relaxed);
        let accepted = match signature.kind() {
            SignatureKind::Leaf(token) => self.accepted.contains(token),
            SignatureKind::Reference(inner)
            | SignatureKind::Pointer(inner)
            | SignatureKind::Optional(inner)
            | SignatureKind::Vector(inner) => self.is_acceptable(inner),
            SignatureKind::Pair(first, second) => {
                self.is_acceptable(first) && self.is_acceptable(second)
            }
            SignatureKind::Tuple(children) => {
                children.iter().all(|child| self.is_acceptable(child))
            }
        };

        if !accepted {
            trace!("[Type Validation] Rejected {signature}");
        }

        *self.memo.entry(signature.instance_id()).or_insert(accepted)
    }

    /// Number of accepted base types.
    pub fn accepted_types(&self) -> usize {
        self.accepted.len()
    }

    /// Number of memoized signature nodes.
    pub fn memoized(&self) -> usize {
        self.memo.len()
    }

    /// How many signature nodes have been validated without a memo hit.
    /// A repeated query on the same signature leaves this untouched.
    pub fn cold_validations(&self) -> usize {
        self.cold_validations.load(Ordering::Relaxed)
    }
}
