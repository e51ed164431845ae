//! Structural descriptions of cacheable types.
//!
//! A handful of base types are registered as [`TypeToken`]s, and every
//! composition of them (references, pointers, optionals, vectors, pairs,
//! tuples) is expressed as a [`Signature`] tree instead of being
//! registered individually. The [`CachedTypeRegistry`] decides once per
//! signature whether such a composition is legal to cache.

mod validation;

pub use validation::CachedTypeRegistry;

use itertools::Itertools;
use smallvec::SmallVec;
use std::any::{TypeId, type_name};
use std::fmt::{self, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::mem;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-stable token for a registered base type.
///
/// Two tokens are equal exactly when they were obtained for the same Rust
/// type. The captured type name is only used for diagnostics.
#[derive(Copy, Clone, Debug)]
pub struct TypeToken {
    id: TypeId,
    name: &'static str,
}

impl TypeToken {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    /// The type name with its leading module path trimmed off.
    pub fn name(&self) -> &'static str {
        let head = self.name.find('<').unwrap_or(self.name.len());
        let start = self.name[..head].rfind("::").map(|i| i + 2).unwrap_or(0);
        &self.name[start..]
    }
}

impl PartialEq for TypeToken {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeToken {}

impl Hash for TypeToken {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Display for TypeToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(1);

/// An immutable tree describing a possibly composite type.
///
/// Signatures are cheap to clone and share their nodes. Equality and
/// hashing are structural: two signatures with the same combinator tags
/// and equal children are the same signature, no matter how or when they
/// were built. Every constructed signature additionally carries a unique
/// instance id, which the validation cache uses as its memo key.
#[derive(Clone, Debug)]
pub struct Signature(Arc<SignatureNode>);

#[derive(Debug)]
struct SignatureNode {
    instance: u64,
    kind: SignatureKind,
}

#[derive(Debug)]
pub(crate) enum SignatureKind {
    Leaf(TypeToken),
    Reference(Signature),
    Pointer(Signature),
    Optional(Signature),
    Vector(Signature),
    Pair(Signature, Signature),
    Tuple(SmallVec<[Signature; 4]>),
}

impl Signature {
    fn node(kind: SignatureKind) -> Self {
        Self(Arc::new(SignatureNode {
            instance: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
            kind,
        }))
    }

    pub fn leaf(token: TypeToken) -> Self {
        Self::node(SignatureKind::Leaf(token))
    }

    /// Leaf signature for a concrete Rust type.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self::leaf(TypeToken::of::<T>())
    }

    pub fn reference(inner: Signature) -> Self {
        Self::node(SignatureKind::Reference(inner))
    }

    pub fn pointer(inner: Signature) -> Self {
        Self::node(SignatureKind::Pointer(inner))
    }

    pub fn optional(inner: Signature) -> Self {
        Self::node(SignatureKind::Optional(inner))
    }

    pub fn vector(inner: Signature) -> Self {
        Self::node(SignatureKind::Vector(inner))
    }

    pub fn pair(first: Signature, second: Signature) -> Self {
        Self::node(SignatureKind::Pair(first, second))
    }

    pub fn tuple(children: impl IntoIterator<Item = Signature>) -> Self {
        Self::node(SignatureKind::Tuple(children.into_iter().collect()))
    }

    pub(crate) fn instance_id(&self) -> u64 {
        self.0.instance
    }

    pub(crate) fn kind(&self) -> &SignatureKind {
        &self.0.kind
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        match (&self.0.kind, &other.0.kind) {
            (SignatureKind::Leaf(a), SignatureKind::Leaf(b)) => a == b,
            (SignatureKind::Reference(a), SignatureKind::Reference(b))
            | (SignatureKind::Pointer(a), SignatureKind::Pointer(b))
            | (SignatureKind::Optional(a), SignatureKind::Optional(b))
            | (SignatureKind::Vector(a), SignatureKind::Vector(b)) => a == b,
            (SignatureKind::Pair(a1, a2), SignatureKind::Pair(b1, b2)) => a1 == b1 && a2 == b2,
            (SignatureKind::Tuple(a), SignatureKind::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Signature {}

impl Hash for Signature {
    fn hash<H: Hasher>(&self, state: &mut H) {
        mem::discriminant(&self.0.kind).hash(state);
        match &self.0.kind {
            SignatureKind::Leaf(token) => token.hash(state),
            SignatureKind::Reference(inner)
            | SignatureKind::Pointer(inner)
            | SignatureKind::Optional(inner)
            | SignatureKind::Vector(inner) => inner.hash(state),
            SignatureKind::Pair(first, second) => {
                first.hash(state);
                second.hash(state);
            }
            SignatureKind::Tuple(children) => {
                children.len().hash(state);
                for child in children {
                    child.hash(state);
                }
            }
        }
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0.kind {
            SignatureKind::Leaf(token) => write!(f, "{token}"),
            SignatureKind::Reference(inner) => write!(f, "&{inner}"),
            SignatureKind::Pointer(inner) => write!(f, "*{inner}"),
            SignatureKind::Optional(inner) => write!(f, "Option<{inner}>"),
            SignatureKind::Vector(inner) => write!(f, "Vec<{inner}>"),
            SignatureKind::Pair(first, second) => write!(f, "({first}, {second})"),
            SignatureKind::Tuple(children) => {
                write!(f, "({})", children.iter().join(", "))
            }
        }
    }
}
