//! Scopes: named regions of the design hierarchy.
//!
//! Scopes form a tree rooted at the design root. A fully qualified path
//! is the dot-joined chain of names from the root.

use crate::ids::ScopeId;
use serde::{Deserialize, Serialize};
use veris_common::Ident;

/// The kind of a scope.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum ScopeKind {
    /// A module instance.
    Module,
    /// A named `begin`-`end` block.
    BeginEnd,
    /// A named `fork`-`join` block.
    ForkJoin,
}

/// A scope in the design hierarchy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scope {
    /// The scope kind.
    pub kind: ScopeKind,
    /// The local scope name.
    pub name: Ident,
    /// The parent scope; `None` for the root.
    pub parent: Option<ScopeId>,
}

impl Scope {
    /// Creates a root scope.
    pub fn root(name: Ident) -> Self {
        Self {
            kind: ScopeKind::Module,
            name,
            parent: None,
        }
    }

    /// Creates a child scope.
    pub fn child(parent: ScopeId, kind: ScopeKind, name: Ident) -> Self {
        Self {
            kind,
            name,
            parent: Some(parent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_has_no_parent() {
        let s = Scope::root(Ident::from_raw(0));
        assert!(s.parent.is_none());
        assert_eq!(s.kind, ScopeKind::Module);
    }

    #[test]
    fn child_links_to_parent() {
        let s = Scope::child(ScopeId::from_raw(0), ScopeKind::BeginEnd, Ident::from_raw(1));
        assert_eq!(s.parent, Some(ScopeId::from_raw(0)));
        assert_eq!(s.kind, ScopeKind::BeginEnd);
    }
}
