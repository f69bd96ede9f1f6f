//! String-keyed symbol tables for the assembler.
//!
//! Three namespaces use these tables: functor labels map to ipoints,
//! code labels map to code pointers, and VPI labels map to handles.
//! `set` is last-wins; callers that need duplicate detection check with
//! [`SymbolTable::get`] first.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// A symbol table mapping label strings to copyable values.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable<T: Copy> {
    entries: BTreeMap<String, T>,
}

impl<T: Copy + std::fmt::Debug> SymbolTable<T> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Binds `label` to `value`, replacing any earlier binding.
    pub fn set(&mut self, label: &str, value: T) {
        self.entries.insert(label.to_string(), value);
    }

    /// Looks up a label, returning `None` on a miss.
    pub fn get(&self, label: &str) -> Option<T> {
        self.entries.get(label).copied()
    }

    /// True if the label is bound.
    pub fn contains(&self, label: &str) -> bool {
        self.entries.contains_key(label)
    }

    /// The number of bindings.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no labels are bound.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates the bindings in label order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Renders the table for a debug dump, one binding per line.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        for (label, value) in &self.entries {
            let _ = writeln!(out, "    {label} -> {value:?}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.set("f1", 7);
        assert_eq!(t.get("f1"), Some(7));
        assert_eq!(t.get("f2"), None);
        assert!(t.contains("f1"));
    }

    #[test]
    fn set_is_last_wins() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.set("lab", 1);
        t.set("lab", 2);
        assert_eq!(t.get("lab"), Some(2));
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn iter_in_label_order() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.set("b", 2);
        t.set("a", 1);
        let keys: Vec<&str> = t.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["a", "b"]);
    }

    #[test]
    fn dump_lists_bindings() {
        let mut t: SymbolTable<u32> = SymbolTable::new();
        t.set("v0", 4);
        let text = t.dump();
        assert!(text.contains("v0 -> 4"));
    }
}
