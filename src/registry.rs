//! Ordered, name-unique collection of parsed units.

use crate::parser::ParseError;
use crate::types::{Bucket, Flag};
use crate::unit::Unit;

/// A unit together with the document line that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub line: usize,
    pub unit: Unit,
}

/// Units in document order. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: Vec<Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a unit in document order, rejecting a name already present.
    pub fn append(&mut self, line: usize, unit: Unit) -> Result<(), ParseError> {
        if let Some(first) = self.entry(&unit.name) {
            return Err(ParseError::DuplicateUnit {
                line,
                name: unit.name,
                first_line: first.line,
            });
        }
        self.entries.push(Entry { line, unit });
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.unit.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&Unit> {
        self.entry(name).map(|e| &e.unit)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// Units belonging to `bucket`, in document order.
    ///
    /// Lead and Trail select units carrying that flag; Main selects units
    /// carrying neither.
    pub fn filter_by_phase(&self, bucket: Bucket) -> Vec<&Entry> {
        self.entries
            .iter()
            .filter(|e| in_bucket(&e.unit, bucket))
            .collect()
    }

    /// Mutable view of a bucket, used by the scheduler during execution.
    pub fn phase_mut(&mut self, bucket: Bucket) -> impl Iterator<Item = &mut Unit> {
        self.entries
            .iter_mut()
            .filter(move |e| in_bucket(&e.unit, bucket))
            .map(|e| &mut e.unit)
    }

    /// Every unit in the order the scheduler will visit them.
    pub fn execution_order(&self) -> Vec<&Entry> {
        Bucket::ordered()
            .into_iter()
            .flat_map(|bucket| self.filter_by_phase(bucket))
            .collect()
    }
}

fn in_bucket(unit: &Unit, bucket: Bucket) -> bool {
    match bucket {
        Bucket::Lead => unit.has_flag(Flag::Lead),
        Bucket::Trail => unit.has_flag(Flag::Trail),
        Bucket::Main => !unit.has_flag(Flag::Lead) && !unit.has_flag(Flag::Trail),
    }
}
