//! Folding of flat joined rows into nested entities.
//!
//! A relational join of a parent with its children yields one row per child,
//! or a single row with empty child columns when the parent has none. The
//! assembler walks those rows once, in source order, and emits one group per
//! parent. Child order is exactly row order; callers own the `ORDER BY`.

use std::collections::HashMap;
use std::hash::Hash;

/// One row of a parent/child join.
pub trait FlatRow {
    type Key: Eq + Hash;
    type Parent;
    type Child;

    fn parent_key(&self) -> Self::Key;

    /// Split into the parent projection and the child, if the row carries one.
    fn split(self) -> (Self::Parent, Option<Self::Child>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouped<P, C> {
    pub parent: P,
    pub children: Vec<C>,
}

/// Group rows by parent in first-seen order.
pub fn assemble<R, I>(rows: I) -> Vec<Grouped<R::Parent, R::Child>>
where
    R: FlatRow,
    I: IntoIterator<Item = R>,
{
    let mut positions: HashMap<R::Key, usize> = HashMap::new();
    let mut groups: Vec<Grouped<R::Parent, R::Child>> = Vec::new();

    for row in rows {
        let key = row.parent_key();
        let (parent, child) = row.split();
        let index = *positions.entry(key).or_insert_with(|| {
            groups.push(Grouped {
                parent,
                children: Vec::new(),
            });
            groups.len() - 1
        });
        if let Some(child) = child {
            groups[index].children.push(child);
        }
    }

    groups
}
