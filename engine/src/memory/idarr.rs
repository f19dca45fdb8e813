//! Shared, immutable operator-ID arrays (spec.md §9 "Shared ID arrays").
//!
//! Modulator lists and carrier lists are meant to be shared by value across
//! many events when they do not change. Rather than threading a pool
//! pointer and a raw length through every consumer the way the historical
//! `IDArr` does, this is an ordinary reference-counted slice: cheap to
//! clone, free to compare structurally, and the empty list is just
//! `IdArr::default()` so callers can test `.is_empty()` without a null
//! check.

use std::rc::Rc;

/// A count-prefixed, immutable array of operator IDs, shared by every
/// operator-data entry and voice-graph reference that was built from the
/// same parse-time modulator list (spec.md §3 "Invariants").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IdArr(Rc<[u32]>);

impl IdArr {
    pub fn new(ids: Vec<u32>) -> IdArr {
        IdArr(ids.into())
    }

    pub fn empty() -> IdArr {
        IdArr::default()
    }

    pub fn ids(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<u32> for IdArr {
    fn from_iter<T: IntoIterator<Item = u32>>(iter: T) -> Self {
        IdArr(iter.into_iter().collect::<Vec<_>>().into())
    }
}

impl<'a> IntoIterator for &'a IdArr {
    type Item = &'a u32;
    type IntoIter = std::slice::Iter<'a, u32>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

// `Rc<[u32]>` has no `Serialize`/`Deserialize` of its own without serde's
// `rc` feature (which would also (de)serialize sharing, not just the data);
// the `--dump-program` debugging aid only needs the plain id sequence, so
// this delegates to `&[u32]`/`Vec<u32>` instead.
#[cfg(feature = "serde")]
impl serde::Serialize for IdArr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.ids().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for IdArr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Vec::<u32>::deserialize(deserializer).map(IdArr::new)
    }
}
