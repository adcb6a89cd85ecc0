use crate::error::DecodeError;
use crate::map::FieldMap;

/// Outcome of a batch read: every matched document lands in exactly one list,
/// in store order.
#[derive(Debug)]
pub struct FindResult<T> {
    pub successes: Vec<T>,
    /// Documents that did not decode, with the raw map and the reason.
    pub failures: Vec<(FieldMap, DecodeError)>,
}

impl<T> FindResult<T> {
    pub fn new() -> Self {
        Self {
            successes: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// True when every document decoded.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Documents seen, decoded or not.
    pub fn len(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_parts(self) -> (Vec<T>, Vec<(FieldMap, DecodeError)>) {
        (self.successes, self.failures)
    }
}

impl<T> Default for FindResult<T> {
    fn default() -> Self {
        Self::new()
    }
}
