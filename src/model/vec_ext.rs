use super::Model;
use crate::oid::ObjectId;

/// Identifier-keyed helpers for in-memory lists of records.
pub trait ModelVecExt<T: Model> {
    fn find_by_oid(&self, oid: &ObjectId) -> Option<&T>;

    /// Look up by hex identifier. An unparsable id simply matches nothing.
    fn find_by_id(&self, id: &str) -> Option<&T>;

    fn remove_by_oid(&mut self, oid: &ObjectId) -> Option<T>;

    fn remove_by_id(&mut self, id: &str) -> Option<T>;

    /// Replace the record with the same identifier in place, or append.
    fn upsert_by_oid(&mut self, record: T);
}

impl<T: Model> ModelVecExt<T> for Vec<T> {
    fn find_by_oid(&self, oid: &ObjectId) -> Option<&T> {
        self.iter().find(|r| r.oid().as_ref() == Some(oid))
    }

    fn find_by_id(&self, id: &str) -> Option<&T> {
        ObjectId::parse(id)
            .ok()
            .and_then(|oid| self.find_by_oid(&oid))
    }

    fn remove_by_oid(&mut self, oid: &ObjectId) -> Option<T> {
        let index = self.iter().position(|r| r.oid().as_ref() == Some(oid))?;
        Some(self.remove(index))
    }

    fn remove_by_id(&mut self, id: &str) -> Option<T> {
        let oid = ObjectId::parse(id).ok()?;
        self.remove_by_oid(&oid)
    }

    fn upsert_by_oid(&mut self, record: T) {
        let existing = record
            .oid()
            .and_then(|oid| self.iter().position(|r| r.oid() == Some(oid)));

        match existing {
            Some(index) => self[index] = record,
            None => self.push(record),
        }
    }
}
