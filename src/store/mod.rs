//! Record store abstraction and concrete backends.

pub mod rest;
pub mod sqlite;

use crate::error::StoreError;
use crate::spot::{Spot, SpotPatch};

/// Paginated read and partial update against the backing spot store.
pub trait SpotStore {
    /// Reads up to `limit` spots starting at `offset`, ordered by id ascending.
    fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<Spot>, StoreError>;

    /// Writes only the columns present in `patch`; all other columns are left untouched.
    fn update_fields(&self, id: &str, patch: &SpotPatch) -> Result<(), StoreError>;
}

impl<S: SpotStore + ?Sized> SpotStore for Box<S> {
    fn read_page(&self, offset: usize, limit: usize) -> Result<Vec<Spot>, StoreError> {
        (**self).read_page(offset, limit)
    }

    fn update_fields(&self, id: &str, patch: &SpotPatch) -> Result<(), StoreError> {
        (**self).update_fields(id, patch)
    }
}
