//! Full-store enumeration past the per-request row cap.

use log::debug;

use crate::error::StoreError;
use crate::spot::Spot;
use crate::store::SpotStore;

/// Reads every spot in the store, one page of `page_size` rows at a time.
///
/// Stops on the first short or empty page. The whole set is materialized
/// before enrichment starts so gap totals can be reported up front. Rows
/// inserted behind the cursor while scanning are picked up by the next run.
pub fn scan_all<S: SpotStore + ?Sized>(
    store: &S,
    page_size: usize,
) -> Result<Vec<Spot>, StoreError> {
    let page_size = page_size.max(1);
    let mut spots = Vec::new();
    let mut page_index = 0usize;
    loop {
        let page = store.read_page(page_index * page_size, page_size)?;
        let fetched = page.len();
        debug!("Scan: page {} returned {} spots", page_index, fetched);
        spots.extend(page);
        if fetched < page_size {
            break;
        }
        page_index += 1;
    }
    Ok(spots)
}
