//! Fixed-size, 1-indexed pagination.

use serde::Serialize;

/// One page of a filtered collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-indexed page number that was requested.
    pub page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

/// Number of pages needed for `total_items` (zero for an empty collection).
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

/// Slice out page `page` (1-indexed; 0 is treated as 1).
///
/// Pages past the end are empty.
pub fn paginate<T: Clone>(items: &[T], page: usize, page_size: usize) -> Page<T> {
    let page = page.max(1);
    let start = (page - 1).saturating_mul(page_size);
    let window = if page_size == 0 || start >= items.len() {
        Vec::new()
    } else {
        let end = (start + page_size).min(items.len());
        items[start..end].to_vec()
    };

    Page {
        items: window,
        page,
        page_size,
        total_items: items.len(),
        total_pages: total_pages(items.len(), page_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_page_holds_remainder() {
        for n in [1usize, 11, 12, 13, 25, 36] {
            let items: Vec<usize> = (0..n).collect();
            let last = total_pages(n, 12);
            let expected = if n % 12 == 0 { 12 } else { n % 12 };
            assert_eq!(paginate(&items, last, 12).items.len(), expected, "n={n}");
            assert!(paginate(&items, last + 1, 12).items.is_empty(), "n={n}");
        }
    }

    #[test]
    fn first_page_and_zero_page() {
        let items: Vec<usize> = (0..30).collect();
        let first = paginate(&items, 1, 12);
        assert_eq!(first.items, (0..12).collect::<Vec<_>>());
        assert_eq!(first.total_pages, 3);
        assert_eq!(paginate(&items, 0, 12).items, first.items);
    }

    #[test]
    fn empty_collection_has_no_pages() {
        let items: Vec<u8> = Vec::new();
        let page = paginate(&items, 1, 12);
        assert!(page.items.is_empty());
        assert_eq!(page.total_pages, 0);
    }
}
