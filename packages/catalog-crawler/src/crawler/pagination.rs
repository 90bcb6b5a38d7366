//! Per-pagination-mode URL computation (§4.6 subclass responsibilities).

use catalog_extraction::types::PaginationMode;

/// The action to take for a given page index. Infinite-scroll and
/// already-exhausted hybrid retailers return `Exhausted` to signal the
/// crawler should stop walking pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageAction {
    Url(String),
    /// Degenerate single-page case: the base URL already renders everything
    /// the browser tower will capture.
    SinglePageOnly(String),
}

/// Computes the page action for `page_index` (1-based) against `base_url`.
pub fn page_action(
    mode: PaginationMode,
    base_url: &str,
    page_index: u32,
    items_per_page: Option<u32>,
) -> PageAction {
    match mode {
        PaginationMode::Paged => {
            if page_index == 1 {
                PageAction::Url(base_url.to_string())
            } else {
                PageAction::Url(append_query(base_url, &format!("page={page_index}")))
            }
        }
        PaginationMode::Offset => {
            let rows = items_per_page.unwrap_or(48);
            let start = (page_index - 1) * rows;
            PageAction::Url(append_query(base_url, &format!("start={start}&rows={rows}")))
        }
        PaginationMode::InfiniteScroll => PageAction::SinglePageOnly(base_url.to_string()),
        PaginationMode::HybridLoadMore => {
            if page_index == 1 {
                PageAction::Url(base_url.to_string())
            } else {
                PageAction::Url(append_query(base_url, &format!("page={page_index}")))
            }
        }
    }
}

/// Whether this pagination mode ever walks beyond page 1 via URL alone.
pub fn supports_multi_page_urls(mode: PaginationMode) -> bool {
    !matches!(mode, PaginationMode::InfiniteScroll)
}

fn append_query(base_url: &str, extra: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}{extra}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paged_mode_appends_page_query_param_from_page_two_onward() {
        assert_eq!(
            page_action(PaginationMode::Paged, "https://x/dresses", 1, None),
            PageAction::Url("https://x/dresses".to_string())
        );
        assert_eq!(
            page_action(PaginationMode::Paged, "https://x/dresses", 2, None),
            PageAction::Url("https://x/dresses?page=2".to_string())
        );
    }

    #[test]
    fn offset_mode_computes_start_from_page_index_and_page_size() {
        assert_eq!(
            page_action(PaginationMode::Offset, "https://x/dresses", 3, Some(36)),
            PageAction::Url("https://x/dresses?start=72&rows=36".to_string())
        );
    }

    #[test]
    fn infinite_scroll_is_single_page_regardless_of_index() {
        assert_eq!(
            page_action(PaginationMode::InfiniteScroll, "https://x/dresses", 5, None),
            PageAction::SinglePageOnly("https://x/dresses".to_string())
        );
        assert!(!supports_multi_page_urls(PaginationMode::InfiniteScroll));
    }

    #[test]
    fn respects_existing_query_string_when_appending() {
        assert_eq!(
            page_action(PaginationMode::Paged, "https://x/dresses?sortBy=newest", 2, None),
            PageAction::Url("https://x/dresses?sortBy=newest&page=2".to_string())
        );
    }
}
