use serde::Serialize;
use std::collections::BTreeMap;

/// Page links shown at once.
pub const PER_ROUND: u32 = 6;

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct PageLink {
    pub n: u32,
    pub link: String,
}

/// Pager for a list view: a sliding window of page links plus first/last/next/previous.
#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
pub struct Pagination {
    pub total_pages: u32,
    pub total_items: u64,
    pub current: u32,
    pub per_round: u32,
    pub pages: Vec<PageLink>,
    pub first: String,
    pub last: String,
    /// `None` on the last page.
    pub next: Option<String>,
    /// `None` on the first page.
    pub previous: Option<String>,
}

/// `path?{other params}&page=N`. Every query param except `page` is kept.
pub fn page_url(path: &str, page: u32, query: &BTreeMap<String, String>) -> String {
    let mut params: Vec<String> = query
        .iter()
        .filter(|(k, _)| k.as_str() != "page")
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect();
    params.push(format!("page={page}"));
    format!("{}?{}", path, params.join("&"))
}

impl Pagination {
    /// `None` when there is nothing to page through.
    pub fn build(
        path: &str,
        total_items: u64,
        page: u32,
        size: u32,
        query: &BTreeMap<String, String>,
    ) -> Option<Self> {
        if size == 0 {
            return None;
        }
        let total_pages = u32::try_from(total_items.div_ceil(u64::from(size))).unwrap_or(u32::MAX);
        if total_pages == 0 {
            return None;
        }
        let current = page.clamp(1, total_pages);

        let (start, end) = if total_pages <= PER_ROUND {
            (1, total_pages)
        } else {
            let mut start = current.saturating_sub(1).max(1);
            let end = total_pages.min(start.saturating_add(PER_ROUND - 1));
            if end - start + 1 < PER_ROUND {
                start = start.min(end - (PER_ROUND - 1)).max(1);
            }
            (start, end)
        };

        let link = |n: u32| page_url(path, n, query);
        Some(Self {
            total_pages,
            total_items,
            current,
            per_round: PER_ROUND,
            pages: (start..=end).map(|n| PageLink { n, link: link(n) }).collect(),
            first: link(1),
            last: link(total_pages),
            next: (current < total_pages).then(|| link(current + 1)),
            previous: (current > 1).then(|| link(current - 1)),
        })
    }

    /// Pager for an endpoint that reports no total.
    ///
    /// Pages up to the current one are known; a full page implies one more.
    pub fn open_ended(
        path: &str,
        page: u32,
        size: u32,
        returned: usize,
        query: &BTreeMap<String, String>,
    ) -> Option<Self> {
        let page = page.max(1);
        let returned = returned as u64;
        let before = u64::from(page - 1) * u64::from(size);
        let known = if returned >= u64::from(size) {
            before + returned + 1
        } else {
            before + returned
        };
        Self::build(path, known, page, size, query)
    }

    pub fn page_numbers(&self) -> Vec<u32> {
        self.pages.iter().map(|p| p.n).collect()
    }
}
