use serde::{Serialize, Serializer};
use std::collections::BTreeSet;

pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const ELLIPSIS: &str = "…";

pub fn total_pages(item_count: usize, page_size: usize) -> usize {
    let size = page_size.max(1);
    item_count.div_ceil(size).max(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageButton {
    Page(usize),
    Ellipsis,
}

impl Serialize for PageButton {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PageButton::Page(n) => serializer.serialize_u64(*n as u64),
            PageButton::Ellipsis => serializer.serialize_str(ELLIPSIS),
        }
    }
}

/// First, last and the three pages around `page`, with an ellipsis over
/// every gap. Never more than 7 entries.
pub fn compact_pages(page: usize, total_pages: usize) -> Vec<PageButton> {
    let total = total_pages.max(1);
    let mut wanted = BTreeSet::new();
    wanted.insert(1);
    wanted.insert(total);
    for p in [page.saturating_sub(1), page, page.saturating_add(1)] {
        if (1..=total).contains(&p) {
            wanted.insert(p);
        }
    }

    let mut out = Vec::with_capacity(wanted.len() * 2);
    let mut prev: Option<usize> = None;
    for p in wanted {
        if let Some(last) = prev {
            if p - last > 1 {
                out.push(PageButton::Ellipsis);
            }
        }
        out.push(PageButton::Page(p));
        prev = Some(p);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageModel {
    pub page: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub item_count: usize,
    /// 1-based index of the first visible item, 0 when the list is empty.
    pub from: usize,
    pub to: usize,
    pub has_prev: bool,
    pub has_next: bool,
    pub buttons: Vec<PageButton>,
}

/// Page counter for one list. Several can live side by side in a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paginator {
    page: usize,
    page_size: usize,
    item_count: usize,
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl Paginator {
    pub fn new(page_size: usize) -> Self {
        Self {
            page: 1,
            page_size: page_size.max(1),
            item_count: 0,
        }
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn total_pages(&self) -> usize {
        total_pages(self.item_count, self.page_size)
    }

    /// Keeps `page` within `1..=total_pages` after the list changes size.
    pub fn set_item_count(&mut self, item_count: usize) {
        self.item_count = item_count;
        let total = self.total_pages();
        if self.page > total {
            self.page = total;
        }
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.page_size = page_size.max(1);
        self.set_item_count(self.item_count);
    }

    /// Out-of-range targets are ignored.
    pub fn go_to(&mut self, page: usize) -> bool {
        if page == 0 || page > self.total_pages() {
            return false;
        }
        self.page = page;
        true
    }

    pub fn next(&mut self) -> bool {
        if self.page >= self.total_pages() {
            return false;
        }
        self.page += 1;
        true
    }

    pub fn prev(&mut self) -> bool {
        if self.page <= 1 {
            return false;
        }
        self.page -= 1;
        true
    }

    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = (self.page - 1).saturating_mul(self.page_size);
        if start >= items.len() {
            return &[];
        }
        let end = start.saturating_add(self.page_size).min(items.len());
        &items[start..end]
    }

    pub fn model(&self) -> PageModel {
        let total = self.total_pages();
        let (from, to) = if self.item_count == 0 {
            (0, 0)
        } else {
            (
                self.page_size * (self.page - 1) + 1,
                (self.page_size * self.page).min(self.item_count),
            )
        };
        PageModel {
            page: self.page,
            total_pages: total,
            page_size: self.page_size,
            item_count: self.item_count,
            from,
            to,
            has_prev: self.page > 1,
            has_next: self.page < total,
            buttons: compact_pages(self.page, total),
        }
    }
}
