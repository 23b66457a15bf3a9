//! Page-number pagination shared by every post listing.

use serde::Serialize;

/// Fixed number of posts shown per listing page.
pub const POSTS_PER_PAGE: u64 = 10;

/// The `page` query value after lenient parsing.
///
/// Missing or non-numeric input becomes page 1; clamping to the valid range
/// happens once the total is known, see [`Paginator::clamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageNumber(i64);

impl PageNumber {
    pub fn parse(raw: Option<&str>) -> Self {
        let value = raw
            .map(str::trim)
            .and_then(|value| value.parse::<i64>().ok())
            .unwrap_or(1);
        Self(value)
    }

    pub fn first() -> Self {
        Self(1)
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl Default for PageNumber {
    fn default() -> Self {
        Self::first()
    }
}

/// Offset/limit pair handed to the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub offset: u64,
    pub limit: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct Paginator {
    total: u64,
    per_page: u64,
}

impl Paginator {
    pub fn new(total: u64, per_page: u64) -> Self {
        Self {
            total,
            per_page: per_page.max(1),
        }
    }

    pub fn posts(total: u64) -> Self {
        Self::new(total, POSTS_PER_PAGE)
    }

    /// Page count; an empty collection still has one (empty) page.
    pub fn num_pages(&self) -> u64 {
        self.total.div_ceil(self.per_page).max(1)
    }

    /// Clamp a requested page into `1..=num_pages`.
    pub fn clamp(&self, requested: PageNumber) -> u64 {
        let last = self.num_pages();
        match u64::try_from(requested.get()) {
            Ok(0) | Err(_) => 1,
            Ok(value) => value.min(last),
        }
    }

    pub fn request(&self, number: u64) -> PageRequest {
        PageRequest {
            offset: number.saturating_sub(1).saturating_mul(self.per_page),
            limit: self.per_page,
        }
    }

    pub fn page<T>(&self, number: u64, items: Vec<T>) -> Page<T> {
        Page {
            items,
            number,
            num_pages: self.num_pages(),
            total_count: self.total,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub number: u64,
    pub num_pages: u64,
    pub total_count: u64,
}

impl<T> Page<T> {
    pub fn has_previous(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.num_pages
    }

    pub fn previous_page_number(&self) -> Option<u64> {
        self.has_previous().then(|| self.number - 1)
    }

    pub fn next_page_number(&self) -> Option<u64> {
        self.has_next().then(|| self.number + 1)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            number: self.number,
            num_pages: self.num_pages,
            total_count: self.total_count,
        }
    }
}
