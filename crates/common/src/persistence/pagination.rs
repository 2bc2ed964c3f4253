//! # Pagination Support
//!
//! Skip/take paging parameters and the page type returned by filtered queries.

use serde::{Deserialize, Serialize};

/// Paging request
///
/// `skip` and `take` are optional; components apply their own defaults
/// through [`PagingParams::get_skip`] and [`PagingParams::get_take`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingParams {
    pub skip: Option<i64>,
    pub take: Option<i64>,
    /// Whether the total number of matching items should be counted
    #[serde(default)]
    pub total: bool,
}

impl PagingParams {
    pub fn new(skip: Option<i64>, take: Option<i64>, total: bool) -> Self {
        Self { skip, take, total }
    }

    /// Skip value, or `min_skip` when absent or smaller
    pub fn get_skip(&self, min_skip: i64) -> i64 {
        match self.skip {
            Some(skip) if skip >= min_skip => skip,
            _ => min_skip,
        }
    }

    /// Take value clamped to `[0, max_take]`, or `max_take` when absent
    pub fn get_take(&self, max_take: i64) -> i64 {
        match self.take {
            None => max_take,
            Some(take) if take < 0 => 0,
            Some(take) => take.min(max_take),
        }
    }

    /// Offset of the requested page, starting at 0
    pub fn offset(&self) -> i64 {
        self.get_skip(0)
    }

    /// Paging for the page following this one
    pub fn next_page(&self, max_take: i64) -> Self {
        let take = self.get_take(max_take);
        Self {
            skip: Some(self.offset() + take),
            take: Some(take),
            total: self.total,
        }
    }
}

/// One page of items with an optional total count
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPage<T> {
    pub data: Vec<T>,
    pub total: Option<i64>,
}

impl<T> DataPage<T> {
    pub fn new(data: Vec<T>, total: Option<i64>) -> Self {
        Self { data, total }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether items remain past this page; unknown without a total
    pub fn has_more(&self, paging: &PagingParams) -> Option<bool> {
        self.total
            .map(|total| paging.offset() + (self.data.len() as i64) < total)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> DataPage<U> {
        DataPage {
            data: self.data.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}
