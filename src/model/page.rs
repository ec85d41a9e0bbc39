use crate::model::{RateBudget, Repository};
use std::fmt;

/// Opaque pagination token handed out by the source
///
/// Only the fetcher that produced a cursor looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(String);

impl Cursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of search results
#[derive(Debug, Clone)]
pub struct Page {
    /// Valid repositories on this page, in source order
    pub records: Vec<Repository>,

    /// Cursor for the following page
    pub next_cursor: Option<Cursor>,

    /// Whether the source has another page after this one
    pub has_more: bool,

    /// Budget reported alongside this page
    pub budget: RateBudget,
}

impl Page {
    /// Returns the cursor to continue from, or `None` if the sequence ended
    ///
    /// A page that claims more data but carries no cursor is treated as the end.
    pub fn continuation(&self) -> Option<&Cursor> {
        if self.has_more {
            self.next_cursor.as_ref()
        } else {
            None
        }
    }
}
