//! Pagination token returned by single-table paginated reads.

use super::RowId;
use serde::{Deserialize, Serialize};

/// Raw value of [`PageToken::End`] when a token crosses an API boundary.
const END_OF_PAGES: i64 = -1;

/// Cursor into a single record table.
///
/// `Next(row_id)` names the first row that did not fit into the previous
/// page; the follow-up read must start at that row (`row_id >= token`).
/// Callers thread the token back unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageToken {
    Next(RowId),
    End,
}

impl PageToken {
    /// Returns the raw wire form; `-1` when no further page exists.
    pub fn as_raw(self) -> i64 {
        match self {
            Self::Next(row_id) => row_id,
            Self::End => END_OF_PAGES,
        }
    }

    /// Parses the raw wire form. Any negative value means no further page.
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::End
        } else {
            Self::Next(raw)
        }
    }

    pub fn has_next(self) -> bool {
        matches!(self, Self::Next(_))
    }

    /// Row id the next page starts from, if any.
    pub fn next_row_id(self) -> Option<RowId> {
        match self {
            Self::Next(row_id) => Some(row_id),
            Self::End => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PageToken;

    #[test]
    fn end_token_uses_negative_sentinel() {
        assert_eq!(PageToken::End.as_raw(), -1);
        assert_eq!(PageToken::from_raw(-1), PageToken::End);
        assert!(!PageToken::End.has_next());
    }

    #[test]
    fn next_token_round_trips_row_id() {
        let token = PageToken::from_raw(42);
        assert_eq!(token, PageToken::Next(42));
        assert_eq!(token.next_row_id(), Some(42));
        assert_eq!(token.as_raw(), 42);
    }
}
