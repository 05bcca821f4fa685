use crate::records::row::Row;

/// Rows fetched with a single `(page_size, offset)` query.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Zero-based position of the page in the sequence.
    pub index: usize,
    pub offset: usize,
    pub page_size: usize,
    pub rows: Vec<Row>,
    /// Set when the source holds nothing past this page.
    pub last: bool,
}

impl Page {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_last(&self) -> bool {
        self.last || self.rows.len() < self.page_size
    }
}

impl IntoIterator for Page {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}
