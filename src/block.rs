//! Data blocks: the unit of columnar transfer.
//!
//! A block is an ordered set of named columns sharing one row count. Blocks
//! with zero rows are legal and meaningful: the server sends an empty block
//! as the insert schema, and the client sends one as the insert terminator.

use crate::column::{
    Column,
    ColumnRef,
    Value,
};
use crate::types::Type;
use crate::{
    Error,
    Result,
};

/// Block metadata carried in the block header.
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    /// Set when the block carries group-by overflow rows.
    pub is_overflows: bool,
    /// Two-level aggregation bucket, -1 when absent.
    pub bucket_num: i32,
}

/// Which server message a block arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlockTag {
    /// A plain data block.
    #[default]
    Data,
    /// The totals row of a `WITH TOTALS` query.
    Totals,
    /// The extremes rows when `extremes = 1`.
    Extremes,
}

/// A columnar batch of rows.
pub struct Block {
    table_name: String,
    columns: Vec<NamedColumn>,
    rows: usize,
    info: BlockInfo,
    tag: BlockTag,
}

struct NamedColumn {
    name: String,
    column: ColumnRef,
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("table_name", &self.table_name)
            .field("columns", &self.columns.iter().map(|c| &c.name).collect::<Vec<_>>())
            .field("rows", &self.rows)
            .field("info", &self.info)
            .field("tag", &self.tag)
            .finish()
    }
}

impl Block {
    /// Create a new empty block.
    pub fn new() -> Self {
        Self {
            table_name: String::new(),
            columns: Vec::new(),
            rows: 0,
            info: BlockInfo { is_overflows: false, bucket_num: -1 },
            tag: BlockTag::Data,
        }
    }

    /// Append a named column. Every column must have the same row count.
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        column: impl Into<ColumnRef>,
    ) -> Result<()> {
        let name = name.into();
        let column = column.into();

        if self.columns.is_empty() {
            self.rows = column.len();
        } else if column.len() != self.rows {
            return Err(Error::Validation(format!(
                "All columns in a block must share the row count. \
                 Column '{}' has {} rows, block has {}",
                name,
                column.len(),
                self.rows
            )));
        }

        self.columns.push(NamedColumn { name, column });
        Ok(())
    }

    /// Number of columns.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Number of rows.
    pub fn row_count(&self) -> usize {
        self.rows
    }

    /// Whether the block carries no rows or no columns.
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.columns.is_empty()
    }

    /// Column by index.
    pub fn column(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|item| item.column.as_ref())
    }

    /// Column name by index.
    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    /// Column by name.
    pub fn column_by_name(&self, name: &str) -> Option<&dyn Column> {
        self.columns
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.column.as_ref())
    }

    /// The cell at (`row`, `column`).
    pub fn value(&self, row: usize, column: usize) -> Option<Value> {
        self.column(column)?.value_at(row)
    }

    /// One row projected as values, or `None` past the end.
    pub fn row(&self, row: usize) -> Option<Vec<Value>> {
        if row >= self.rows {
            return None;
        }
        self.columns
            .iter()
            .map(|item| item.column.value_at(row))
            .collect()
    }

    /// Iterate over `(name, type, column)` triples.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Type, &dyn Column)> {
        self.columns.iter().map(|item| {
            (
                item.name.as_str(),
                item.column.column_type(),
                item.column.as_ref(),
            )
        })
    }

    /// Block metadata.
    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    /// Replace block metadata.
    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Which server message the block arrived in.
    pub fn tag(&self) -> BlockTag {
        self.tag
    }

    pub(crate) fn set_tag(&mut self, tag: BlockTag) {
        self.tag = tag;
    }

    /// The external table name ("totals"/"extremes" for those messages).
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub(crate) fn set_table_name(&mut self, name: String) {
        self.table_name = name;
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}
