//! Schema-driven random-access decoder over a completed page

use crate::error::{Error, Result};
use crate::page::Page;
use crate::schema::{Column, ColumnType};
use crate::value::{Timestamp, Value};

/// Reads records back out of a [`Page`] against the schema it was encoded
/// with
///
/// The cursor starts before the first record; call
/// [`next_record`](PageReader::next_record) to advance. Accessors resolve a
/// column's slot from the schema's precomputed offsets and fail with
/// [`Error::TypeMismatch`] when invoked against a column of a different
/// type. Reading a column without checking [`is_null`](PageReader::is_null)
/// first is a caller bug; debug builds assert on it.
pub struct PageReader<'a> {
    page: &'a Page,
    record: usize,
    started: bool,
}

impl<'a> PageReader<'a> {
    /// Create a reader positioned before the first record
    pub fn new(page: &'a Page) -> Self {
        Self {
            page,
            record: 0,
            started: false,
        }
    }

    /// Get the page this reader decodes
    pub fn page(&self) -> &'a Page {
        self.page
    }

    /// Advance to the next record; returns false once exhausted
    pub fn next_record(&mut self) -> bool {
        if self.started {
            self.record += 1;
        } else {
            self.started = true;
        }
        self.record < self.page.record_count()
    }

    /// Check the null map for one column of the current record
    pub fn is_null(&self, ordinal: usize) -> Result<bool> {
        debug_assert!(self.started, "is_null called before next_record");
        self.page.is_null(self.record, ordinal)
    }

    /// Read a boolean column of the current record
    pub fn boolean(&self, ordinal: usize) -> Result<bool> {
        let at = self.slot(ordinal, ColumnType::Boolean)?;
        Ok(self.page.buffer().get_u8(at) != 0)
    }

    /// Read a long column of the current record
    pub fn long(&self, ordinal: usize) -> Result<i64> {
        let at = self.slot(ordinal, ColumnType::Long)?;
        Ok(self.page.buffer().get_i64(at))
    }

    /// Read a double column of the current record
    pub fn double(&self, ordinal: usize) -> Result<f64> {
        let at = self.slot(ordinal, ColumnType::Double)?;
        Ok(self.page.buffer().get_f64(at))
    }

    /// Read a timestamp column of the current record
    pub fn timestamp(&self, ordinal: usize) -> Result<Timestamp> {
        let at = self.slot(ordinal, ColumnType::Timestamp)?;
        let buffer = self.page.buffer();
        Timestamp::new(buffer.get_i64(at), buffer.get_u32(at + 8))
    }

    /// Read a string column of the current record, borrowing from the
    /// page's heap
    pub fn string(&self, ordinal: usize) -> Result<&'a str> {
        let bytes = self.heap_slice(ordinal, ColumnType::String)?;
        std::str::from_utf8(bytes)
            .map_err(|_| Error::InvalidArgument("invalid utf-8 in string column".to_string()))
    }

    /// Read a json column of the current record
    pub fn json(&self, ordinal: usize) -> Result<serde_json::Value> {
        let bytes = self.heap_slice(ordinal, ColumnType::Json)?;
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Read any column of the current record as a [`Value`], `None` when
    /// null
    pub fn read_value(&self, ordinal: usize) -> Result<Option<Value>> {
        if self.is_null(ordinal)? {
            return Ok(None);
        }
        let value = match self.page.schema().column(ordinal)?.column_type() {
            ColumnType::Boolean => Value::Boolean(self.boolean(ordinal)?),
            ColumnType::Long => Value::Long(self.long(ordinal)?),
            ColumnType::Double => Value::Double(self.double(ordinal)?),
            ColumnType::String => Value::String(self.string(ordinal)?.to_string()),
            ColumnType::Timestamp => Value::Timestamp(self.timestamp(ordinal)?),
            ColumnType::Json => Value::Json(self.json(ordinal)?),
        };
        Ok(Some(value))
    }

    /// Dispatch every column of the current record to the matching visitor
    /// method, passing `None` for null columns
    pub fn visit_record<V: RecordVisitor>(&self, visitor: &mut V) -> Result<()> {
        for column in self.page.schema().columns() {
            let ordinal = column.ordinal();
            let null = self.is_null(ordinal)?;
            match column.column_type() {
                ColumnType::Boolean => {
                    let value = if null { None } else { Some(self.boolean(ordinal)?) };
                    visitor.boolean(column, value)?;
                }
                ColumnType::Long => {
                    let value = if null { None } else { Some(self.long(ordinal)?) };
                    visitor.long(column, value)?;
                }
                ColumnType::Double => {
                    let value = if null { None } else { Some(self.double(ordinal)?) };
                    visitor.double(column, value)?;
                }
                ColumnType::String => {
                    let value = if null { None } else { Some(self.string(ordinal)?) };
                    visitor.string(column, value)?;
                }
                ColumnType::Timestamp => {
                    let value = if null {
                        None
                    } else {
                        Some(self.timestamp(ordinal)?)
                    };
                    visitor.timestamp(column, value)?;
                }
                ColumnType::Json => {
                    let value = if null { None } else { Some(self.json(ordinal)?) };
                    visitor.json(column, value)?;
                }
            }
        }
        Ok(())
    }

    /// Resolve a column's slot offset for the current record, checking the
    /// accessor type and (in debug builds) the null map.
    fn slot(&self, ordinal: usize, expected: ColumnType) -> Result<usize> {
        debug_assert!(self.started, "accessor called before next_record");
        let column = self.page.schema().column(ordinal)?;
        if column.column_type() != expected {
            return Err(Error::TypeMismatch {
                column: column.name().to_string(),
                expected,
                actual: column.column_type(),
            });
        }
        debug_assert!(
            !self.page.is_null(self.record, ordinal)?,
            "read of null column '{}'",
            column.name()
        );
        Ok(self.page.format().slot_row_offset(self.record) + self.page.schema().slot_offset(ordinal)?)
    }

    /// Follow a variable-width column's `(offset, length)` pair into the
    /// heap.
    fn heap_slice(&self, ordinal: usize, expected: ColumnType) -> Result<&'a [u8]> {
        let at = self.slot(ordinal, expected)?;
        let buffer = self.page.buffer();
        let offset = buffer.get_u32(at) as usize;
        let len = buffer.get_u32(at + 4) as usize;
        Ok(buffer.read_slice(offset, len))
    }
}

/// Typed per-column handlers for consuming a record without per-column
/// type tests
///
/// [`PageReader::visit_record`] calls exactly one method per column, chosen
/// by the column's declared type; the `Option` is `None` for null columns.
pub trait RecordVisitor {
    /// Handle a boolean column
    fn boolean(&mut self, column: &Column, value: Option<bool>) -> Result<()>;

    /// Handle a long column
    fn long(&mut self, column: &Column, value: Option<i64>) -> Result<()>;

    /// Handle a double column
    fn double(&mut self, column: &Column, value: Option<f64>) -> Result<()>;

    /// Handle a string column
    fn string(&mut self, column: &Column, value: Option<&str>) -> Result<()>;

    /// Handle a timestamp column
    fn timestamp(&mut self, column: &Column, value: Option<Timestamp>) -> Result<()>;

    /// Handle a json column
    fn json(&mut self, column: &Column, value: Option<serde_json::Value>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::memory::BufferAllocator;
    use crate::page_builder::PageBuilder;
    use crate::schema::Schema;
    use crate::sink::CollectingPageSink;

    fn sample_page() -> Page {
        let schema = Arc::new(
            Schema::new(vec![
                Column::new(0, "id", ColumnType::Long),
                Column::new(1, "name", ColumnType::String),
                Column::new(2, "score", ColumnType::Double),
            ])
            .unwrap(),
        );
        let mut builder =
            PageBuilder::new(schema, BufferAllocator::new(), CollectingPageSink::new());

        builder.set_long(0, 1).unwrap();
        builder.set_string(1, "alice").unwrap();
        builder.set_double(2, 10.5).unwrap();
        builder.add_record().unwrap();

        builder.set_long(0, 2).unwrap();
        builder.set_null(1).unwrap();
        builder.set_double(2, -0.25).unwrap();
        builder.add_record().unwrap();

        builder.finish().unwrap();
        builder.into_sink().take_pages().remove(0)
    }

    #[test]
    fn cursor_walks_records_in_order() {
        let page = sample_page();
        let mut reader = PageReader::new(&page);

        assert!(reader.next_record());
        assert_eq!(reader.long(0).unwrap(), 1);
        assert_eq!(reader.string(1).unwrap(), "alice");

        assert!(reader.next_record());
        assert_eq!(reader.long(0).unwrap(), 2);
        assert!(reader.is_null(1).unwrap());
        assert_eq!(reader.double(2).unwrap(), -0.25);

        assert!(!reader.next_record());
        assert!(!reader.next_record());
    }

    #[test]
    fn accessor_rejects_wrong_type() {
        let page = sample_page();
        let mut reader = PageReader::new(&page);
        assert!(reader.next_record());

        let err = reader.boolean(0).unwrap_err();
        assert!(matches!(
            err,
            Error::TypeMismatch { expected: ColumnType::Boolean, actual: ColumnType::Long, .. }
        ));
    }

    #[test]
    fn read_value_wraps_nulls() {
        let page = sample_page();
        let mut reader = PageReader::new(&page);
        reader.next_record();
        reader.next_record();

        assert_eq!(reader.read_value(0).unwrap(), Some(Value::Long(2)));
        assert_eq!(reader.read_value(1).unwrap(), None);
    }

    #[test]
    fn visitor_sees_every_column_once() {
        struct Collector {
            cells: Vec<String>,
        }

        impl RecordVisitor for Collector {
            fn boolean(&mut self, _: &Column, v: Option<bool>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
            fn long(&mut self, _: &Column, v: Option<i64>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
            fn double(&mut self, _: &Column, v: Option<f64>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
            fn string(&mut self, _: &Column, v: Option<&str>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
            fn timestamp(&mut self, _: &Column, v: Option<Timestamp>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
            fn json(&mut self, _: &Column, v: Option<serde_json::Value>) -> Result<()> {
                self.cells.push(format!("{:?}", v));
                Ok(())
            }
        }

        let page = sample_page();
        let mut reader = PageReader::new(&page);
        reader.next_record();
        reader.next_record();

        let mut collector = Collector { cells: Vec::new() };
        reader.visit_record(&mut collector).unwrap();
        assert_eq!(collector.cells, vec!["Some(2)", "None", "Some(-0.25)"]);
    }

    #[test]
    fn out_of_bounds_ordinal_is_rejected() {
        let page = sample_page();
        let mut reader = PageReader::new(&page);
        reader.next_record();
        assert!(matches!(reader.long(9), Err(Error::IndexOutOfBounds)));
    }
}
