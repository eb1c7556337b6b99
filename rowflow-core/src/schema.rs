//! Schema and column-type descriptors shared by every pipeline stage

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use static_assertions::const_assert_eq;

use crate::error::{Error, Result};

/// Width of the `(offset, length)` slot pair a variable-width column
/// occupies in the fixed slot array.
pub(crate) const VAR_SLOT_WIDTH: usize = 2 * std::mem::size_of::<u32>();

const_assert_eq!(VAR_SLOT_WIDTH, 8);

/// Storage type of a column value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    /// Boolean, stored as a single byte
    Boolean,

    /// 64-bit signed integer, stored as 8-byte two's complement
    Long,

    /// 64-bit IEEE-754 floating point
    Double,

    /// UTF-8 string, stored out of line in the page heap
    String,

    /// Instant as 8-byte epoch seconds plus a 4-byte nanosecond adjustment
    Timestamp,

    /// Semi-structured value, stored out of line as canonical JSON bytes
    Json,
}

impl ColumnType {
    /// Get the number of bytes this type occupies in a record's fixed slot
    /// array. Variable-width types occupy an offset/length pair rather than
    /// their payload.
    pub const fn slot_width(self) -> usize {
        match self {
            ColumnType::Boolean => 1,
            ColumnType::Long | ColumnType::Double => 8,
            ColumnType::Timestamp => 12,
            ColumnType::String | ColumnType::Json => VAR_SLOT_WIDTH,
        }
    }

    /// Check if this type stores its payload directly in the slot array
    pub const fn is_fixed_width(self) -> bool {
        !matches!(self, ColumnType::String | ColumnType::Json)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Boolean => write!(f, "boolean"),
            ColumnType::Long => write!(f, "long"),
            ColumnType::Double => write!(f, "double"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Timestamp => write!(f, "timestamp"),
            ColumnType::Json => write!(f, "json"),
        }
    }
}

/// A column in a schema: position, name, and storage type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Position of the column, which is also its slot index
    ordinal: usize,

    /// Name of the column
    name: String,

    /// Storage type of the column
    column_type: ColumnType,
}

impl Column {
    /// Create a new column
    pub fn new(ordinal: usize, name: &str, column_type: ColumnType) -> Self {
        Self {
            ordinal,
            name: name.to_string(),
            column_type,
        }
    }

    /// Get the ordinal position of this column
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Get the name of this column
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the storage type of this column
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.ordinal, self.name, self.column_type)
    }
}

/// An ordered, immutable list of columns describing one record shape
///
/// A schema is built once by the pipeline configuration and shared read-only
/// (via `Arc`) by every stage and every page encoded against it. Slot
/// offsets and the per-record fixed width are computed at construction so
/// page encode/decode never re-derives them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Columns in ordinal order
    columns: Vec<Column>,

    /// Column indices by name for lookup
    column_indices: HashMap<String, usize>,

    /// Byte offset of each column's slot within a record's slot row
    slot_offsets: Vec<usize>,

    /// Total fixed width of one record's slot row
    row_width: usize,
}

impl Schema {
    /// Create a new schema from columns whose ordinals must match their
    /// positions `0..n-1` and whose names must be unique
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut column_indices = HashMap::with_capacity(columns.len());
        let mut slot_offsets = Vec::with_capacity(columns.len());
        let mut row_width = 0;

        for (i, column) in columns.iter().enumerate() {
            if column.ordinal != i {
                return Err(Error::InvalidArgument(format!(
                    "column '{}' has ordinal {}, expected {}",
                    column.name, column.ordinal, i
                )));
            }
            if column_indices.insert(column.name.clone(), i).is_some() {
                return Err(Error::InvalidArgument(format!(
                    "duplicate column name '{}'",
                    column.name
                )));
            }
            slot_offsets.push(row_width);
            row_width += column.column_type.slot_width();
        }

        Ok(Self {
            columns,
            column_indices,
            slot_offsets,
            row_width,
        })
    }

    /// Get all columns in this schema
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Get a column by ordinal
    pub fn column(&self, ordinal: usize) -> Result<&Column> {
        self.columns.get(ordinal).ok_or(Error::IndexOutOfBounds)
    }

    /// Get a column by name
    pub fn column_by_name(&self, name: &str) -> Result<&Column> {
        let index = self.index_of(name)?;
        Ok(&self.columns[index])
    }

    /// Get the ordinal of a column by name
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.column_indices
            .get(name)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("column not found: {}", name)))
    }

    /// Get the number of columns in this schema
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if this schema has no columns
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Get the total fixed width of one record's slot row
    pub fn row_width(&self) -> usize {
        self.row_width
    }

    /// Get the byte offset of a column's slot within a record's slot row
    pub fn slot_offset(&self, ordinal: usize) -> Result<usize> {
        self.slot_offsets
            .get(ordinal)
            .copied()
            .ok_or(Error::IndexOutOfBounds)
    }

    /// Get the number of null-map bytes one record occupies (one bit per
    /// column, rounded up to whole bytes)
    pub fn null_map_width(&self) -> usize {
        (self.columns.len() + 7) / 8
    }

    /// Create a schema with only the specified columns, re-numbered `0..k`
    pub fn project(&self, ordinals: &[usize]) -> Result<Self> {
        let columns = ordinals
            .iter()
            .enumerate()
            .map(|(i, &ordinal)| {
                let column = self.column(ordinal)?;
                Ok(Column::new(i, column.name(), column.column_type()))
            })
            .collect::<Result<Vec<_>>>()?;

        Self::new(columns)
    }

    /// Create a schema with only the specified column names
    pub fn project_by_names(&self, names: &[&str]) -> Result<Self> {
        let ordinals = names
            .iter()
            .map(|&name| self.index_of(name))
            .collect::<Result<Vec<_>>>()?;
        self.project(&ordinals)
    }

    /// Serialize this schema to a binary format
    pub fn serialize(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(Error::Serialization)
    }

    /// Deserialize a schema from a binary format
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        bincode::deserialize(data).map_err(Error::Serialization)
    }
}

impl Serialize for Schema {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        self.columns.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let columns = Vec::<Column>::deserialize(deserializer)?;
        Schema::new(columns).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Schema: {} columns", self.columns.len())?;
        for column in &self.columns {
            writeln!(f, "  {}", column)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn three_columns() -> Vec<Column> {
        vec![
            Column::new(0, "id", ColumnType::Long),
            Column::new(1, "name", ColumnType::String),
            Column::new(2, "active", ColumnType::Boolean),
        ]
    }

    #[test_case(ColumnType::Boolean, 1)]
    #[test_case(ColumnType::Long, 8)]
    #[test_case(ColumnType::Double, 8)]
    #[test_case(ColumnType::Timestamp, 12)]
    #[test_case(ColumnType::String, 8)]
    #[test_case(ColumnType::Json, 8)]
    fn slot_widths(column_type: ColumnType, width: usize) {
        assert_eq!(column_type.slot_width(), width);
    }

    #[test]
    fn slot_offsets_are_prefix_sums() {
        let schema = Schema::new(three_columns()).unwrap();

        assert_eq!(schema.row_width(), 8 + 8 + 1);
        assert_eq!(schema.slot_offset(0).unwrap(), 0);
        assert_eq!(schema.slot_offset(1).unwrap(), 8);
        assert_eq!(schema.slot_offset(2).unwrap(), 16);
        assert!(schema.slot_offset(3).is_err());
    }

    #[test]
    fn null_map_width_rounds_up() {
        let schema = Schema::new(three_columns()).unwrap();
        assert_eq!(schema.null_map_width(), 1);

        let wide = Schema::new(
            (0..9)
                .map(|i| Column::new(i, &format!("c{}", i), ColumnType::Long))
                .collect(),
        )
        .unwrap();
        assert_eq!(wide.null_map_width(), 2);
    }

    #[test]
    fn rejects_misnumbered_ordinals() {
        let result = Schema::new(vec![
            Column::new(0, "a", ColumnType::Long),
            Column::new(2, "b", ColumnType::Long),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = Schema::new(vec![
            Column::new(0, "a", ColumnType::Long),
            Column::new(1, "a", ColumnType::Double),
        ]);
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn lookup_by_name() {
        let schema = Schema::new(three_columns()).unwrap();
        assert_eq!(schema.index_of("name").unwrap(), 1);
        assert_eq!(
            schema.column_by_name("active").unwrap().column_type(),
            ColumnType::Boolean
        );
        assert!(schema.index_of("missing").is_err());
    }

    #[test]
    fn projection_renumbers_ordinals() {
        let schema = Schema::new(three_columns()).unwrap();
        let projected = schema.project_by_names(&["active", "id"]).unwrap();

        assert_eq!(projected.len(), 2);
        assert_eq!(projected.column(0).unwrap().name(), "active");
        assert_eq!(projected.column(1).unwrap().name(), "id");
        assert_eq!(projected.column(1).unwrap().ordinal(), 1);
        assert_eq!(projected.row_width(), 1 + 8);
    }

    #[test]
    fn binary_round_trip_rebuilds_offsets() {
        let schema = Schema::new(three_columns()).unwrap();
        let bytes = schema.serialize().unwrap();
        let restored = Schema::deserialize(&bytes).unwrap();

        assert_eq!(restored, schema);
        assert_eq!(restored.slot_offset(2).unwrap(), 16);
        assert_eq!(restored.index_of("name").unwrap(), 1);
    }

    #[test]
    fn empty_schema_is_valid() {
        let schema = Schema::new(Vec::new()).unwrap();
        assert!(schema.is_empty());
        assert_eq!(schema.row_width(), 0);
        assert_eq!(schema.null_map_width(), 0);
    }
}
