//! Row layout of a table.

use crate::access::value::DataType;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// Ordered list of typed columns. Two schemas are equal when their column
/// types match position by position; column names are informational.
#[derive(Debug, Clone)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    /// Builds a schema with generated column names `c0, c1, ...`.
    pub fn from_types(types: &[DataType]) -> Self {
        let columns = types
            .iter()
            .enumerate()
            .map(|(i, data_type)| Column::new(format!("c{}", i), *data_type))
            .collect();
        Self { columns }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn data_type(&self, index: usize) -> Option<DataType> {
        self.columns.get(index).map(|c| c.data_type)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Bytes one row occupies on a page.
    pub fn row_width(&self) -> usize {
        self.columns.iter().map(|c| c.data_type.width()).sum()
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.columns.len() == other.columns.len()
            && self
                .columns
                .iter()
                .zip(other.columns.iter())
                .all(|(a, b)| a.data_type == b.data_type)
    }
}

impl Eq for Schema {}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} {}", c.name, c.data_type))
            .collect();
        write!(f, "({})", parts.join(", "))
    }
}

/// Parses `"id:int,name:text"` or the short form `"int,text"`.
impl FromStr for Schema {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut columns = Vec::new();
        for (i, part) in s.split(',').map(str::trim).enumerate() {
            if part.is_empty() {
                return Err(format!("empty column definition at position {}", i));
            }
            let (name, type_name) = match part.split_once(':') {
                Some((name, type_name)) => (name.trim().to_string(), type_name.trim()),
                None => (format!("c{}", i), part),
            };
            let data_type = match type_name.to_ascii_lowercase().as_str() {
                "int" | "int32" => DataType::Int32,
                "text" | "string" => DataType::Text,
                other => return Err(format!("unknown column type '{}'", other)),
            };
            columns.push(Column::new(name, data_type));
        }
        Ok(Self { columns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_width() {
        let schema = Schema::from_types(&[DataType::Int32, DataType::Text, DataType::Int32]);
        assert_eq!(schema.row_width(), 4 + 132 + 4);
        assert_eq!(schema.num_columns(), 3);
    }

    #[test]
    fn test_equality_ignores_names() {
        let a = Schema::new(vec![Column::new("id", DataType::Int32)]);
        let b = Schema::new(vec![Column::new("key", DataType::Int32)]);
        let c = Schema::new(vec![Column::new("id", DataType::Text)]);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Schema::from_types(&[DataType::Int32, DataType::Int32]));
    }

    #[test]
    fn test_parse() {
        let schema: Schema = "id:int, name:text".parse().unwrap();
        assert_eq!(schema.column_index("name"), Some(1));
        assert_eq!(schema.data_type(0), Some(DataType::Int32));

        let short: Schema = "int,int".parse().unwrap();
        assert_eq!(short.columns()[1].name, "c1");
        assert_eq!(short.row_width(), 8);

        assert!("int,,int".parse::<Schema>().is_err());
        assert!("float".parse::<Schema>().is_err());
    }

    #[test]
    fn test_display() {
        let schema: Schema = "id:int,name:text".parse().unwrap();
        assert_eq!(schema.to_string(), "(id int, name text)");
    }
}
