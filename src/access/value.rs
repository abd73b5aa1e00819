use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

/// Maximum number of bytes a `Text` value can hold.
pub const STRING_LEN: usize = 128;

/// Data types supported by the database. Every type has a fixed on-disk
/// width so that a page can be split into equal slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Text,
}

impl DataType {
    /// Number of bytes a value of this type occupies in a slot.
    pub fn width(&self) -> usize {
        match self {
            DataType::Int32 => 4,
            // length prefix followed by the zero-padded bytes
            DataType::Text => 4 + STRING_LEN,
        }
    }

    /// Parses a value of this type from its fixed-width encoding.
    pub fn parse<R: Read>(&self, reader: &mut R) -> io::Result<Value> {
        match self {
            DataType::Int32 => Ok(Value::Int32(reader.read_i32::<BigEndian>()?)),
            DataType::Text => {
                let len = reader.read_u32::<BigEndian>()? as usize;
                if len > STRING_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidData,
                        format!("string length {} exceeds {}", len, STRING_LEN),
                    ));
                }
                let mut buf = [0u8; STRING_LEN];
                reader.read_exact(&mut buf)?;
                let s = String::from_utf8(buf[..len].to_vec())
                    .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
                Ok(Value::Text(s))
            }
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Int32 => write!(f, "int"),
            DataType::Text => write!(f, "text"),
        }
    }
}

/// Values that can be stored in the database
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    Int32(i32),
    Text(String),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::Text(_) => DataType::Text,
        }
    }

    /// Check if this value can be stored in a column of the given type
    pub fn is_compatible_with(&self, data_type: DataType) -> bool {
        match (self, data_type) {
            (Value::Int32(_), DataType::Int32) => true,
            (Value::Text(s), DataType::Text) => s.len() <= STRING_LEN,
            _ => false,
        }
    }

    /// Writes the fixed-width encoding of this value.
    pub fn serialize<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        match self {
            Value::Int32(i) => writer.write_i32::<BigEndian>(*i),
            Value::Text(s) => {
                let bytes = s.as_bytes();
                if bytes.len() > STRING_LEN {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("string of {} bytes exceeds {}", bytes.len(), STRING_LEN),
                    ));
                }
                writer.write_u32::<BigEndian>(bytes.len() as u32)?;
                writer.write_all(bytes)?;
                writer.write_all(&[0u8; STRING_LEN][..STRING_LEN - bytes.len()])
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(i) => write!(f, "{}", i),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}
