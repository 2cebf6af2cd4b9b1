use serde::{Deserialize, Serialize};

use super::PlyError;

/// Body encoding of a PLY file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlyEncoding {
    /// `format binary_little_endian 1.0`
    #[default]
    BinaryLittleEndian,
    /// `format ascii 1.0`
    Ascii,
}

impl PlyEncoding {
    /// The keyword used on the `format` header line.
    pub fn keyword(&self) -> &'static str {
        match self {
            PlyEncoding::BinaryLittleEndian => "binary_little_endian",
            PlyEncoding::Ascii => "ascii",
        }
    }

    pub(crate) fn from_keyword(keyword: &str) -> Result<Self, PlyError> {
        match keyword {
            "binary_little_endian" => Ok(PlyEncoding::BinaryLittleEndian),
            "ascii" => Ok(PlyEncoding::Ascii),
            other => Err(PlyError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Scalar type of a PLY vertex property.
#[derive(Debug, PartialEq, Clone, Copy)]
pub enum PlyDataType {
    /// `float` / `float32`
    Float32,
    /// `double` / `float64`
    Float64,
    /// `char` / `int8`
    Int8,
    /// `uchar` / `uint8`
    UInt8,
    /// `short` / `int16`
    Int16,
    /// `ushort` / `uint16`
    UInt16,
    /// `int` / `int32`
    Int32,
    /// `uint` / `uint32`
    UInt32,
}

impl PlyDataType {
    /// Size of one value in bytes.
    pub fn size(&self) -> usize {
        match self {
            PlyDataType::Float32 | PlyDataType::Int32 | PlyDataType::UInt32 => 4,
            PlyDataType::Float64 => 8,
            PlyDataType::Int16 | PlyDataType::UInt16 => 2,
            PlyDataType::Int8 | PlyDataType::UInt8 => 1,
        }
    }

    pub(crate) fn parse(type_str: &str) -> Result<Self, PlyError> {
        match type_str {
            "float" | "float32" => Ok(PlyDataType::Float32),
            "double" | "float64" => Ok(PlyDataType::Float64),
            "char" | "int8" => Ok(PlyDataType::Int8),
            "uchar" | "uint8" => Ok(PlyDataType::UInt8),
            "short" | "int16" => Ok(PlyDataType::Int16),
            "ushort" | "uint16" => Ok(PlyDataType::UInt16),
            "int" | "int32" => Ok(PlyDataType::Int32),
            "uint" | "uint32" => Ok(PlyDataType::UInt32),
            other => Err(PlyError::UnsupportedFormat(format!("property type {other}"))),
        }
    }

    /// Decode one little-endian value as `f64`.
    ///
    /// PRECONDITION: `bytes.len() == self.size()`.
    pub(crate) fn read_le(&self, bytes: &[u8]) -> Result<f64, PlyError> {
        let err = || PlyError::Malformed("truncated vertex record".to_string());
        let value = match self {
            PlyDataType::Float32 => f32::from_le_bytes(bytes.try_into().map_err(|_| err())?) as f64,
            PlyDataType::Float64 => f64::from_le_bytes(bytes.try_into().map_err(|_| err())?),
            PlyDataType::Int8 => *bytes.first().ok_or_else(err)? as i8 as f64,
            PlyDataType::UInt8 => *bytes.first().ok_or_else(err)? as f64,
            PlyDataType::Int16 => i16::from_le_bytes(bytes.try_into().map_err(|_| err())?) as f64,
            PlyDataType::UInt16 => u16::from_le_bytes(bytes.try_into().map_err(|_| err())?) as f64,
            PlyDataType::Int32 => i32::from_le_bytes(bytes.try_into().map_err(|_| err())?) as f64,
            PlyDataType::UInt32 => u32::from_le_bytes(bytes.try_into().map_err(|_| err())?) as f64,
        };
        Ok(value)
    }
}

/// A vertex property declared in the PLY header.
#[derive(Debug, PartialEq, Clone)]
pub struct PlyPropertyDefinition {
    /// Property name, e.g. `x`.
    pub name: String,
    /// Scalar type.
    pub data_type: PlyDataType,
}

/// The vertex record written by [`super::write_ply`]: three little-endian doubles.
#[derive(Debug, Clone, Copy, PartialEq, bincode::Encode, bincode::Decode)]
pub struct XyzProperty {
    /// x coordinate
    pub x: f64,
    /// y coordinate
    pub y: f64,
    /// z coordinate
    pub z: f64,
}

impl XyzProperty {
    /// Size of one encoded record in bytes.
    pub const SIZE: usize = 3 * std::mem::size_of::<f64>();

    /// The header property lines describing this record.
    pub fn definitions() -> Vec<PlyPropertyDefinition> {
        ["x", "y", "z"]
            .into_iter()
            .map(|name| PlyPropertyDefinition {
                name: name.to_string(),
                data_type: PlyDataType::Float64,
            })
            .collect()
    }

    /// Convert to a point.
    pub fn to_point(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

impl From<&[f64; 3]> for XyzProperty {
    fn from(p: &[f64; 3]) -> Self {
        Self {
            x: p[0],
            y: p[1],
            z: p[2],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_parsing() -> Result<(), PlyError> {
        assert_eq!(PlyDataType::parse("float")?, PlyDataType::Float32);
        assert_eq!(PlyDataType::parse("uchar")?, PlyDataType::UInt8);
        assert_eq!(PlyDataType::parse("double")?, PlyDataType::Float64);
        assert!(PlyDataType::parse("invalid").is_err());
        Ok(())
    }

    #[test]
    fn test_read_le() -> Result<(), PlyError> {
        assert_eq!(PlyDataType::Float32.read_le(&1.5f32.to_le_bytes())?, 1.5);
        assert_eq!(PlyDataType::Int16.read_le(&(-3i16).to_le_bytes())?, -3.0);
        assert!(PlyDataType::Float64.read_le(&[0u8; 4]).is_err());
        Ok(())
    }

    #[test]
    fn test_xyz_encoding_is_plain_little_endian() -> Result<(), PlyError> {
        let prop = XyzProperty::from(&[1.0, -2.0, 0.5]);
        let bytes = bincode::encode_to_vec(prop, bincode::config::standard())?;
        assert_eq!(bytes.len(), XyzProperty::SIZE);
        assert_eq!(&bytes[8..16], &(-2.0f64).to_le_bytes());
        Ok(())
    }
}
