//! N-dimensional numeric arrays as carried over the wire.
//!
//! Only what transport needs lives here: shape bookkeeping, dtype casts for
//! the volume renderer, and little-endian (de)serialization of the element
//! buffer. Array math is the renderer's business.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

/// Element type of a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl DType {
    /// Bytes per element.
    pub fn item_size(self) -> usize {
        match self {
            Self::Bool | Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Int64 | Self::Float64 | Self::Complex64 => 8,
            Self::Complex128 => 16,
        }
    }

    /// Stable one-byte code used in `.dsr` headers.
    pub fn code(self) -> u8 {
        match self {
            Self::Bool => 0,
            Self::Int8 => 1,
            Self::Int16 => 2,
            Self::Int32 => 3,
            Self::Int64 => 4,
            Self::Float32 => 5,
            Self::Float64 => 6,
            Self::Complex64 => 7,
            Self::Complex128 => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => Self::Bool,
            1 => Self::Int8,
            2 => Self::Int16,
            3 => Self::Int32,
            4 => Self::Int64,
            5 => Self::Float32,
            6 => Self::Float64,
            7 => Self::Complex64,
            8 => Self::Complex128,
            _ => return None,
        })
    }
}

/// Typed element buffer. Complex values are stored as `[re, im]` pairs.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    Int8(Vec<i8>),
    Int16(Vec<i16>),
    Int32(Vec<i32>),
    Int64(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    Complex64(Vec<[f32; 2]>),
    Complex128(Vec<[f64; 2]>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            Self::Bool(_) => DType::Bool,
            Self::Int8(_) => DType::Int8,
            Self::Int16(_) => DType::Int16,
            Self::Int32(_) => DType::Int32,
            Self::Int64(_) => DType::Int64,
            Self::Float32(_) => DType::Float32,
            Self::Float64(_) => DType::Float64,
            Self::Complex64(_) => DType::Complex64,
            Self::Complex128(_) => DType::Complex128,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Int8(v) => v.len(),
            Self::Int16(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Int64(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Complex64(v) => v.len(),
            Self::Complex128(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element buffer as little-endian bytes.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len() * self.dtype().item_size());
        match self {
            Self::Bool(v) => v.iter().for_each(|&b| out.put_u8(b as u8)),
            Self::Int8(v) => v.iter().for_each(|&x| out.put_i8(x)),
            Self::Int16(v) => v.iter().for_each(|&x| out.put_i16_le(x)),
            Self::Int32(v) => v.iter().for_each(|&x| out.put_i32_le(x)),
            Self::Int64(v) => v.iter().for_each(|&x| out.put_i64_le(x)),
            Self::Float32(v) => v.iter().for_each(|&x| out.put_f32_le(x)),
            Self::Float64(v) => v.iter().for_each(|&x| out.put_f64_le(x)),
            Self::Complex64(v) => v.iter().for_each(|&[re, im]| {
                out.put_f32_le(re);
                out.put_f32_le(im);
            }),
            Self::Complex128(v) => v.iter().for_each(|&[re, im]| {
                out.put_f64_le(re);
                out.put_f64_le(im);
            }),
        }
        out
    }

    /// Parse `count` little-endian elements of `dtype` from `buf`.
    pub fn from_le_bytes(dtype: DType, count: usize, mut buf: &[u8]) -> Result<Self, ArrayError> {
        let expected = count
            .checked_mul(dtype.item_size())
            .ok_or(ArrayError::TooLarge)?;
        if buf.len() != expected {
            return Err(ArrayError::BufferSize {
                expected,
                actual: buf.len(),
            });
        }
        let data = match dtype {
            DType::Bool => Self::Bool((0..count).map(|_| buf.get_u8() != 0).collect()),
            DType::Int8 => Self::Int8((0..count).map(|_| buf.get_i8()).collect()),
            DType::Int16 => Self::Int16((0..count).map(|_| buf.get_i16_le()).collect()),
            DType::Int32 => Self::Int32((0..count).map(|_| buf.get_i32_le()).collect()),
            DType::Int64 => Self::Int64((0..count).map(|_| buf.get_i64_le()).collect()),
            DType::Float32 => Self::Float32((0..count).map(|_| buf.get_f32_le()).collect()),
            DType::Float64 => Self::Float64((0..count).map(|_| buf.get_f64_le()).collect()),
            DType::Complex64 => Self::Complex64(
                (0..count)
                    .map(|_| [buf.get_f32_le(), buf.get_f32_le()])
                    .collect(),
            ),
            DType::Complex128 => Self::Complex128(
                (0..count)
                    .map(|_| [buf.get_f64_le(), buf.get_f64_le()])
                    .collect(),
            ),
        };
        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArrayError {
    #[error("shape {shape:?} holds {expected} elements but buffer has {actual}")]
    ShapeMismatch {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("buffer is {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    #[error("array is too large to address")]
    TooLarge,

    #[error("invalid base64 array data: {0}")]
    Base64(String),
}

/// An N-dimensional array: a shape plus a flat, row-major element buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "WireArray", try_from = "WireArray")]
pub struct Dataset {
    shape: Vec<usize>,
    data: ArrayData,
}

impl Dataset {
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self, ArrayError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or(ArrayError::TooLarge)?;
        if expected != data.len() {
            return Err(ArrayError::ShapeMismatch {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// One-dimensional dataset over the whole buffer.
    pub fn from_data(data: ArrayData) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// `[0, 1, ..., n-1]` as int32, the implicit index used for stacks.
    pub fn arange(n: usize) -> Self {
        Self::from_data(ArrayData::Int32((0..n as i32).collect()))
    }

    /// Zero-dimensional int32 array.
    pub fn scalar_i32(value: i32) -> Self {
        Self {
            shape: Vec::new(),
            data: ArrayData::Int32(vec![value]),
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// Length along the first axis. Zero-dimensional arrays count as one.
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of elements.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Payload size in bytes.
    pub fn nbytes(&self) -> usize {
        self.size() * self.dtype().item_size()
    }

    /// Cast to one of the element types the volume renderer accepts.
    ///
    /// bool becomes int8, int64 becomes int32, and float64 or either complex
    /// type becomes float32 (complex keeps the real part). Other types pass
    /// through unchanged.
    pub fn normalized_for_volume(self) -> Self {
        let data = match self.data {
            ArrayData::Bool(v) => ArrayData::Int8(v.into_iter().map(|b| b as i8).collect()),
            ArrayData::Int64(v) => ArrayData::Int32(v.into_iter().map(|x| x as i32).collect()),
            ArrayData::Float64(v) => ArrayData::Float32(v.into_iter().map(|x| x as f32).collect()),
            ArrayData::Complex64(v) => ArrayData::Float32(v.into_iter().map(|[re, _]| re).collect()),
            ArrayData::Complex128(v) => {
                ArrayData::Float32(v.into_iter().map(|[re, _]| re as f32).collect())
            }
            other => other,
        };
        Self {
            shape: self.shape,
            data,
        }
    }
}

macro_rules! dataset_from_vec {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<Vec<$ty>> for Dataset {
                fn from(v: Vec<$ty>) -> Self {
                    Self::from_data(ArrayData::$variant(v))
                }
            }
        )*
    };
}

dataset_from_vec! {
    bool => Bool,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    f32 => Float32,
    f64 => Float64,
}

/// JSON shape of a dataset: dtype, shape and base64 little-endian payload.
#[derive(Serialize, Deserialize)]
struct WireArray {
    dtype: DType,
    shape: Vec<usize>,
    data: String,
}

impl From<Dataset> for WireArray {
    fn from(ds: Dataset) -> Self {
        Self {
            dtype: ds.dtype(),
            data: BASE64.encode(ds.data.to_le_bytes()),
            shape: ds.shape,
        }
    }
}

impl TryFrom<WireArray> for Dataset {
    type Error = ArrayError;

    fn try_from(wire: WireArray) -> Result<Self, Self::Error> {
        let bytes = BASE64
            .decode(wire.data.as_bytes())
            .map_err(|e| ArrayError::Base64(e.to_string()))?;
        let count = bytes.len() / wire.dtype.item_size();
        let data = ArrayData::from_le_bytes(wire.dtype, count, &bytes)?;
        Dataset::new(wire.shape, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_shape_that_does_not_cover_buffer() {
        let err = Dataset::new(vec![2, 3], ArrayData::Float64(vec![0.0; 5])).unwrap_err();
        assert!(matches!(
            err,
            ArrayError::ShapeMismatch {
                expected: 6,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn len_is_first_axis() {
        let ds = Dataset::new(vec![4, 2], ArrayData::Int32(vec![0; 8])).unwrap();
        assert_eq!(ds.len(), 4);
        assert_eq!(ds.size(), 8);
        assert_eq!(ds.nbytes(), 32);
    }

    #[test]
    fn arange_counts_from_zero() {
        let ds = Dataset::arange(4);
        assert_eq!(ds.data(), &ArrayData::Int32(vec![0, 1, 2, 3]));
    }

    #[test]
    fn volume_normalization_narrows_types() {
        let b = Dataset::from(vec![true, false]).normalized_for_volume();
        assert_eq!(b.data(), &ArrayData::Int8(vec![1, 0]));

        let l = Dataset::from(vec![7i64, -3]).normalized_for_volume();
        assert_eq!(l.data(), &ArrayData::Int32(vec![7, -3]));

        let d = Dataset::from(vec![1.5f64]).normalized_for_volume();
        assert_eq!(d.data(), &ArrayData::Float32(vec![1.5]));

        let c = Dataset::from_data(ArrayData::Complex128(vec![[2.0, 9.0]])).normalized_for_volume();
        assert_eq!(c.data(), &ArrayData::Float32(vec![2.0]));

        let i = Dataset::from(vec![5i16]).normalized_for_volume();
        assert_eq!(i.dtype(), DType::Int16);
    }

    #[test]
    fn le_bytes_rejects_truncated_buffer() {
        let err = ArrayData::from_le_bytes(DType::Int32, 2, &[0u8; 7]).unwrap_err();
        assert_eq!(
            err,
            ArrayError::BufferSize {
                expected: 8,
                actual: 7
            }
        );
    }

    #[test]
    fn dataset_serializes_as_base64_payload() {
        let ds = Dataset::from(vec![1i8, 2, 3]);
        insta::assert_json_snapshot!(ds, @r#"
        {
          "dtype": "int8",
          "shape": [
            3
          ],
          "data": "AQID"
        }
        "#);
    }

    #[test]
    fn complex_dataset_survives_json() {
        let ds = Dataset::new(
            vec![1, 2],
            ArrayData::Complex64(vec![[1.0, -1.0], [0.5, 2.0]]),
        )
        .unwrap();
        let json = serde_json::to_string(&ds).unwrap();
        let back: Dataset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ds);
    }
}
