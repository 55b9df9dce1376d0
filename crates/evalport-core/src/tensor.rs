use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use smallvec::SmallVec;

use crate::{InputKind, TensorError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DType {
    F32,
    F64,
    I64,
    I32,
    U8,
}

impl DType {
    pub fn byte_size(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::I64 => 8,
            DType::I32 => 4,
            DType::U8 => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DType::F32 => "f32",
            DType::F64 => "f64",
            DType::I64 => "i64",
            DType::I32 => "i32",
            DType::U8 => "u8",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native element types that can back a tensor. Values are stored little-endian.
pub trait Element: Copy + fmt::Debug + 'static {
    const DTYPE: DType;

    fn put(self, buf: &mut BytesMut);
    fn read(chunk: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:ident, $put:ident) => {
        impl Element for $ty {
            const DTYPE: DType = DType::$dtype;

            fn put(self, buf: &mut BytesMut) {
                buf.$put(self);
            }

            fn read(chunk: &[u8]) -> Self {
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(chunk);
                <$ty>::from_le_bytes(raw)
            }
        }
    };
}

impl_element!(f32, F32, put_f32_le);
impl_element!(f64, F64, put_f64_le);
impl_element!(i64, I64, put_i64_le);
impl_element!(i32, I32, put_i32_le);
impl_element!(u8, U8, put_u8);

fn encode<T: Element>(data: &[T]) -> Bytes {
    let mut buf = BytesMut::with_capacity(data.len() * T::DTYPE.byte_size());
    for v in data {
        v.put(&mut buf);
    }
    buf.freeze()
}

fn decode<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.byte_size())
        .map(T::read)
        .collect()
}

fn render_values(dtype: DType, bytes: &[u8], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match dtype {
        DType::F32 => write!(f, "{:?}", decode::<f32>(bytes)),
        DType::F64 => write!(f, "{:?}", decode::<f64>(bytes)),
        DType::I64 => write!(f, "{:?}", decode::<i64>(bytes)),
        DType::I32 => write!(f, "{:?}", decode::<i32>(bytes)),
        DType::U8 => write!(f, "{:?}", decode::<u8>(bytes)),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; 6]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn scalar() -> Self {
        Self(SmallVec::new())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Size of the batch dimension. A scalar counts as a single row.
    pub fn rows(&self) -> usize {
        self.0.first().copied().unwrap_or(1)
    }

    /// Every dimension after the batch dimension.
    pub fn trailing(&self) -> &[usize] {
        self.0.get(1..).unwrap_or(&[])
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.0.as_slice())
    }
}

/// A dense CPU tensor.
#[derive(Clone, PartialEq)]
pub struct Tensor {
    pub dtype: DType,
    pub shape: Shape,
    pub bytes: Bytes,
}

impl Tensor {
    /// Wraps raw little-endian data. The length must match the shape exactly.
    pub fn from_bytes(dtype: DType, shape: Shape, bytes: Bytes) -> Result<Self, TensorError> {
        let expected = shape.numel() * dtype.byte_size();
        if bytes.len() != expected {
            return Err(TensorError::ByteLength {
                expected,
                got: bytes.len(),
            });
        }
        Ok(Self::encoded(dtype, shape, bytes))
    }

    fn encoded(dtype: DType, shape: Shape, bytes: Bytes) -> Self {
        Self {
            dtype,
            shape,
            bytes,
        }
    }

    pub fn new<T: Element>(shape: &[usize], data: &[T]) -> Result<Self, TensorError> {
        let shape = Shape::from_slice(shape);
        if shape.numel() != data.len() {
            return Err(TensorError::LengthMismatch {
                expected: shape.numel(),
                got: data.len(),
            });
        }
        Ok(Self::encoded(T::DTYPE, shape, encode(data)))
    }

    /// A rank-1 tensor holding `data`, one row per element.
    pub fn vector<T: Element>(data: &[T]) -> Self {
        Self::encoded(T::DTYPE, Shape::from_slice(&[data.len()]), encode(data))
    }

    pub fn scalar<T: Element>(value: T) -> Self {
        Self::encoded(T::DTYPE, Shape::scalar(), encode(&[value]))
    }

    pub fn rows(&self) -> usize {
        self.shape.rows()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        if self.dtype != T::DTYPE {
            return Err(TensorError::DTypeMismatch {
                expected: T::DTYPE,
                got: self.dtype,
            });
        }
        Ok(decode(&self.bytes))
    }

    /// Reads any numeric dtype widened to `f64`.
    pub fn to_f64_lossy(&self) -> Vec<f64> {
        match self.dtype {
            DType::F32 => decode::<f32>(&self.bytes).into_iter().map(f64::from).collect(),
            DType::F64 => decode::<f64>(&self.bytes),
            DType::I64 => decode::<i64>(&self.bytes)
                .into_iter()
                .map(|v| v as f64)
                .collect(),
            DType::I32 => decode::<i32>(&self.bytes).into_iter().map(f64::from).collect(),
            DType::U8 => decode::<u8>(&self.bytes).into_iter().map(f64::from).collect(),
        }
    }

    /// Concatenates along the batch dimension. Trailing dimensions must agree.
    pub fn concat(parts: &[&Tensor]) -> Result<Tensor, TensorError> {
        let first = parts.first().ok_or(TensorError::Empty)?;
        let mut rows = 0;
        let mut buf = BytesMut::with_capacity(parts.iter().map(|p| p.bytes.len()).sum());
        for part in parts {
            if part.dtype != first.dtype {
                return Err(TensorError::DTypeMismatch {
                    expected: first.dtype,
                    got: part.dtype,
                });
            }
            if part.shape.trailing() != first.shape.trailing() {
                return Err(TensorError::ShapeMismatch {
                    expected: first.shape.clone(),
                    got: part.shape.clone(),
                });
            }
            rows += part.rows();
            buf.extend_from_slice(&part.bytes);
        }

        let mut shape = Shape::from_slice(&[rows]);
        shape.0.extend_from_slice(first.shape.trailing());
        Tensor::from_bytes(first.dtype, shape, buf.freeze())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor<{}>{} ", self.dtype, self.shape)?;
        render_values(self.dtype, &self.bytes, f)
    }
}

/// Coordinate-list sparse tensor: one index row per stored value.
#[derive(Clone, PartialEq)]
pub struct SparseTensor {
    pub dtype: DType,
    pub indices: Vec<SmallVec<[usize; 4]>>,
    pub values: Bytes,
    pub dense_shape: Shape,
}

impl SparseTensor {
    pub fn new<T: Element, I: AsRef<[usize]>>(
        indices: &[I],
        values: &[T],
        dense_shape: &[usize],
    ) -> Result<Self, TensorError> {
        if dense_shape.is_empty() {
            return Err(TensorError::SparseRank);
        }
        if indices.len() != values.len() {
            return Err(TensorError::LengthMismatch {
                expected: indices.len(),
                got: values.len(),
            });
        }
        let mut rows = Vec::with_capacity(indices.len());
        for index in indices {
            let index = index.as_ref();
            if index.len() != dense_shape.len() {
                return Err(TensorError::IndexRank {
                    expected: dense_shape.len(),
                    got: index.len(),
                });
            }
            rows.push(index.iter().copied().collect());
        }
        Ok(Self {
            dtype: T::DTYPE,
            indices: rows,
            values: encode(values),
            dense_shape: Shape::from_slice(dense_shape),
        })
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn rows(&self) -> usize {
        self.dense_shape.rows()
    }

    pub fn values_vec<T: Element>(&self) -> Result<Vec<T>, TensorError> {
        if self.dtype != T::DTYPE {
            return Err(TensorError::DTypeMismatch {
                expected: T::DTYPE,
                got: self.dtype,
            });
        }
        Ok(decode(&self.values))
    }

    /// Stacks sparse tensors along the batch dimension. Each part's indices are
    /// shifted by the rows of the parts before it; the remaining dense dims take
    /// the maximum across parts.
    pub fn concat(parts: &[&SparseTensor]) -> Result<SparseTensor, TensorError> {
        let first = parts.first().ok_or(TensorError::Empty)?;
        let rank = first.dense_shape.rank();
        if rank == 0 {
            return Err(TensorError::SparseRank);
        }
        let mut dims: SmallVec<[usize; 6]> = SmallVec::from_elem(0, rank);
        let mut indices = Vec::with_capacity(parts.iter().map(|p| p.nnz()).sum());
        let mut values = BytesMut::with_capacity(parts.iter().map(|p| p.values.len()).sum());

        for part in parts {
            if part.dtype != first.dtype {
                return Err(TensorError::DTypeMismatch {
                    expected: first.dtype,
                    got: part.dtype,
                });
            }
            if part.dense_shape.rank() != rank {
                return Err(TensorError::ShapeMismatch {
                    expected: first.dense_shape.clone(),
                    got: part.dense_shape.clone(),
                });
            }
            let offset = dims[0];
            for index in &part.indices {
                let mut shifted = index.clone();
                shifted[0] += offset;
                indices.push(shifted);
            }
            values.extend_from_slice(&part.values);
            dims[0] += part.dense_shape.0[0];
            for (d, extent) in part.dense_shape.0.iter().enumerate().skip(1) {
                dims[d] = dims[d].max(*extent);
            }
        }

        Ok(SparseTensor {
            dtype: first.dtype,
            indices,
            values: values.freeze(),
            dense_shape: Shape(dims),
        })
    }
}

impl fmt::Debug for SparseTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let indices: Vec<&[usize]> = self.indices.iter().map(|i| i.as_slice()).collect();
        write!(
            f,
            "SparseTensor<{}>{} indices={:?} values=",
            self.dtype, self.dense_shape, indices
        )?;
        render_values(self.dtype, &self.values, f)
    }
}

/// A value fed into (or read back from) an input slot.
#[derive(Clone, PartialEq)]
pub enum TensorValue {
    Dense(Tensor),
    Sparse(SparseTensor),
}

impl TensorValue {
    pub fn kind(&self) -> InputKind {
        match self {
            TensorValue::Dense(_) => InputKind::Dense,
            TensorValue::Sparse(_) => InputKind::Sparse,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            TensorValue::Dense(t) => t.dtype,
            TensorValue::Sparse(s) => s.dtype,
        }
    }

    pub fn rows(&self) -> usize {
        match self {
            TensorValue::Dense(t) => t.rows(),
            TensorValue::Sparse(s) => s.rows(),
        }
    }

    pub fn as_dense(&self) -> Option<&Tensor> {
        match self {
            TensorValue::Dense(t) => Some(t),
            TensorValue::Sparse(_) => None,
        }
    }

    pub fn as_sparse(&self) -> Option<&SparseTensor> {
        match self {
            TensorValue::Sparse(s) => Some(s),
            TensorValue::Dense(_) => None,
        }
    }

    /// Merges per-example values into one batch value, preserving input order.
    pub fn merge(parts: &[&TensorValue]) -> Result<TensorValue, TensorError> {
        let first = parts.first().ok_or(TensorError::Empty)?;
        match first {
            TensorValue::Dense(_) => {
                let dense = parts
                    .iter()
                    .map(|p| p.as_dense().ok_or(TensorError::KindMismatch))
                    .collect::<Result<Vec<_>, _>>()?;
                Tensor::concat(&dense).map(TensorValue::Dense)
            }
            TensorValue::Sparse(_) => {
                let sparse = parts
                    .iter()
                    .map(|p| p.as_sparse().ok_or(TensorError::KindMismatch))
                    .collect::<Result<Vec<_>, _>>()?;
                SparseTensor::concat(&sparse).map(TensorValue::Sparse)
            }
        }
    }
}

impl fmt::Debug for TensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorValue::Dense(t) => fmt::Debug::fmt(t, f),
            TensorValue::Sparse(s) => fmt::Debug::fmt(s, f),
        }
    }
}

impl fmt::Display for TensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl From<Tensor> for TensorValue {
    fn from(t: Tensor) -> Self {
        TensorValue::Dense(t)
    }
}

impl From<SparseTensor> for TensorValue {
    fn from(s: SparseTensor) -> Self {
        TensorValue::Sparse(s)
    }
}
