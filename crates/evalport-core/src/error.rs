use crate::{Bucket, DType, FeedKey, InputKind, Shape};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TensorError {
    #[error("expected {expected} elements, got {got}")]
    LengthMismatch { expected: usize, got: usize },
    #[error("expected {expected} bytes of tensor data, got {got}")]
    ByteLength { expected: usize, got: usize },
    #[error("expected dtype {expected}, got {got}")]
    DTypeMismatch { expected: DType, got: DType },
    #[error("shape {got} is incompatible with {expected}")]
    ShapeMismatch { expected: Shape, got: Shape },
    #[error("sparse index has rank {got}, dense shape has rank {expected}")]
    IndexRank { expected: usize, got: usize },
    #[error("sparse tensors need at least one dimension")]
    SparseRank,
    #[error("cannot merge dense and sparse values")]
    KindMismatch,
    #[error("nothing to merge")]
    Empty,
}

/// An example (or batch of examples) does not line up with the feed structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    #[error("example {index} has no {bucket} entry for key `{key}`")]
    MissingKey {
        index: usize,
        bucket: Bucket,
        key: FeedKey,
    },
    #[error("example {index} entry {bucket}/{key} has no `{}` value", crate::NODE_SUFFIX)]
    MissingNode {
        index: usize,
        bucket: Bucket,
        key: FeedKey,
    },
    #[error("example {index} entry {bucket}/{key} is {got:?}, expected {expected:?}")]
    KindMismatch {
        index: usize,
        bucket: Bucket,
        key: FeedKey,
        expected: InputKind,
        got: InputKind,
    },
    #[error("cannot merge batch values for {bucket}/{key}")]
    Merge {
        bucket: Bucket,
        key: FeedKey,
        #[source]
        source: TensorError,
    },
}

/// Coarse classification of an engine failure, kept intact through augmentation.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// A fed value has the wrong kind or element type for its slot.
    Type,
    /// A fed value is well typed but unusable (bad length, NaN, ...).
    Value,
    /// Engine misuse: unknown slot, missing registration, wrong feed arity.
    Runtime,
    /// An accumulation operation itself failed.
    Op,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("type error: {0}")]
    Type(String),
    #[error("value error: {0}")]
    Value(String),
    #[error("runtime error: {0}")]
    Runtime(String),
    #[error("operation `{op}` failed: {message}")]
    Op { op: String, message: String },
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Type(_) => ErrorKind::Type,
            Self::Value(_) => ErrorKind::Value,
            Self::Runtime(_) => ErrorKind::Runtime,
            Self::Op { .. } => ErrorKind::Op,
        }
    }
}

impl From<TensorError> for EngineError {
    fn from(err: TensorError) -> Self {
        match err {
            TensorError::DTypeMismatch { .. } | TensorError::KindMismatch => {
                EngineError::Type(err.to_string())
            }
            _ => EngineError::Value(err.to_string()),
        }
    }
}
