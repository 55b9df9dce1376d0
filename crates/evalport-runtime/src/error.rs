use std::fmt;

use evalport_core::{Bucket, EngineError, ErrorKind, Example, FeedError, FeedKey, TensorValue};

/// Context attached to a failed metrics update: the batch as it was handed in
/// and the value fed to every (bucket, key), in slot order.
#[derive(Debug, Clone)]
pub struct FeedDiagnostics {
    pub examples: String,
    pub feed: Vec<((Bucket, FeedKey), TensorValue)>,
}

impl FeedDiagnostics {
    pub fn new(examples: &[Example], feed: Vec<((Bucket, FeedKey), TensorValue)>) -> Self {
        Self {
            examples: format!("{examples:?}"),
            feed,
        }
    }

    pub fn value(&self, bucket: Bucket, key: &FeedKey) -> Option<&TensorValue> {
        self.feed
            .iter()
            .find(|((b, k), _)| *b == bucket && k == key)
            .map(|(_, v)| v)
    }
}

impl fmt::Display for FeedDiagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "features_predictions_labels_list = {}, feed_dict = {{",
            self.examples
        )?;
        for (i, ((bucket, key), value)) in self.feed.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "({bucket}, {key}): {value}")?;
        }
        f.write_str("}")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    #[error("no feed descriptor: supply one up front or update with a first batch")]
    NoDescriptor,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("an earlier construction attempt failed; the graph is unusable")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum EvalGraphError {
    /// A batch does not line up with the feed structure. Raised before the
    /// engine sees anything.
    #[error("batch does not match the feed structure")]
    StructuralMismatch(#[from] FeedError),

    /// The accumulation step failed. `source` is the engine's own error,
    /// untouched; `diagnostics` holds the batch and what was fed.
    #[error("{source}; {diagnostics}")]
    Execution {
        #[source]
        source: EngineError,
        diagnostics: Box<FeedDiagnostics>,
    },

    #[error("failed to construct evaluation graph")]
    Construction(#[from] ConstructionError),

    /// Metric variable reads and resets outside of an update.
    #[error("metrics engine error")]
    Engine(#[source] EngineError),
}

impl EvalGraphError {
    /// Kind of the underlying engine failure, if there was one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Execution { source, .. } | Self::Engine(source) => Some(source.kind()),
            Self::Construction(ConstructionError::Engine(source)) => Some(source.kind()),
            _ => None,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, Self::StructuralMismatch(_))
    }

    pub fn diagnostics(&self) -> Option<&FeedDiagnostics> {
        match self {
            Self::Execution { diagnostics, .. } => Some(&**diagnostics),
            _ => None,
        }
    }
}
