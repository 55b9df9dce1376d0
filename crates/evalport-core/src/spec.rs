use std::collections::{btree_map, BTreeMap};
use std::fmt;

use crate::{DType, FeedError, TensorValue};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputKind {
    Dense,
    Sparse,
}

/// What a single input slot accepts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct InputSpec {
    pub kind: InputKind,
    pub dtype: DType,
}

impl InputSpec {
    pub fn dense(dtype: DType) -> Self {
        Self {
            kind: InputKind::Dense,
            dtype,
        }
    }

    pub fn sparse(dtype: DType) -> Self {
        Self {
            kind: InputKind::Sparse,
            dtype,
        }
    }

    pub fn of(value: &TensorValue) -> Self {
        Self {
            kind: value.kind(),
            dtype: value.dtype(),
        }
    }

    pub fn accepts(&self, value: &TensorValue) -> bool {
        *self == Self::of(value)
    }
}

/// The three halves of a (features, predictions, labels) tuple, in feed order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    Features,
    Predictions,
    Labels,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Features, Bucket::Predictions, Bucket::Labels];

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Features => "features",
            Bucket::Predictions => "predictions",
            Bucket::Labels => "labels",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key of an entry within a bucket. `Unnamed` addresses a single-output bucket.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FeedKey {
    Unnamed,
    Named(String),
}

impl FeedKey {
    pub fn named(key: impl Into<String>) -> Self {
        FeedKey::Named(key.into())
    }
}

impl fmt::Display for FeedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeedKey::Unnamed => f.write_str("<unnamed>"),
            FeedKey::Named(k) => f.write_str(k),
        }
    }
}

impl From<&str> for FeedKey {
    fn from(key: &str) -> Self {
        FeedKey::Named(key.to_string())
    }
}

/// Contents of one bucket: either a keyed mapping or a single unnamed value.
#[derive(Clone, Debug, PartialEq)]
pub enum BucketLayout<T> {
    Keyed(BTreeMap<String, T>),
    Single(T),
}

impl<T> Default for BucketLayout<T> {
    fn default() -> Self {
        BucketLayout::Keyed(BTreeMap::new())
    }
}

impl<T> BucketLayout<T> {
    pub fn get(&self, key: &FeedKey) -> Option<&T> {
        match (self, key) {
            (BucketLayout::Keyed(map), FeedKey::Named(k)) => map.get(k),
            (BucketLayout::Single(value), FeedKey::Unnamed) => Some(value),
            _ => None,
        }
    }

    /// Inserting an unnamed value turns the bucket single; inserting a named
    /// value into a single bucket turns it back into a keyed one.
    pub fn insert(&mut self, key: FeedKey, value: T) {
        match key {
            FeedKey::Unnamed => *self = BucketLayout::Single(value),
            FeedKey::Named(k) => match self {
                BucketLayout::Keyed(map) => {
                    map.insert(k, value);
                }
                BucketLayout::Single(_) => {
                    *self = BucketLayout::Keyed(BTreeMap::from([(k, value)]));
                }
            },
        }
    }

    pub fn len(&self) -> usize {
        match self {
            BucketLayout::Keyed(map) => map.len(),
            BucketLayout::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_single(&self) -> bool {
        matches!(self, BucketLayout::Single(_))
    }

    /// Entries sorted by key.
    pub fn iter(&self) -> LayoutIter<'_, T> {
        match self {
            BucketLayout::Keyed(map) => LayoutIter::Keyed(map.iter()),
            BucketLayout::Single(value) => LayoutIter::Single(Some(value)),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> BucketLayout<U> {
        match self {
            BucketLayout::Keyed(map) => {
                BucketLayout::Keyed(map.iter().map(|(k, v)| (k.clone(), f(v))).collect())
            }
            BucketLayout::Single(value) => BucketLayout::Single(f(value)),
        }
    }
}

pub enum LayoutIter<'a, T> {
    Keyed(btree_map::Iter<'a, String, T>),
    Single(Option<&'a T>),
}

impl<'a, T> Iterator for LayoutIter<'a, T> {
    type Item = (FeedKey, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            LayoutIter::Keyed(it) => it.next().map(|(k, v)| (FeedKey::Named(k.clone()), v)),
            LayoutIter::Single(slot) => slot.take().map(|v| (FeedKey::Unnamed, v)),
        }
    }
}

/// A (features, predictions, labels) triple of bucket layouts.
#[derive(Clone, Debug, PartialEq)]
pub struct Fpl<T> {
    pub features: BucketLayout<T>,
    pub predictions: BucketLayout<T>,
    pub labels: BucketLayout<T>,
}

impl<T> Default for Fpl<T> {
    fn default() -> Self {
        Self {
            features: BucketLayout::default(),
            predictions: BucketLayout::default(),
            labels: BucketLayout::default(),
        }
    }
}

impl<T> Fpl<T> {
    pub fn bucket(&self, bucket: Bucket) -> &BucketLayout<T> {
        match bucket {
            Bucket::Features => &self.features,
            Bucket::Predictions => &self.predictions,
            Bucket::Labels => &self.labels,
        }
    }

    pub fn bucket_mut(&mut self, bucket: Bucket) -> &mut BucketLayout<T> {
        match bucket {
            Bucket::Features => &mut self.features,
            Bucket::Predictions => &mut self.predictions,
            Bucket::Labels => &mut self.labels,
        }
    }

    pub fn get(&self, bucket: Bucket, key: &FeedKey) -> Option<&T> {
        self.bucket(bucket).get(key)
    }

    /// Walks every entry in canonical order: features, then predictions, then
    /// labels, each sorted by key. Construction and feeding both rely on this
    /// order, so it must never depend on anything but the keys.
    pub fn canonical(&self) -> impl Iterator<Item = (Bucket, FeedKey, &T)> + '_ {
        Bucket::ALL
            .into_iter()
            .flat_map(move |bucket| self.bucket(bucket).iter().map(move |(k, v)| (bucket, k, v)))
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Shape of one example's feed: one input spec per (bucket, key).
pub type FeedDescriptor = Fpl<InputSpec>;

impl Fpl<InputSpec> {
    pub fn builder() -> DescriptorBuilder {
        DescriptorBuilder::default()
    }

    /// Derives the feed structure from a single example.
    pub fn from_example(example: &crate::Example) -> Result<Self, FeedError> {
        let mut descriptor = FeedDescriptor::default();
        for (bucket, key, node) in example.canonical() {
            let value = crate::node_value(node).ok_or_else(|| FeedError::MissingNode {
                index: 0,
                bucket,
                key: key.clone(),
            })?;
            descriptor
                .bucket_mut(bucket)
                .insert(key, InputSpec::of(value));
        }
        Ok(descriptor)
    }
}

#[derive(Default)]
pub struct DescriptorBuilder {
    inner: FeedDescriptor,
}

impl DescriptorBuilder {
    pub fn feature(mut self, key: impl Into<String>, spec: InputSpec) -> Self {
        self.inner.features.insert(FeedKey::Named(key.into()), spec);
        self
    }

    pub fn prediction(mut self, key: impl Into<String>, spec: InputSpec) -> Self {
        self.inner.predictions.insert(FeedKey::Named(key.into()), spec);
        self
    }

    pub fn label(mut self, key: impl Into<String>, spec: InputSpec) -> Self {
        self.inner.labels.insert(FeedKey::Named(key.into()), spec);
        self
    }

    pub fn single_prediction(mut self, spec: InputSpec) -> Self {
        self.inner.predictions.insert(FeedKey::Unnamed, spec);
        self
    }

    pub fn single_label(mut self, spec: InputSpec) -> Self {
        self.inner.labels.insert(FeedKey::Unnamed, spec);
        self
    }

    pub fn build(self) -> FeedDescriptor {
        self.inner
    }
}
