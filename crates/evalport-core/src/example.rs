use std::collections::BTreeMap;

use crate::{FeedKey, Fpl, SlotId, TensorValue};

/// Key under which every stored tensor value is wrapped.
pub const NODE_SUFFIX: &str = "node";

pub type NodeMap<T> = BTreeMap<String, T>;

pub fn wrap_node<T>(value: T) -> NodeMap<T> {
    BTreeMap::from([(NODE_SUFFIX.to_string(), value)])
}

pub fn node_value<T>(map: &NodeMap<T>) -> Option<&T> {
    map.get(NODE_SUFFIX)
}

/// One (features, predictions, labels) tuple as supplied by a caller.
pub type Example = Fpl<NodeMap<TensorValue>>;

/// Per-bucket storage of the slots an evaluation graph was built with.
pub type FplNodes = Fpl<NodeMap<SlotId>>;

impl Fpl<NodeMap<TensorValue>> {
    pub fn builder() -> ExampleBuilder {
        ExampleBuilder::default()
    }
}

impl<T> Fpl<NodeMap<T>> {
    /// The node value stored for `key`, if both the entry and its node exist.
    pub fn node(&self, bucket: crate::Bucket, key: &FeedKey) -> Option<&T> {
        self.get(bucket, key).and_then(node_value)
    }
}

#[derive(Default)]
pub struct ExampleBuilder {
    inner: Example,
}

impl ExampleBuilder {
    pub fn feature(mut self, key: impl Into<String>, value: impl Into<TensorValue>) -> Self {
        self.inner
            .features
            .insert(FeedKey::Named(key.into()), wrap_node(value.into()));
        self
    }

    pub fn prediction(mut self, key: impl Into<String>, value: impl Into<TensorValue>) -> Self {
        self.inner
            .predictions
            .insert(FeedKey::Named(key.into()), wrap_node(value.into()));
        self
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<TensorValue>) -> Self {
        self.inner
            .labels
            .insert(FeedKey::Named(key.into()), wrap_node(value.into()));
        self
    }

    pub fn single_prediction(mut self, value: impl Into<TensorValue>) -> Self {
        self.inner
            .predictions
            .insert(FeedKey::Unnamed, wrap_node(value.into()));
        self
    }

    pub fn single_label(mut self, value: impl Into<TensorValue>) -> Self {
        self.inner
            .labels
            .insert(FeedKey::Unnamed, wrap_node(value.into()));
        self
    }

    pub fn build(self) -> Example {
        self.inner
    }
}
