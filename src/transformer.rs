//! Pre-enqueue message transformers.
//!
//! Transformers run synchronously on the producer thread, in registration
//! order, before a message is finalized. Any transformer may veto the message
//! by returning `false`, in which case the remaining transformers are skipped
//! and nothing is queued.

use std::sync::Arc;

use crate::message::MessageBuilder;

/// Inspects, mutates, or vetoes a pending message.
pub trait MessageTransformer: Send + Sync {
    /// Return `false` to drop the message.
    fn transform(&self, builder: &mut MessageBuilder) -> bool;
}

impl<F> MessageTransformer for F
where
    F: Fn(&mut MessageBuilder) -> bool + Send + Sync,
{
    fn transform(&self, builder: &mut MessageBuilder) -> bool {
        self(builder)
    }
}

/// Ordered, immutable list of transformers.
#[derive(Clone, Default)]
pub struct TransformerChain {
    stages: Arc<[Arc<dyn MessageTransformer>]>,
}

impl TransformerChain {
    /// Build a chain, rejecting the same transformer registered twice.
    ///
    /// Identity is by allocation: two `Arc`s pointing at the same value are
    /// duplicates, two separately allocated equal values are not.
    pub fn new(stages: Vec<Arc<dyn MessageTransformer>>) -> Result<Self, usize> {
        for (i, stage) in stages.iter().enumerate() {
            if stages[..i].iter().any(|prev| Arc::ptr_eq(prev, stage)) {
                return Err(i);
            }
        }
        Ok(Self {
            stages: stages.into(),
        })
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run every stage in order. Returns `false` as soon as one vetoes.
    pub fn apply(&self, builder: &mut MessageBuilder) -> bool {
        self.stages.iter().all(|stage| stage.transform(builder))
    }
}

impl std::fmt::Debug for TransformerChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformerChain")
            .field("stages", &self.stages.len())
            .finish()
    }
}
