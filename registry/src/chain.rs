use std::sync::Arc;

use crate::layer::Layer;

/// The registry's layers in resolution order (rank ascending, so the last
/// layer wins). Neighboring layers are linked through their prev/next
/// back-references for navigation.
pub struct LayerChain {
    layers: Vec<Arc<Layer>>,
}

impl LayerChain {
    pub(crate) fn new(mut layers: Vec<Arc<Layer>>) -> Self {
        layers.sort_by_key(|l| l.rank());
        for pair in layers.windows(2) {
            pair[0].set_next(&pair[1]);
            pair[1].set_prev(&pair[0]);
        }
        LayerChain { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Lowest-ranked layer.
    pub fn first(&self) -> Option<&Arc<Layer>> {
        self.layers.first()
    }

    /// Highest-ranked layer.
    pub fn last(&self) -> Option<&Arc<Layer>> {
        self.layers.last()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Layer>> {
        self.layers.iter().find(|l| l.name() == name)
    }

    /// Layers in rank order, lowest first.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Layer>> {
        self.layers.iter()
    }
}
