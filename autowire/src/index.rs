use std::collections::HashMap;

use crate::{CapabilityId, ProviderId};

/// Multimap from capability to the definitions that satisfy it.
///
/// Candidates of one capability are kept in registration order, which is the
/// order the resolution engine visits them in.
#[derive(Clone, Debug, Default)]
pub struct CapabilityIndex {
    entries: HashMap<CapabilityId, Vec<ProviderId>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `definition` as a candidate for `capability`.
    ///
    /// Registering the same pair twice has no effect.
    pub fn register(&mut self, capability: CapabilityId, definition: ProviderId) {
        let candidates = self.entries.entry(capability).or_default();
        if !candidates.contains(&definition) {
            candidates.push(definition);
        }
    }

    pub fn find(&self, capability: CapabilityId) -> &[ProviderId] {
        self.entries.get(&capability).map_or(&[], Vec::as_slice)
    }

    /// Returns the union of candidates of every capability, without duplicates.
    pub fn find_any(&self, capabilities: &[CapabilityId]) -> Vec<ProviderId> {
        let mut result = Vec::new();
        for capability in capabilities {
            for definition in self.find(*capability) {
                if !result.contains(definition) {
                    result.push(*definition);
                }
            }
        }
        result
    }

    /// Removes `definition` from every entry it was registered in.
    pub fn remove(&mut self, definition: ProviderId) {
        self.entries.retain(|_, candidates| {
            candidates.retain(|v| *v != definition);
            !candidates.is_empty()
        });
    }

    pub fn contains(&self, capability: CapabilityId) -> bool {
        self.entries.contains_key(&capability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Contracts;

    #[test]
    fn test_register_and_find() {
        let mut contracts = Contracts::new();
        let logger = contracts.declare("Logger");
        let sink = contracts.declare("Sink");
        let mut index = CapabilityIndex::new();
        index.register(logger, ProviderId::new(1));
        index.register(logger, ProviderId::new(0));
        index.register(logger, ProviderId::new(1));
        index.register(sink, ProviderId::new(0));
        assert_eq!(index.find(logger), &[ProviderId::new(1), ProviderId::new(0)]);
        assert_eq!(
            index.find_any(&[sink, logger]),
            vec![ProviderId::new(0), ProviderId::new(1)]
        );
    }

    #[test]
    fn test_remove() {
        let mut contracts = Contracts::new();
        let logger = contracts.declare("Logger");
        let sink = contracts.declare("Sink");
        let mut index = CapabilityIndex::new();
        index.register(logger, ProviderId::new(0));
        index.register(sink, ProviderId::new(0));
        index.register(logger, ProviderId::new(1));
        index.remove(ProviderId::new(0));
        assert_eq!(index.find(logger), &[ProviderId::new(1)]);
        assert!(index.find(sink).is_empty());
        assert!(!index.contains(sink));
    }
}
