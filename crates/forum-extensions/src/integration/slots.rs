//! UI slot contributions grouped by slot name.

use std::collections::BTreeMap;

use serde::Serialize;

/// A component an extension renders into a named slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotContribution {
    /// Id of the contributing extension.
    pub source_id: String,
    pub component: String,
    /// Lower renders first; ties break on source id.
    pub order: i32,
}

impl SlotContribution {
    pub fn new(source_id: impl Into<String>, component: impl Into<String>, order: i32) -> Self {
        Self {
            source_id: source_id.into(),
            component: component.into(),
            order,
        }
    }
}

/// Ordered contributions per slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotTable {
    slots: BTreeMap<String, Vec<SlotContribution>>,
}

impl SlotTable {
    /// Add a contribution. A contribution with the same source and component
    /// in the same slot is replaced.
    pub fn register(&mut self, slot: &str, contribution: SlotContribution) {
        let entries = self.slots.entry(slot.to_string()).or_default();
        entries.retain(|c| {
            !(c.source_id == contribution.source_id && c.component == contribution.component)
        });
        entries.push(contribution);
        entries.sort_by(|a, b| (a.order, &a.source_id).cmp(&(b.order, &b.source_id)));
    }

    /// Remove every contribution from `source_id`. Returns how many were removed.
    pub fn unregister_by_source(&mut self, source_id: &str) -> usize {
        let mut removed = 0;
        for entries in self.slots.values_mut() {
            let before = entries.len();
            entries.retain(|c| c.source_id != source_id);
            removed += before - entries.len();
        }
        self.slots.retain(|_, entries| !entries.is_empty());
        removed
    }

    pub fn contributions(&self, slot: &str) -> &[SlotContribution] {
        self.slots.get(slot).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.slots
            .values()
            .flat_map(|entries| entries.iter().map(|c| c.source_id.as_str()))
    }

    pub(crate) fn to_map(&self) -> BTreeMap<String, Vec<SlotContribution>> {
        self.slots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ordering_and_replacement() {
        let mut table = SlotTable::default();
        table.register("footer", SlotContribution::new("b", "B", 10));
        table.register("footer", SlotContribution::new("a", "A", 10));
        table.register("footer", SlotContribution::new("c", "C", -1));
        table.register("footer", SlotContribution::new("a", "A", 20));

        let order: Vec<_> = table
            .contributions("footer")
            .iter()
            .map(|c| (c.source_id.as_str(), c.order))
            .collect();
        assert_eq!(order, vec![("c", -1), ("b", 10), ("a", 20)]);
    }

    #[test]
    fn test_unregister_by_source_drops_empty_slots() {
        let mut table = SlotTable::default();
        table.register("footer", SlotContribution::new("a", "A", 0));
        table.register("header", SlotContribution::new("a", "A2", 0));
        table.register("header", SlotContribution::new("b", "B", 0));

        assert_eq!(table.unregister_by_source("a"), 2);
        assert!(table.contributions("footer").is_empty());
        assert_eq!(table.contributions("header").len(), 1);
        assert_eq!(table.to_map().len(), 1);
        assert_eq!(table.unregister_by_source("a"), 0);
    }
}
