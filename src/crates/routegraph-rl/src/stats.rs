//! Learning statistics and a readable Q-table dump

use crate::qstore::QTable;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::Write;

/// Point-in-time summary of a learning context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningStats {
    /// Signatures with a Q-value bucket
    pub total_states: usize,
    /// Distinct actions that have a value in any bucket
    pub total_actions: usize,
    pub non_zero_q_values: usize,
    pub exploration_rate: f64,
    pub learning_rate: f64,
    pub use_embeddings: bool,
    /// Entries in the semantic index
    pub cached_embeddings: usize,
}

pub(crate) fn distinct_actions(table: &QTable) -> usize {
    table
        .values()
        .flat_map(|actions| actions.keys())
        .collect::<BTreeSet<_>>()
        .len()
}

/// Render a Q-table for inspection: one block per signature, actions by descending value
pub fn render_readable(table: &QTable) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Q-table: {} states", table.len());

    for (signature, actions) in table {
        let _ = writeln!(out);
        let _ = writeln!(out, "[{}]", signature);

        if actions.is_empty() {
            let _ = writeln!(out, "  (no values)");
            continue;
        }

        let mut ranked: Vec<_> = actions.iter().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (action, value) in ranked {
            let _ = writeln!(out, "  {:<24} {:>8.4}", action, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_distinct_actions() {
        let mut table = QTable::new();
        table.insert("a".into(), BTreeMap::from([("x".to_string(), 1.0), ("y".to_string(), 0.0)]));
        table.insert("b".into(), BTreeMap::from([("x".to_string(), 0.5)]));
        assert_eq!(distinct_actions(&table), 2);
    }

    #[test]
    fn test_render_orders_by_value() {
        let mut table = QTable::new();
        table.insert(
            "weather paris".into(),
            BTreeMap::from([("search".to_string(), 0.1), ("weather".to_string(), 0.9)]),
        );
        table.insert("empty".into(), BTreeMap::new());

        let text = render_readable(&table);
        assert!(text.starts_with("Q-table: 2 states"));
        assert!(text.contains("(no values)"));

        let weather = text.find("weather  ").unwrap();
        let search = text.find("search").unwrap();
        assert!(weather < search);
    }
}
