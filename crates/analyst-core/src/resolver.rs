use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub order: Vec<String>,
    pub warnings: Vec<String>,
}

/// Order `selected` so every task follows the selected tasks it depends on.
///
/// Works in rounds: each round takes every remaining task whose in-set
/// dependencies are already placed, in lexicographic order. Dependencies
/// outside the selected set count as satisfied. When a round makes no
/// progress (a cycle), the rest is appended in lexicographic order and a
/// warning is recorded. Always returns a permutation of the deduplicated
/// input.
pub fn resolve_order(selected: &[String], deps: &BTreeMap<String, Vec<String>>) -> Resolution {
    let in_set: BTreeSet<&str> = selected.iter().map(String::as_str).collect();
    let mut remaining = in_set.clone();
    let mut placed: BTreeSet<&str> = BTreeSet::new();
    let mut order = Vec::with_capacity(remaining.len());
    let mut warnings = Vec::new();

    while !remaining.is_empty() {
        let ready: Vec<&str> = remaining
            .iter()
            .copied()
            .filter(|id| {
                deps.get(*id)
                    .map(|ds| {
                        ds.iter()
                            .filter(|d| in_set.contains(d.as_str()))
                            .all(|d| placed.contains(d.as_str()))
                    })
                    .unwrap_or(true)
            })
            .collect();

        if ready.is_empty() {
            let stuck: Vec<&str> = remaining.iter().copied().collect();
            let msg = format!(
                "dependency cycle among tasks [{}]; appending in name order",
                stuck.join(", ")
            );
            warn!(tasks = %stuck.join(","), "dependency cycle, falling back to name order");
            warnings.push(msg);
            order.extend(stuck.iter().map(|s| s.to_string()));
            break;
        }

        for id in ready {
            remaining.remove(id);
            placed.insert(id);
            order.push(id.to_string());
        }
    }

    Resolution { order, warnings }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn deps(pairs: &[(&str, &[&str])]) -> BTreeMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), ids(v)))
            .collect()
    }

    #[test]
    fn rounds_are_lexicographic() {
        let d = deps(&[
            ("rfm_analysis", &["customer_segmentation"]),
            ("customer_segmentation", &["data_profiling"]),
            ("churn_prediction", &["data_profiling"]),
        ]);
        let selected = ids(&[
            "rfm_analysis",
            "churn_prediction",
            "customer_segmentation",
            "data_profiling",
            "anomaly_detection",
        ]);
        let r = resolve_order(&selected, &d);
        assert_eq!(
            r.order,
            ids(&[
                "anomaly_detection",
                "data_profiling",
                "churn_prediction",
                "customer_segmentation",
                "rfm_analysis"
            ])
        );
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn unselected_dependency_is_satisfied() {
        let d = deps(&[("time_series_forecast", &["revenue_trends"])]);
        let r = resolve_order(&ids(&["time_series_forecast"]), &d);
        assert_eq!(r.order, ids(&["time_series_forecast"]));
        assert!(r.warnings.is_empty());
    }

    #[test]
    fn cycle_falls_back_with_warning() {
        let d = deps(&[("a", &["b"]), ("b", &["a"]), ("c", &[])]);
        let r = resolve_order(&ids(&["b", "a", "c"]), &d);
        assert_eq!(r.order, ids(&["c", "a", "b"]));
        assert_eq!(r.warnings.len(), 1);
        assert!(r.warnings[0].contains("a, b"));
    }

    #[test]
    fn duplicates_collapse() {
        let r = resolve_order(&ids(&["x", "x"]), &BTreeMap::new());
        assert_eq!(r.order, ids(&["x"]));
    }

    // Acyclic graphs: edges only point from a higher index to a lower one.
    fn acyclic_graph() -> impl Strategy<Value = (Vec<String>, BTreeMap<String, Vec<String>>)> {
        (1usize..12).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..3), n)
                .prop_map(move |edges| {
                    let names: Vec<String> = (0..n).map(|i| format!("t{i:02}")).collect();
                    let mut map = BTreeMap::new();
                    for (i, picks) in edges.into_iter().enumerate() {
                        let ds: Vec<String> = if i == 0 {
                            Vec::new()
                        } else {
                            picks.iter().map(|p| names[p.index(i)].clone()).collect()
                        };
                        map.insert(names[i].clone(), ds);
                    }
                    (names, map)
                })
        })
    }

    fn arbitrary_graph() -> impl Strategy<Value = (Vec<String>, BTreeMap<String, Vec<String>>)> {
        (1usize..10).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<prop::sample::Index>(), 0..4), n)
                .prop_map(move |edges| {
                    let names: Vec<String> = (0..n).map(|i| format!("t{i:02}")).collect();
                    let map = edges
                        .into_iter()
                        .enumerate()
                        .map(|(i, picks)| {
                            (
                                names[i].clone(),
                                picks.iter().map(|p| names[p.index(n)].clone()).collect(),
                            )
                        })
                        .collect();
                    (names, map)
                })
        })
    }

    proptest! {
        #[test]
        fn acyclic_dependencies_come_first((names, graph) in acyclic_graph()) {
            let r = resolve_order(&names, &graph);
            prop_assert!(r.warnings.is_empty());
            let pos: BTreeMap<&str, usize> =
                r.order.iter().enumerate().map(|(i, id)| (id.as_str(), i)).collect();
            for (task, ds) in &graph {
                for d in ds {
                    prop_assert!(pos[d.as_str()] < pos[task.as_str()], "{} before {}", d, task);
                }
            }
        }

        #[test]
        fn any_graph_yields_permutation((names, graph) in arbitrary_graph()) {
            let r = resolve_order(&names, &graph);
            let mut sorted = r.order.clone();
            sorted.sort();
            prop_assert_eq!(sorted, names);
        }
    }
}
