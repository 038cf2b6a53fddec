//! Neighbor selection heuristic (Algorithm 4 from the HNSW paper).

use crate::distance::Metric;

use super::neighbor_queue::Neighbor;

/// A scored candidate together with its vector.
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    /// Id and ordering distance to the base node.
    pub neighbor: Neighbor,
    pub vector: &'a [f32],
}

impl<'a> Candidate<'a> {
    pub fn new(neighbor: Neighbor, vector: &'a [f32]) -> Self {
        Self { neighbor, vector }
    }
}

/// Choose at most `cap` neighbors for a base node.
///
/// `existing` links are kept first, closest first. Candidates are then
/// considered closest first: one is accepted when it is closer to the base
/// than to every node selected so far. Candidates that fail the test fill the
/// remaining slots in distance order, so the result is only empty when there
/// is nothing to choose from.
///
/// Ids appearing more than once are taken once. The base node itself must not
/// appear among the inputs. Returns the selection sorted ascending.
pub fn select_neighbors(
    metric: Metric,
    candidates: &[Candidate<'_>],
    existing: &[Candidate<'_>],
    cap: usize,
) -> Vec<Neighbor> {
    let mut selected: Vec<Candidate<'_>> = Vec::with_capacity(cap);

    let mut existing = existing.to_vec();
    existing.sort_by(|a, b| a.neighbor.cmp(&b.neighbor));
    for e in existing {
        if selected.len() == cap {
            break;
        }
        if !contains(&selected, &e) {
            selected.push(e);
        }
    }

    let mut candidates = candidates.to_vec();
    candidates.sort_by(|a, b| a.neighbor.cmp(&b.neighbor));

    let mut pruned = Vec::new();
    for c in candidates {
        if selected.len() == cap {
            break;
        }
        if contains(&selected, &c) || contains(&pruned, &c) {
            continue;
        }
        let diverse = selected
            .iter()
            .all(|s| c.neighbor.distance < metric.ordering_distance(c.vector, s.vector));
        if diverse {
            selected.push(c);
        } else {
            pruned.push(c);
        }
    }

    // Keep pruned connections
    for p in pruned {
        if selected.len() == cap {
            break;
        }
        selected.push(p);
    }

    let mut result: Vec<Neighbor> = selected.into_iter().map(|c| c.neighbor).collect();
    result.sort();
    result
}

fn contains(list: &[Candidate<'_>], c: &Candidate<'_>) -> bool {
    list.iter().any(|s| s.neighbor.id == c.neighbor.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemId;
    use proptest::prelude::*;

    fn scored<'a>(metric: Metric, base: &[f32], points: &'a [(ItemId, Vec<f32>)]) -> Vec<Candidate<'a>> {
        points
            .iter()
            .map(|(id, v)| Candidate::new(Neighbor::new(*id, metric.ordering_distance(base, v)), v))
            .collect()
    }

    fn ids(neighbors: &[Neighbor]) -> Vec<ItemId> {
        neighbors.iter().map(|n| n.id).collect()
    }

    #[test]
    fn test_prefers_diverse_directions() {
        // Base at origin; 1 and 2 sit in the same direction, 3 in the opposite one.
        let points = vec![
            (1, vec![1.0, 0.0]),
            (2, vec![1.1, 0.0]),
            (3, vec![-2.0, 0.0]),
        ];
        let candidates = scored(Metric::Euclidean, &[0.0, 0.0], &points);
        let selected = select_neighbors(Metric::Euclidean, &candidates, &[], 2);
        assert_eq!(ids(&selected), vec![1, 3]);
    }

    #[test]
    fn test_pruned_fill_remaining_slots() {
        let points = vec![
            (1, vec![1.0, 0.0]),
            (2, vec![1.1, 0.0]),
            (3, vec![1.2, 0.0]),
        ];
        let candidates = scored(Metric::Euclidean, &[0.0, 0.0], &points);
        let selected = select_neighbors(Metric::Euclidean, &candidates, &[], 3);
        assert_eq!(ids(&selected), vec![1, 2, 3]);
    }

    #[test]
    fn test_existing_links_kept_first() {
        let base = [0.0, 0.0];
        let existing_points = vec![(7, vec![5.0, 0.0])];
        let points = vec![(1, vec![1.0, 0.0]), (2, vec![0.0, 1.0])];
        let existing = scored(Metric::Euclidean, &base, &existing_points);
        let candidates = scored(Metric::Euclidean, &base, &points);

        let selected = select_neighbors(Metric::Euclidean, &candidates, &existing, 2);
        assert!(ids(&selected).contains(&7));
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_duplicates_and_empty_input() {
        let points = vec![(1, vec![1.0]), (1, vec![1.0]), (2, vec![3.0])];
        let candidates = scored(Metric::Euclidean, &[0.0], &points);
        let selected = select_neighbors(Metric::Euclidean, &candidates, &[], 4);
        assert_eq!(ids(&selected), vec![1, 2]);

        assert!(select_neighbors(Metric::Euclidean, &[], &[], 4).is_empty());
    }

    #[test]
    fn test_identical_vectors_still_linked() {
        let points = vec![(1, vec![0.5, 0.5]), (2, vec![0.5, 0.5])];
        let candidates = scored(Metric::Euclidean, &[0.5, 0.5], &points);
        let selected = select_neighbors(Metric::Euclidean, &candidates, &[], 2);
        assert_eq!(ids(&selected), vec![1, 2]);
    }

    proptest! {
        #[test]
        fn prop_selection_bounded_and_nonempty(
            coords in prop::collection::vec(prop::collection::vec(-10.0f32..10.0, 3), 1..40),
            cap in 1usize..12,
        ) {
            let points: Vec<(ItemId, Vec<f32>)> = coords
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i as ItemId + 1, v))
                .collect();
            let candidates = scored(Metric::Euclidean, &[0.0, 0.0, 0.0], &points);
            let selected = select_neighbors(Metric::Euclidean, &candidates, &[], cap);

            prop_assert!(!selected.is_empty());
            prop_assert_eq!(selected.len(), cap.min(points.len()));
            let mut unique = ids(&selected);
            unique.sort_unstable();
            unique.dedup();
            prop_assert_eq!(unique.len(), selected.len());
            // The closest candidate is always selected.
            let closest = candidates.iter().map(|c| c.neighbor).min().unwrap();
            prop_assert_eq!(selected[0], closest);
        }
    }
}
