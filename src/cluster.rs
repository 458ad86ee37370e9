use crate::disjoint_set::DisjointSet;
use crate::refine::SimilarityEdge;
use std::collections::HashSet;
use std::path::PathBuf;

/// Merges the edges of one coarse bucket into duplicate clusters.
///
/// Builds a union-find over exactly the paths touched by the edges, unions
/// every edge, and returns the connected components with at least two
/// members. Paths that lost all their edges (for example to decode failures
/// upstream) never reach this function and are not emitted as singletons.
pub fn cluster_edges(edges: &[SimilarityEdge]) -> Vec<Vec<PathBuf>> {
    if edges.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut members: Vec<PathBuf> = Vec::new();
    for edge in edges {
        for path in [&edge.a, &edge.b] {
            if seen.insert(path.clone()) {
                members.push(path.clone());
            }
        }
    }

    let mut set = DisjointSet::new(members);
    for edge in edges {
        set.union(&edge.a, &edge.b);
    }

    set.components()
        .into_iter()
        .filter(|component| component.len() >= 2)
        .collect()
}
