use hashbrown::HashSet;
use proptest::prelude::*;

use mesh_la::graph::Connectivity;

/// Random adjacency lists with no orphan secondaries: secondary indices are
/// compacted after generation.
fn arbitrary_relation() -> impl Strategy<Value = Connectivity> {
    prop::collection::vec(prop::collection::hash_set(0usize..12, 1..6), 1..10).prop_map(|rows| {
        let mut used: Vec<usize> = rows.iter().flatten().copied().collect();
        used.sort_unstable();
        used.dedup();
        let compact = |s: usize| used.binary_search(&s).unwrap();

        let mut offsets = vec![0usize];
        let mut array = Vec::new();
        for row in &rows {
            let mut links: Vec<usize> = row.iter().map(|&s| compact(s)).collect();
            links.sort_unstable();
            array.extend_from_slice(&links);
            offsets.push(array.len());
        }
        Connectivity::new(offsets, array).unwrap()
    })
}

fn link_sets(conn: &Connectivity) -> Vec<HashSet<usize>> {
    (0..conn.n_primary())
        .map(|p| conn.links(p).iter().copied().collect())
        .collect()
}

proptest! {
    #[test]
    fn double_inversion_reproduces_relation(conn in arbitrary_relation()) {
        let double = conn.invert().invert();
        prop_assert_eq!(double.n_primary(), conn.n_primary());
        prop_assert_eq!(double.n_secondary(), conn.n_secondary());
        prop_assert_eq!(link_sets(&double), link_sets(&conn));
    }

    #[test]
    fn inversion_preserves_link_count(conn in arbitrary_relation()) {
        prop_assert_eq!(conn.invert().n_links(), conn.n_links());
    }
}

// A 2x2 quad mesh over a 3x3 node grid:
//
//   6 - 7 - 8
//   | 2 | 3 |
//   3 - 4 - 5
//   | 0 | 1 |
//   0 - 1 - 2
fn quad_mesh() -> Connectivity {
    Connectivity::new(
        vec![0, 4, 8, 12, 16],
        vec![0, 1, 4, 3, 1, 2, 5, 4, 3, 4, 7, 6, 4, 5, 8, 7],
    )
    .unwrap()
}

#[test]
fn quad_mesh_node_adjacency_vs_edge_adjacency() {
    let conn = quad_mesh();

    // One shared node links everything, including the diagonal pairs
    // meeting only at node 4.
    let by_node = conn.primary_to_primary(1, false).unwrap();
    let sets = link_sets(&by_node);
    assert_eq!(sets[0], HashSet::from_iter([1, 2, 3]));
    assert_eq!(sets[3], HashSet::from_iter([0, 1, 2]));

    // Two shared nodes keep only the edge neighbors.
    let by_edge = conn.primary_to_primary(2, false).unwrap();
    let sets = link_sets(&by_edge);
    assert_eq!(sets[0], HashSet::from_iter([1, 2]));
    assert_eq!(sets[1], HashSet::from_iter([0, 3]));
    assert_eq!(sets[2], HashSet::from_iter([0, 3]));
    assert_eq!(sets[3], HashSet::from_iter([1, 2]));

    // No two quads share three nodes.
    let none = conn.primary_to_primary(3, false).unwrap();
    assert_eq!(none.n_links(), 0);
}

#[test]
fn quad_mesh_inverse_is_node_to_cell() {
    let inv = quad_mesh().invert();
    assert_eq!(inv.n_primary(), 9);
    // The center node touches all four cells.
    assert_eq!(inv.links(4), &[0, 1, 2, 3]);
    assert_eq!(inv.links(0), &[0]);
}
