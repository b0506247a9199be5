//! CSR-style bipartite adjacency between a primary and a secondary entity set.

use hashbrown::HashSet;

use crate::error::{MeshLaError, check_index, check_sizes};

/// Immutable bipartite primary→secondary adjacency in CSR layout.
///
/// `offsets` has one entry per primary plus one; the links of primary `p`
/// are `array[offsets[p]..offsets[p + 1]]`, holding secondary indices in
/// `[0, n_secondary)`. Every secondary index appears at least once: a
/// connectivity with orphan secondary entities cannot be used safely
/// downstream and is rejected at construction. Derived relations
/// ([`Connectivity::invert`], [`Connectivity::primary_to_primary`]) are new,
/// independent values; an existing connectivity never changes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Connectivity {
    offsets: Vec<usize>,
    array: Vec<usize>,
    n_secondary: usize,
}

impl Connectivity {
    /// Build and validate a connectivity from raw CSR data.
    pub fn new(offsets: Vec<usize>, array: Vec<usize>) -> Result<Self, MeshLaError> {
        if offsets.is_empty() || offsets[0] != 0 {
            return Err(MeshLaError::InvalidConnectivity(
                "offsets must start with 0".into(),
            ));
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            return Err(MeshLaError::InvalidConnectivity(
                "offsets must be monotonically increasing".into(),
            ));
        }
        check_sizes(*offsets.last().unwrap_or(&0), array.len())?;

        let n_secondary = array.iter().max().map_or(0, |&m| m + 1);

        // Reject orphan secondary entities.
        let mut included = vec![false; n_secondary];
        for &s in &array {
            included[s] = true;
        }
        if let Some(orphan) = included.iter().position(|&v| !v) {
            return Err(MeshLaError::InvalidConnectivity(format!(
                "secondary entity {orphan} has no links"
            )));
        }

        Ok(Self {
            offsets,
            array,
            n_secondary,
        })
    }

    /// An empty relation with no primaries and no secondaries.
    pub fn empty() -> Self {
        Self {
            offsets: vec![0],
            array: Vec::new(),
            n_secondary: 0,
        }
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn array(&self) -> &[usize] {
        &self.array
    }

    /// Number of primary entities.
    pub fn n_primary(&self) -> usize {
        self.offsets.len() - 1
    }

    /// Number of secondary entities.
    pub fn n_secondary(&self) -> usize {
        self.n_secondary
    }

    /// Total number of primary→secondary links.
    pub fn n_links(&self) -> usize {
        self.array.len()
    }

    /// Number of links of one primary.
    pub fn link_count(&self, primary: usize) -> usize {
        self.offsets[primary + 1] - self.offsets[primary]
    }

    /// The secondary entities linked to `primary`.
    pub fn links(&self, primary: usize) -> &[usize] {
        &self.array[self.offsets[primary]..self.offsets[primary + 1]]
    }

    /// CSR offset of one primary.
    pub fn offset(&self, primary: usize) -> usize {
        self.offsets[primary]
    }

    /// Position of `secondary` within the links of `primary`.
    pub fn relative_index(&self, primary: usize, secondary: usize) -> Result<usize, MeshLaError> {
        check_index(primary, self.n_primary())?;
        self.links(primary)
            .iter()
            .position(|&s| s == secondary)
            .ok_or(MeshLaError::NotALink { primary, secondary })
    }

    /// The transposed relation (secondary→primary).
    ///
    /// Count secondary degrees, prefix-sum into offsets, scatter-fill;
    /// O(n_links).
    pub fn invert(&self) -> Connectivity {
        let mut degree = vec![0usize; self.n_secondary];
        for &s in &self.array {
            degree[s] += 1;
        }

        let mut offsets = vec![0usize; self.n_secondary + 1];
        for s in 0..self.n_secondary {
            offsets[s + 1] = offsets[s] + degree[s];
        }

        let mut array = vec![0usize; self.array.len()];
        let mut cursor = vec![0usize; self.n_secondary];
        for p in 0..self.n_primary() {
            for &s in self.links(p) {
                array[offsets[s] + cursor[s]] = p;
                cursor[s] += 1;
            }
        }

        // Valid by construction: every primary with links appears, and the
        // value range is exactly [0, n_primary).
        Connectivity {
            offsets,
            array,
            n_secondary: self.n_primary(),
        }
    }

    /// Primary→primary adjacency: two primaries are linked iff they share at
    /// least `n_common` secondary entities.
    ///
    /// Runs the primary → secondary → inverse-secondary → candidate loop
    /// twice, once to count and once to fill, so the links array is
    /// allocated exactly once.
    pub fn primary_to_primary(
        &self,
        n_common: usize,
        include_self: bool,
    ) -> Result<Connectivity, MeshLaError> {
        let inverse = self.invert();

        // Early exit as soon as `n_common` shared secondaries are found.
        let shares_enough = |lhs: &[usize], rhs: &[usize]| {
            let mut shared = 0;
            for &i in lhs {
                for &j in rhs {
                    if i == j {
                        shared += 1;
                        if shared == n_common {
                            return true;
                        }
                    }
                }
            }
            false
        };

        let mut offsets = vec![0usize; self.n_primary() + 1];
        let mut array: Vec<usize> = Vec::new();
        let mut is_link: HashSet<usize> = HashSet::new();

        for count_pass in [true, false] {
            let mut link_counts = vec![0usize; self.n_primary()];
            for p in 0..self.n_primary() {
                for &s in self.links(p) {
                    for &candidate in inverse.links(s) {
                        if candidate == p && !include_self {
                            continue;
                        }
                        if !is_link.contains(&candidate)
                            && (n_common == 1 || shares_enough(self.links(p), self.links(candidate)))
                        {
                            if !count_pass {
                                array[offsets[p] + link_counts[p]] = candidate;
                            }
                            link_counts[p] += 1;
                            is_link.insert(candidate);
                        }
                    }
                }
                is_link.clear();
            }

            if count_pass {
                for p in 0..self.n_primary() {
                    offsets[p + 1] = offsets[p] + link_counts[p];
                }
                array = vec![0usize; *offsets.last().unwrap_or(&0)];
            }
        }

        Connectivity::new(offsets, array)
    }
}
