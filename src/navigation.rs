//! Route cost estimation used as the base of every bid

use crate::consensus::types::EdgeId;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

/// Source of base route costs.
///
/// Implementations must be deterministic for a given pair of edges within
/// a tick; the auction compares costs across agents.
pub trait Navigator {
    /// Cost of driving from `from` to `to`, or `None` when no route exists.
    fn estimate_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64>;
}

impl<N: Navigator + ?Sized> Navigator for &N {
    fn estimate_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64> {
        (**self).estimate_cost(from, to)
    }
}

impl<N: Navigator + ?Sized> Navigator for Arc<N> {
    fn estimate_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64> {
        (**self).estimate_cost(from, to)
    }
}

impl<N: Navigator + ?Sized> Navigator for Box<N> {
    fn estimate_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64> {
        (**self).estimate_cost(from, to)
    }
}

/// Same cost for every pair of edges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConstantCost(pub f64);

impl Default for ConstantCost {
    fn default() -> Self {
        Self(100.0)
    }
}

impl Navigator for ConstantCost {
    fn estimate_cost(&self, _from: &EdgeId, _to: &EdgeId) -> Option<f64> {
        Some(self.0)
    }
}

/// Serialisable description of a road network.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoadLayout {
    pub edges: Vec<RoadEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadEdge {
    pub id: EdgeId,
    pub length: f64,
    #[serde(default)]
    pub successors: Vec<EdgeId>,
}

/// Directed road graph with shortest-path costs.
///
/// Roads are the nodes; a connection `a -> b` means a vehicle leaving road
/// `a` can enter road `b`. The cost of a route is the total length of the
/// roads entered after leaving `from`, so `to` counts and `from` does not.
#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
    lengths: HashMap<EdgeId, f64>,
    successors: HashMap<EdgeId, Vec<EdgeId>>,
}

#[derive(Debug, PartialEq)]
struct Frontier {
    cost: f64,
    edge: EdgeId,
}

impl Eq for Frontier {}

impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap on cost; lengths are validated finite so total_cmp is exact.
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl RoadNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_edge(&mut self, id: EdgeId, length: f64) -> Result<(), Error> {
        if !length.is_finite() || length < 0.0 {
            return Err(Error::ValidationError(format!(
                "edge {id} length must be finite and non-negative, got {length}"
            )));
        }
        if self.lengths.contains_key(&id) {
            return Err(Error::ItemAlreadyExists(format!("edge {id}")));
        }
        self.lengths.insert(id.clone(), length);
        self.successors.entry(id).or_default();
        Ok(())
    }

    pub fn connect(&mut self, from: &EdgeId, to: &EdgeId) -> Result<(), Error> {
        for edge in [from, to] {
            if !self.lengths.contains_key(edge) {
                return Err(Error::ValidationError(format!("unknown edge {edge}")));
            }
        }
        let next = self.successors.entry(from.clone()).or_default();
        if !next.contains(to) {
            next.push(to.clone());
        }
        Ok(())
    }

    pub fn from_layout(layout: &RoadLayout) -> Result<Self, Error> {
        let mut network = Self::new();
        for edge in &layout.edges {
            network.add_edge(edge.id.clone(), edge.length)?;
        }
        for edge in &layout.edges {
            for next in &edge.successors {
                network.connect(&edge.id, next)?;
            }
        }
        Ok(network)
    }

    /// Manhattan grid of two-way streets, `rows x cols` intersections apart
    /// by `block_length`. Streets are named `h<r>_<c>`/`v<r>_<c>` eastbound
    /// and southbound, with `r` suffixed for the reverse direction.
    pub fn grid(rows: usize, cols: usize, block_length: f64) -> Result<Self, Error> {
        if rows == 0 || cols == 0 {
            return Err(Error::ValidationError("grid needs at least one intersection".to_string()));
        }

        // Each street segment links two intersections; record them per node.
        let mut network = Self::new();
        let mut outgoing: HashMap<(usize, usize), Vec<EdgeId>> = HashMap::new();
        let mut incoming: HashMap<(usize, usize), Vec<EdgeId>> = HashMap::new();
        let mut add_street = |network: &mut Self, name: String, a: (usize, usize), b: (usize, usize)| -> Result<(), Error> {
            let forward = EdgeId::new(name.clone());
            let backward = EdgeId::new(format!("{name}r"));
            network.add_edge(forward.clone(), block_length)?;
            network.add_edge(backward.clone(), block_length)?;
            outgoing.entry(a).or_default().push(forward.clone());
            incoming.entry(b).or_default().push(forward);
            outgoing.entry(b).or_default().push(backward.clone());
            incoming.entry(a).or_default().push(backward);
            Ok(())
        };

        for r in 0..rows {
            for c in 0..cols {
                if c + 1 < cols {
                    add_street(&mut network, format!("h{r}_{c}"), (r, c), (r, c + 1))?;
                }
                if r + 1 < rows {
                    add_street(&mut network, format!("v{r}_{c}"), (r, c), (r + 1, c))?;
                }
            }
        }

        for (node, arriving) in &incoming {
            let Some(leaving) = outgoing.get(node) else {
                continue;
            };
            for a in arriving {
                for b in leaving {
                    network.connect(a, b)?;
                }
            }
        }
        Ok(network)
    }

    pub fn edges(&self) -> impl Iterator<Item = &EdgeId> {
        self.lengths.keys()
    }

    pub fn contains(&self, edge: &EdgeId) -> bool {
        self.lengths.contains_key(edge)
    }

    pub fn shortest_path_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(0.0);
        }

        let mut best: HashMap<&EdgeId, f64> = HashMap::new();
        let mut heap = BinaryHeap::new();
        best.insert(from, 0.0);
        heap.push(Frontier {
            cost: 0.0,
            edge: from.clone(),
        });

        while let Some(Frontier { cost, edge }) = heap.pop() {
            if &edge == to {
                return Some(cost);
            }
            if best.get(&edge).is_some_and(|known| cost > *known) {
                continue;
            }
            let Some(next_edges) = self.successors.get(&edge) else {
                continue;
            };
            for next in next_edges {
                let Some(length) = self.lengths.get(next) else {
                    continue;
                };
                let candidate = cost + length;
                if best.get(next).is_none_or(|known| candidate < *known) {
                    best.insert(next, candidate);
                    heap.push(Frontier {
                        cost: candidate,
                        edge: next.clone(),
                    });
                }
            }
        }
        None
    }
}

impl Navigator for RoadNetwork {
    fn estimate_cost(&self, from: &EdgeId, to: &EdgeId) -> Option<f64> {
        self.shortest_path_cost(from, to)
    }
}
