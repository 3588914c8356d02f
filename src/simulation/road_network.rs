//! Road network graph for pathfinding
//!
//! A square grid of intersections joined by two-way segments of fixed length.
//! Each direction of a segment is a separate edge of a directed graph so that
//! closures and other custom topologies stay expressible.

use log::debug;
use petgraph::algo::astar;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;

use super::error::{SimError, SimResult};
use super::types::{GridPos, IntersectionId, Route};

/// Offsets probed when listing neighbours, in a fixed order
const NEIGHBOR_OFFSETS: [(isize, isize); 4] = [(0, 1), (0, -1), (1, 0), (-1, 0)];

/// Edge data for the road network graph
#[derive(Debug, Clone, Copy)]
pub struct RoadEdge {
    pub length_m: f64,
    /// Uniform hop cost used by A*
    pub weight: u32,
}

/// Immutable grid road network
#[derive(Debug, Clone)]
pub struct RoadNetwork {
    grid_size: usize,
    spacing_m: f64,

    /// Node `i` holds the position with intersection id `i`
    graph: DiGraph<GridPos, RoadEdge>,
}

impl RoadNetwork {
    /// Builds a fully connected `grid_size` x `grid_size` network
    pub fn new(grid_size: usize, spacing_m: f64) -> SimResult<Self> {
        Self::with_closed_segments(grid_size, spacing_m, &[])
    }

    /// Builds the grid with the listed segments removed in both directions
    pub fn with_closed_segments(
        grid_size: usize,
        spacing_m: f64,
        closed: &[(GridPos, GridPos)],
    ) -> SimResult<Self> {
        if grid_size == 0 {
            return Err(SimError::config("grid_size", "must be at least 1"));
        }
        if spacing_m.is_nan() || spacing_m <= 0.0 {
            return Err(SimError::config("spacing_m", "must be positive"));
        }

        let closed: HashSet<(GridPos, GridPos)> = closed
            .iter()
            .flat_map(|&(a, b)| [(a, b), (b, a)])
            .collect();

        let mut graph = DiGraph::with_capacity(grid_size * grid_size, 4 * grid_size * grid_size);
        for x in 0..grid_size {
            for y in 0..grid_size {
                graph.add_node(GridPos::new(x, y));
            }
        }

        let mut network = Self {
            grid_size,
            spacing_m,
            graph,
        };

        for node in network.graph.node_indices().collect::<Vec<_>>() {
            let from = network.graph[node];
            for to in network.grid_neighbors(from) {
                if closed.contains(&(from, to)) {
                    debug!("Segment {} -> {} closed", from, to);
                    continue;
                }
                let edge = RoadEdge {
                    length_m: spacing_m,
                    weight: 1,
                };
                let target = network.node(to);
                network.graph.add_edge(node, target, edge);
            }
        }

        Ok(network)
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    /// Length of one hop between adjacent intersections
    pub fn spacing_m(&self) -> f64 {
        self.spacing_m
    }

    pub fn contains(&self, pos: GridPos) -> bool {
        pos.x < self.grid_size && pos.y < self.grid_size
    }

    pub fn intersection_id(&self, pos: GridPos) -> IntersectionId {
        IntersectionId::of(pos, self.grid_size)
    }

    /// Get number of intersections
    pub fn intersection_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Get number of directed road edges
    pub fn road_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All positions in intersection-id order
    pub fn positions(&self) -> impl Iterator<Item = GridPos> + '_ {
        self.graph.node_weights().copied()
    }

    /// Adjacent positions reachable by an open road segment
    pub fn neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        if !self.contains(pos) {
            return Vec::new();
        }
        let node = self.node(pos);
        self.grid_neighbors(pos)
            .into_iter()
            .filter(|next| self.graph.contains_edge(node, self.node(*next)))
            .collect()
    }

    /// Shortest route from `start` to `end`, both inclusive.
    ///
    /// A* with the Manhattan distance heuristic. On a uniform grid the
    /// heuristic is consistent, so the returned route has optimal hop count.
    pub fn shortest_path(&self, start: GridPos, end: GridPos) -> SimResult<Route> {
        let failure = || SimError::RoutingFailure {
            from: start,
            to: end,
        };

        if !self.contains(start) || !self.contains(end) {
            return Err(failure());
        }
        if start == end {
            return Ok(vec![start]);
        }

        let goal = self.node(end);
        let (_, node_path) = astar(
            &self.graph,
            self.node(start),
            |node| node == goal,
            |edge| edge.weight().weight,
            |node| self.graph[node].manhattan(&end) as u32,
        )
        .ok_or_else(failure)?;

        Ok(node_path.into_iter().map(|node| self.graph[node]).collect())
    }

    fn node(&self, pos: GridPos) -> NodeIndex {
        NodeIndex::new(self.intersection_id(pos).0)
    }

    /// In-bounds cardinal neighbours, ignoring closures
    fn grid_neighbors(&self, pos: GridPos) -> Vec<GridPos> {
        NEIGHBOR_OFFSETS
            .iter()
            .filter_map(|&(dx, dy)| {
                let x = pos.x.checked_add_signed(dx)?;
                let y = pos.y.checked_add_signed(dy)?;
                let next = GridPos::new(x, y);
                self.contains(next).then_some(next)
            })
            .collect()
    }
}
