//! Route assignment over the road network
//!
//! The first candidate for any origin/destination pair is always the A*
//! shortest path. Further candidates come from a goal-biased random walk,
//! which gives route diversity but makes no optimality promise: a secondary
//! route may be arbitrarily longer than the shortest one, and walks that
//! strand themselves are thrown away.

use log::debug;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::HashSet;

use super::error::SimResult;
use super::road_network::RoadNetwork;
use super::types::{GridPos, Route};

/// Controls how many candidate routes are generated per trip
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingPolicy {
    /// Upper bound on candidates per trip, shortest path included
    pub alternative_routes: usize,
    /// Scale of the uniform noise added to each walk step weight
    pub walk_noise: f64,
    /// Extra walks tried for a candidate slot after a walk strands itself.
    /// With zero retries the caller simply receives fewer candidates.
    pub walk_retries: usize,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            alternative_routes: 3,
            walk_noise: 0.3,
            walk_retries: 0,
        }
    }
}

/// Shortest-path and alternative-route generation with a path cache
pub struct RouteFinder<'a> {
    network: &'a RoadNetwork,
    policy: RoutingPolicy,

    /// Cached shortest paths keyed by (origin, destination)
    path_cache: HashMap<(GridPos, GridPos), Route>,
}

impl<'a> RouteFinder<'a> {
    pub fn new(network: &'a RoadNetwork, policy: RoutingPolicy) -> Self {
        Self {
            network,
            policy,
            path_cache: HashMap::new(),
        }
    }

    /// A* shortest path, served from the cache when possible
    pub fn shortest_path(&mut self, start: GridPos, end: GridPos) -> SimResult<Route> {
        if let Some(path) = self.path_cache.get(&(start, end)) {
            return Ok(path.clone());
        }

        let path = self.network.shortest_path(start, end)?;
        self.path_cache.insert((start, end), path.clone());
        Ok(path)
    }

    /// Up to `policy.alternative_routes` candidate routes.
    ///
    /// Element 0 is always the shortest path. Every returned route starts at
    /// `start`, ends at `end` and never revisits a position.
    pub fn alternative_routes<R: Rng>(
        &mut self,
        start: GridPos,
        end: GridPos,
        rng: &mut R,
    ) -> SimResult<Vec<Route>> {
        let mut routes = vec![self.shortest_path(start, end)?];

        for _ in 1..self.policy.alternative_routes {
            let attempts = 1 + self.policy.walk_retries;
            match (0..attempts).find_map(|_| self.random_walk(start, end, rng)) {
                Some(route) => routes.push(route),
                None => debug!(
                    "Discarded alternative route {} -> {} after {} walk(s)",
                    start, end, attempts
                ),
            }
        }

        Ok(routes)
    }

    /// Picks one candidate uniformly at random
    pub fn choose_route<R: Rng>(
        &mut self,
        start: GridPos,
        end: GridPos,
        rng: &mut R,
    ) -> SimResult<Route> {
        let mut routes = self.alternative_routes(start, end, rng)?;
        let index = rng.random_range(0..routes.len());
        Ok(routes.swap_remove(index))
    }

    /// Goal-biased self-avoiding walk.
    ///
    /// Each unvisited neighbour is weighted `1 / (manhattan_to_goal + 1)`
    /// plus uniform noise. Returns `None` if the walk runs out of unvisited
    /// neighbours before reaching `end`.
    pub fn random_walk<R: Rng>(
        &self,
        start: GridPos,
        end: GridPos,
        rng: &mut R,
    ) -> Option<Route> {
        if !self.network.contains(start) || !self.network.contains(end) {
            return None;
        }

        let mut visited = HashSet::from([start]);
        let mut route = vec![start];
        let mut current = start;

        while current != end {
            let candidates: Vec<GridPos> = self
                .network
                .neighbors(current)
                .into_iter()
                .filter(|next| !visited.contains(next))
                .collect();

            if candidates.is_empty() {
                return None;
            }

            let weights: Vec<f64> = candidates
                .iter()
                .map(|next| {
                    let distance = next.manhattan(&end) as f64;
                    1.0 / (distance + 1.0) + rng.random::<f64>() * self.policy.walk_noise
                })
                .collect();

            let choice = WeightedIndex::new(&weights).ok()?;
            current = candidates[choice.sample(rng)];
            visited.insert(current);
            route.push(current);
        }

        Some(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::types::is_simple_route;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn first_candidate_is_shortest() {
        let network = RoadNetwork::new(5, 1000.0).unwrap();
        let mut finder = RouteFinder::new(&network, RoutingPolicy::default());
        let mut rng = StdRng::seed_from_u64(7);

        let start = GridPos::new(0, 0);
        let end = GridPos::new(4, 3);
        let routes = finder.alternative_routes(start, end, &mut rng).unwrap();

        assert!(!routes.is_empty());
        assert!(routes.len() <= 3);
        assert_eq!(routes[0].len(), start.manhattan(&end) + 1);
        for route in &routes {
            assert_eq!(route.first(), Some(&start));
            assert_eq!(route.last(), Some(&end));
            assert!(is_simple_route(route));
        }
    }

    #[test]
    fn single_candidate_policy_returns_shortest_only() {
        let network = RoadNetwork::new(4, 100.0).unwrap();
        let policy = RoutingPolicy {
            alternative_routes: 1,
            ..RoutingPolicy::default()
        };
        let mut finder = RouteFinder::new(&network, policy);
        let mut rng = StdRng::seed_from_u64(1);
        let routes = finder
            .alternative_routes(GridPos::new(0, 0), GridPos::new(3, 3), &mut rng)
            .unwrap();
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn walk_to_self_is_trivial() {
        let network = RoadNetwork::new(1, 100.0).unwrap();
        let finder = RouteFinder::new(&network, RoutingPolicy::default());
        let mut rng = StdRng::seed_from_u64(3);
        let pos = GridPos::new(0, 0);
        assert_eq!(finder.random_walk(pos, pos, &mut rng), Some(vec![pos]));
    }

    #[test]
    fn walk_into_isolated_corner_is_discarded() {
        let corner = GridPos::new(0, 0);
        let closed = [(corner, GridPos::new(0, 1)), (corner, GridPos::new(1, 0))];
        let network = RoadNetwork::with_closed_segments(3, 100.0, &closed).unwrap();
        let finder = RouteFinder::new(&network, RoutingPolicy::default());
        let mut rng = StdRng::seed_from_u64(11);
        assert_eq!(finder.random_walk(GridPos::new(2, 2), corner, &mut rng), None);
    }

    #[test]
    fn same_seed_same_routes() {
        let network = RoadNetwork::new(6, 100.0).unwrap();
        let start = GridPos::new(0, 5);
        let end = GridPos::new(5, 0);

        let run = |seed| {
            let mut finder = RouteFinder::new(&network, RoutingPolicy::default());
            let mut rng = StdRng::seed_from_u64(seed);
            finder.alternative_routes(start, end, &mut rng).unwrap()
        };

        assert_eq!(run(99), run(99));
    }

    #[test]
    fn cache_returns_same_path() {
        let network = RoadNetwork::new(5, 100.0).unwrap();
        let mut finder = RouteFinder::new(&network, RoutingPolicy::default());
        let a = finder
            .shortest_path(GridPos::new(0, 0), GridPos::new(4, 4))
            .unwrap();
        let b = finder
            .shortest_path(GridPos::new(0, 0), GridPos::new(4, 4))
            .unwrap();
        assert_eq!(a, b);
    }
}
