//! Picking the route to replay from the training results.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{info, warn};

use crate::infra::SegmentId;
use crate::planners::rl::EpochResult;

#[derive(Debug, Clone, PartialEq)]
pub struct BestRoute {
    pub epoch: usize,
    pub episode_reward_mean: f32,
    pub route: Vec<SegmentId>,
}

/// Epoch with the highest reward mean that found at least one route; among
/// its shortest routes the one with the most preferred segments.
pub fn select_best_route(
    results: &[EpochResult],
    preferred: &HashMap<SegmentId, f32>,
) -> Option<BestRoute> {
    let mut ranked: Vec<(&EpochResult, f32)> = results
        .iter()
        .filter_map(|result| result.episode_reward_mean.map(|mean| (result, mean)))
        .collect();
    // Stable sort keeps the earliest epoch first on ties.
    ranked.sort_by(|(_, a), (_, b)| b.partial_cmp(a).unwrap_or(Ordering::Equal));

    let Some((best, _)) = ranked.first() else {
        warn!("No epoch finished an episode");
        return None;
    };
    info!(
        "Epoch with the highest episode_reward_mean: {} ({:?})",
        best.epoch, best.episode_reward_mean
    );

    let (result, mean) = ranked.iter().find(|(result, _)| !result.routes.is_empty())?;
    if result.epoch != best.epoch {
        warn!(
            "Epoch {} found no route, using epoch {} instead",
            best.epoch, result.epoch
        );
    }

    let shortest = shortest_unique_routes(&result.routes);
    let route = most_preferred(&shortest, preferred)?.clone();
    info!("Best route ({} segments): {}", route.len(), route.join(" "));

    Some(BestRoute {
        epoch: result.epoch,
        episode_reward_mean: *mean,
        route,
    })
}

/// Routes of minimal length without duplicates, in first-found order.
pub fn shortest_unique_routes(routes: &[Vec<SegmentId>]) -> Vec<&Vec<SegmentId>> {
    let Some(min_len) = routes.iter().map(Vec::len).min() else {
        return Vec::new();
    };
    let mut shortest: Vec<&Vec<SegmentId>> = Vec::new();
    for route in routes.iter().filter(|route| route.len() == min_len) {
        if !shortest.contains(&route) {
            shortest.push(route);
        }
    }
    shortest
}

/// First route with the highest count of preferred segments.
pub fn most_preferred<'a>(
    routes: &[&'a Vec<SegmentId>],
    preferred: &HashMap<SegmentId, f32>,
) -> Option<&'a Vec<SegmentId>> {
    let count = |route: &Vec<SegmentId>| route.iter().filter(|s| preferred.contains_key(*s)).count();

    let mut best: Option<(&'a Vec<SegmentId>, usize)> = None;
    for &route in routes {
        let preferred_count = count(route);
        if best.is_none_or(|(_, best_count)| preferred_count > best_count) {
            best = Some((route, preferred_count));
        }
    }
    best.map(|(route, _)| route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(ids: &[&str]) -> Vec<SegmentId> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    fn epoch(epoch: usize, mean: Option<f32>, routes: Vec<Vec<SegmentId>>) -> EpochResult {
        EpochResult {
            epoch,
            episode_reward_mean: mean,
            episodes: routes.len(),
            routes,
        }
    }

    #[test]
    fn test_shortest_unique_routes() {
        let routes = vec![
            route(&["E4", "A", "C", "E1"]),
            route(&["E4", "B", "E1"]),
            route(&["E4", "A", "E1"]),
            route(&["E4", "B", "E1"]),
        ];

        let shortest = shortest_unique_routes(&routes);

        assert_eq!(shortest, vec![&routes[1], &routes[2]]);
    }

    #[test]
    fn test_preferred_count_breaks_ties() {
        let preferred = HashMap::from([("E3".to_string(), 5.0), ("E6".to_string(), 5.0)]);
        let plain = route(&["E4", "A", "E1"]);
        let scenic = route(&["E4", "E3", "E1"]);

        assert_eq!(most_preferred(&[&plain, &scenic], &preferred), Some(&scenic));
        assert_eq!(most_preferred(&[&plain, &scenic], &HashMap::new()), Some(&plain));
        assert_eq!(most_preferred(&[], &preferred), None);
    }

    #[test]
    fn test_best_epoch_by_reward_mean() {
        let results = vec![
            epoch(0, None, vec![]),
            epoch(1, Some(-3.0), vec![route(&["E4", "A", "B", "E1"])]),
            epoch(2, Some(7.5), vec![route(&["E4", "A", "B", "E1"]), route(&["E4", "C", "E1"])]),
            epoch(3, Some(7.5), vec![route(&["E4", "D", "E1"])]),
        ];

        let best = select_best_route(&results, &HashMap::new()).unwrap();

        assert_eq!(best.epoch, 2);
        assert_eq!(best.episode_reward_mean, 7.5);
        assert_eq!(best.route, route(&["E4", "C", "E1"]));
    }

    #[test]
    fn test_falls_back_to_epoch_with_routes() {
        let results = vec![
            epoch(0, Some(1.0), vec![route(&["E4", "A", "E1"])]),
            epoch(1, Some(4.0), vec![]),
            epoch(2, Some(2.0), vec![route(&["E4", "B", "E1"])]),
        ];

        let best = select_best_route(&results, &HashMap::new()).unwrap();

        assert_eq!(best.epoch, 2);
        assert_eq!(best.route, route(&["E4", "B", "E1"]));
    }

    #[test]
    fn test_no_routes_at_all() {
        let results = vec![epoch(0, Some(-10.0), vec![]), epoch(1, None, vec![])];
        assert_eq!(select_best_route(&results, &HashMap::new()), None);
        assert_eq!(select_best_route(&[], &HashMap::new()), None);
    }
}
