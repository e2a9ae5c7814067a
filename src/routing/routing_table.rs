use rustc_hash::FxHashMap;
use tracing::trace;

use crate::endpoint::endpoint_id::EndpointId;

/// One way of reaching a destination: the direct peer to hand the message to,
/// and the number of hops along that path.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Route {
    pub next_hop: EndpointId,
    pub distance: usize,
}

/// Per-node view of the mesh: for each known destination endpoint, the set of
/// direct peers through which it can be reached, with hop counts. A node is
/// always at distance 0 from itself, and a direct peering has hop cost 1.
#[derive(Debug)]
pub struct RoutingTable {
    self_id: EndpointId,
    routes: FxHashMap<EndpointId, Vec<Route>>,
}

impl RoutingTable {
    pub fn new(self_id: EndpointId) -> RoutingTable {
        RoutingTable {
            self_id,
            routes: FxHashMap::default(),
        }
    }

    /// Add or improve a path. Idempotent on `(dst, next_hop)`: re-inserting
    /// keeps the shorter of the two distances.
    pub fn insert(&mut self, dst: EndpointId, next_hop: EndpointId, distance: usize) {
        if dst == self.self_id {
            return;
        }
        let routes = self.routes.entry(dst).or_default();
        match routes.iter_mut().find(|r| r.next_hop == next_hop) {
            Some(route) => {
                if distance < route.distance {
                    route.distance = distance;
                }
            }
            None => routes.push(Route { next_hop, distance }),
        }
    }

    /// Drop every path routed through `next_hop` (typically because that
    /// peering went away). Destinations that become unreachable disappear
    /// from the table.
    pub fn remove_next_hop(&mut self, next_hop: EndpointId) {
        self.routes.retain(|dst, routes| {
            routes.retain(|r| r.next_hop != next_hop);
            if routes.is_empty() {
                trace!("{:?} became unreachable", dst);
            }
            !routes.is_empty()
        });
    }

    /// minimum hop count to `dst`, `None` if unreachable
    pub fn distance_to(&self, dst: EndpointId) -> Option<usize> {
        if dst == self.self_id {
            return Some(0);
        }
        self.routes
            .get(&dst)?
            .iter()
            .map(|r| r.distance)
            .min()
    }

    /// Minimum hop count to `dst` over paths that do *not* go through
    /// `excluded_hop`. This is what gets advertised to a peer: routes that
    /// only exist through that peer are worthless to it.
    pub fn distance_to_excluding(
        &self,
        dst: EndpointId,
        excluded_hop: EndpointId,
    ) -> Option<usize> {
        if dst == self.self_id {
            return Some(0);
        }
        self.routes
            .get(&dst)?
            .iter()
            .filter(|r| r.next_hop != excluded_hop)
            .map(|r| r.distance)
            .min()
    }

    /// all next hops tied for the minimum distance to `dst`
    pub fn next_hops_for(&self, dst: EndpointId) -> impl Iterator<Item = EndpointId> + '_ {
        let min_distance = self.distance_to(dst);
        self.routes
            .get(&dst)
            .into_iter()
            .flatten()
            .filter(move |r| Some(r.distance) == min_distance)
            .map(|r| r.next_hop)
    }

    /// all known destinations (not including this node itself)
    pub fn reachable(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.routes.keys().copied()
    }

    /// Merge a peer's advertised view of the mesh. The advertisement is the
    /// peer's complete current table, so all previous paths through that peer
    /// are replaced: stale destinations die with the old entries. Advertised
    /// distances grow by one hop for the link to the peer; entries for this
    /// node itself are ignored, and the direct route to the peer is implied
    /// by the advertisement's existence.
    pub fn apply_advertisement(
        &mut self,
        from: EndpointId,
        distances: &FxHashMap<EndpointId, usize>,
    ) {
        self.remove_next_hop(from);
        self.insert(from, from, 1);
        for (&dst, &distance) in distances {
            if dst == self.self_id {
                continue;
            }
            self.insert(dst, from, distance + 1);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_util::test_endpoint_id;

    #[test]
    fn test_distance_to_self_is_zero() {
        let tbl = RoutingTable::new(test_endpoint_id(1));
        assert_eq!(tbl.distance_to(test_endpoint_id(1)), Some(0));
    }

    #[test]
    fn test_unknown_destination_is_unreachable() {
        let tbl = RoutingTable::new(test_endpoint_id(1));
        assert_eq!(tbl.distance_to(test_endpoint_id(9)), None);
    }

    #[test]
    fn test_insert_keeps_minimum_distance_per_next_hop() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        tbl.insert(test_endpoint_id(3), test_endpoint_id(2), 4);
        tbl.insert(test_endpoint_id(3), test_endpoint_id(2), 2);
        tbl.insert(test_endpoint_id(3), test_endpoint_id(2), 7);
        assert_eq!(tbl.distance_to(test_endpoint_id(3)), Some(2));
    }

    #[test]
    fn test_self_entries_are_not_inserted() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        tbl.insert(test_endpoint_id(1), test_endpoint_id(2), 3);
        assert_eq!(tbl.distance_to(test_endpoint_id(1)), Some(0));
        assert_eq!(tbl.reachable().count(), 0);
    }

    #[test]
    fn test_next_hops_for_returns_all_tied_minima() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        tbl.insert(test_endpoint_id(5), test_endpoint_id(2), 2);
        tbl.insert(test_endpoint_id(5), test_endpoint_id(3), 2);
        tbl.insert(test_endpoint_id(5), test_endpoint_id(4), 3);

        let mut hops: Vec<_> = tbl.next_hops_for(test_endpoint_id(5)).collect();
        hops.sort();
        assert_eq!(hops, vec![test_endpoint_id(2), test_endpoint_id(3)]);
    }

    #[test]
    fn test_distance_excluding_skips_paths_through_the_excluded_hop() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        tbl.insert(test_endpoint_id(5), test_endpoint_id(2), 2);
        tbl.insert(test_endpoint_id(5), test_endpoint_id(3), 4);

        assert_eq!(
            tbl.distance_to_excluding(test_endpoint_id(5), test_endpoint_id(2)),
            Some(4)
        );
        assert_eq!(
            tbl.distance_to_excluding(test_endpoint_id(5), test_endpoint_id(9)),
            Some(2)
        );
        tbl.remove_next_hop(test_endpoint_id(3));
        assert_eq!(
            tbl.distance_to_excluding(test_endpoint_id(5), test_endpoint_id(2)),
            None
        );
    }

    #[test]
    fn test_remove_next_hop_drops_all_paths_through_it() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        tbl.insert(test_endpoint_id(2), test_endpoint_id(2), 1);
        tbl.insert(test_endpoint_id(5), test_endpoint_id(2), 2);
        tbl.insert(test_endpoint_id(5), test_endpoint_id(3), 3);

        tbl.remove_next_hop(test_endpoint_id(2));
        assert_eq!(tbl.distance_to(test_endpoint_id(2)), None);
        assert_eq!(tbl.distance_to(test_endpoint_id(5)), Some(3));
    }

    #[test]
    fn test_apply_advertisement_increments_distances() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        let mut advertised = FxHashMap::default();
        advertised.insert(test_endpoint_id(3), 1);
        advertised.insert(test_endpoint_id(4), 2);

        tbl.apply_advertisement(test_endpoint_id(2), &advertised);
        assert_eq!(tbl.distance_to(test_endpoint_id(2)), Some(1));
        assert_eq!(tbl.distance_to(test_endpoint_id(3)), Some(2));
        assert_eq!(tbl.distance_to(test_endpoint_id(4)), Some(3));
    }

    #[test]
    fn test_apply_advertisement_ignores_self_entries() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        let mut advertised = FxHashMap::default();
        advertised.insert(test_endpoint_id(1), 1);

        tbl.apply_advertisement(test_endpoint_id(2), &advertised);
        assert_eq!(tbl.distance_to(test_endpoint_id(1)), Some(0));
        assert_eq!(tbl.reachable().count(), 1); // just the peer itself
    }

    #[test]
    fn test_apply_advertisement_replaces_stale_paths() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));
        let mut advertised = FxHashMap::default();
        advertised.insert(test_endpoint_id(3), 1);
        tbl.apply_advertisement(test_endpoint_id(2), &advertised);
        assert_eq!(tbl.distance_to(test_endpoint_id(3)), Some(2));

        // the peer lost its route to 3; a fresh advertisement replaces the view
        tbl.apply_advertisement(test_endpoint_id(2), &FxHashMap::default());
        assert_eq!(tbl.distance_to(test_endpoint_id(3)), None);
        assert_eq!(tbl.distance_to(test_endpoint_id(2)), Some(1));
    }

    /// distance(X) never exceeds distance(Y) + hops(Y, X) for any
    /// intermediate Y the table knows a path through
    #[test]
    fn test_triangle_inequality_over_chain() {
        let mut tbl = RoutingTable::new(test_endpoint_id(1));

        // direct peer 2 advertises a chain 2 - 3 - 4, and peer 3 is also
        // directly peered
        let mut adv2 = FxHashMap::default();
        adv2.insert(test_endpoint_id(3), 1);
        adv2.insert(test_endpoint_id(4), 2);
        tbl.apply_advertisement(test_endpoint_id(2), &adv2);

        let mut adv3 = FxHashMap::default();
        adv3.insert(test_endpoint_id(2), 1);
        adv3.insert(test_endpoint_id(4), 1);
        tbl.apply_advertisement(test_endpoint_id(3), &adv3);

        let d = |n: u8| tbl.distance_to(test_endpoint_id(n)).unwrap();
        assert_eq!(d(2), 1);
        assert_eq!(d(3), 1);
        assert_eq!(d(4), 2);
        assert!(d(4) <= d(3) + 1);
        assert!(d(4) <= d(2) + 2);
    }
}
