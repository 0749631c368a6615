use super::servers::Servers;
use crate::pool::server::PoolState;
use crate::pool::Server;
use common::{ReadMode, TagSet};
use parking_lot::RwLockReadGuard;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_LATENCY_TOLERANCE: Duration = Duration::from_millis(15);

impl Servers {
    /// Picks the most suitable server for an operation right now.
    ///
    /// A single pass over the servers in address order keeps the running
    /// best read-locked and locks one challenger at a time; whichever loses
    /// is unlocked immediately. Because locks are always taken in address
    /// order, concurrent scans cannot deadlock.
    ///
    /// Rules, first match decides:
    /// 1. outside `tag_sets` (routers exempt): never chosen;
    /// 2. a non-router primary under [`ReadMode::Secondary`]: never chosen;
    /// 3. differing roles, unless [`ReadMode::Nearest`]: secondaries win, or
    ///    the primary under [`ReadMode::PrimaryPreferred`];
    /// 4. latencies further apart than the tolerance: lower latency wins;
    /// 5. fewer connections in use wins.
    ///
    /// Otherwise the current best stays.
    pub fn best_fit(&self, mode: ReadMode, tag_sets: &[TagSet]) -> Option<Arc<Server>> {
        let mut best: Option<(&Arc<Server>, RwLockReadGuard<'_, PoolState>)> = None;

        for next in self.as_slice() {
            let next_state = next.read_state();
            if disqualified(&next_state, mode, tag_sets) {
                continue;
            }
            let swap = match &best {
                None => true,
                Some((_, best_state)) => {
                    prefers_next(mode, self.latency_tolerance, best_state, &next_state)
                }
            };
            if swap {
                best = Some((next, next_state));
            }
        }

        best.map(|(server, _state)| Arc::clone(server))
    }
}

fn disqualified(state: &PoolState, mode: ReadMode, tag_sets: &[TagSet]) -> bool {
    let info = state.info();
    if info.router {
        return false;
    }
    if !tag_sets.is_empty() && !info.has_tags(tag_sets) {
        return true;
    }
    mode == ReadMode::Secondary && info.primary
}

fn prefers_next(mode: ReadMode, tolerance: Duration, best: &PoolState, next: &PoolState) -> bool {
    let (best_primary, next_primary) = (best.info().primary, next.info().primary);
    if next_primary != best_primary && mode != ReadMode::Nearest {
        return (mode == ReadMode::PrimaryPreferred) != best_primary;
    }

    let (best_latency, next_latency) = (best.latency(), next.latency());
    if abs_diff(next_latency, best_latency) > tolerance {
        return next_latency < best_latency;
    }

    next.in_use() < best.in_use()
}

fn abs_diff(a: Duration, b: Duration) -> Duration {
    if a > b {
        a - b
    } else {
        b - a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::mock::server_with_info;
    use common::{ServerInfo, Tag};

    const TIMEOUT: Duration = Duration::from_secs(1);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn secondary() -> ServerInfo {
        ServerInfo::default()
    }

    fn primary() -> ServerInfo {
        ServerInfo {
            primary: true,
            ..Default::default()
        }
    }

    fn router() -> ServerInfo {
        ServerInfo {
            router: true,
            ..Default::default()
        }
    }

    fn tagged(dc: &str) -> ServerInfo {
        ServerInfo {
            tags: vec![Tag::new("dc", dc)],
            ..Default::default()
        }
    }

    fn registry(servers: &[Arc<Server>]) -> Servers {
        let mut registry = Servers::new();
        for server in servers {
            registry.add(Arc::clone(server));
        }
        registry
    }

    fn east_filter() -> Vec<TagSet> {
        vec![vec![Tag::new("dc", "east")]]
    }

    fn chosen(registry: &Servers, mode: ReadMode, tag_sets: &[TagSet]) -> Option<String> {
        registry
            .best_fit(mode, tag_sets)
            .map(|s| s.resolved_addr().to_string())
    }

    #[tokio::test]
    async fn test_empty_registry() {
        assert!(Servers::new().best_fit(ReadMode::Nearest, &[]).is_none());
    }

    #[tokio::test]
    async fn test_tag_filter_selects_matching() {
        let west = server_with_info("10.0.0.1:27017", tagged("west"));
        let east = server_with_info("10.0.0.2:27017", tagged("east"));
        let registry = registry(&[west, east]);

        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &east_filter()).as_deref(),
            Some("10.0.0.2:27017")
        );
    }

    #[tokio::test]
    async fn test_tag_filter_without_match() {
        let registry = registry(&[server_with_info("10.0.0.1:27017", tagged("west"))]);
        assert!(registry.best_fit(ReadMode::Nearest, &east_filter()).is_none());
    }

    #[tokio::test]
    async fn test_router_ignores_tag_filter() {
        let registry = registry(&[server_with_info("10.0.0.1:27017", router())]);
        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &east_filter()).as_deref(),
            Some("10.0.0.1:27017")
        );
    }

    #[tokio::test]
    async fn test_secondary_mode_skips_primary() {
        let only_primary = registry(&[server_with_info("10.0.0.1:27017", primary())]);
        assert!(only_primary.best_fit(ReadMode::Secondary, &[]).is_none());

        let mixed = registry(&[
            server_with_info("10.0.0.1:27017", primary()),
            server_with_info("10.0.0.2:27017", secondary()),
        ]);
        assert_eq!(
            chosen(&mixed, ReadMode::Secondary, &[]).as_deref(),
            Some("10.0.0.2:27017")
        );

        let routed = registry(&[server_with_info(
            "10.0.0.1:27017",
            ServerInfo {
                primary: true,
                router: true,
                ..Default::default()
            },
        )]);
        assert!(routed.best_fit(ReadMode::Secondary, &[]).is_some());
    }

    #[tokio::test]
    async fn test_role_preference() {
        let p = server_with_info("10.0.0.1:27017", primary());
        let s = server_with_info("10.0.0.2:27017", secondary());
        // The primary is far closer; role still decides outside Nearest.
        p.record_latency(ms(1));
        s.record_latency(ms(100));
        let registry = registry(&[p, s]);

        assert_eq!(
            chosen(&registry, ReadMode::SecondaryPreferred, &[]).as_deref(),
            Some("10.0.0.2:27017")
        );
        assert_eq!(
            chosen(&registry, ReadMode::PrimaryPreferred, &[]).as_deref(),
            Some("10.0.0.1:27017")
        );
        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.1:27017")
        );
    }

    #[tokio::test]
    async fn test_latency_beyond_tolerance_wins() {
        let slow = server_with_info("10.0.0.1:27017", secondary());
        let fast = server_with_info("10.0.0.2:27017", secondary());
        slow.record_latency(ms(30));
        fast.record_latency(ms(5));
        // Give the fast one more load; latency still decides.
        let _busy = fast.acquire(0, TIMEOUT).await.unwrap();
        let registry = registry(&[slow, fast]);

        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.2:27017")
        );
    }

    #[tokio::test]
    async fn test_latency_within_tolerance_falls_back_to_load() {
        let near = server_with_info("10.0.0.1:27017", secondary());
        let idle = server_with_info("10.0.0.2:27017", secondary());
        near.record_latency(ms(5));
        idle.record_latency(ms(12));
        let _busy = near.acquire(0, TIMEOUT).await.unwrap();
        let registry = registry(&[near, idle]);

        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.2:27017")
        );
    }

    #[tokio::test]
    async fn test_unprobed_server_loses_latency_tie_break() {
        let unprobed = server_with_info("10.0.0.1:27017", secondary());
        let probed = server_with_info("10.0.0.2:27017", secondary());
        probed.record_latency(ms(200));
        let registry = registry(&[unprobed, probed]);

        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.2:27017")
        );
    }

    #[tokio::test]
    async fn test_equal_candidates_keep_first() {
        let a = server_with_info("10.0.0.1:27017", secondary());
        let b = server_with_info("10.0.0.2:27017", secondary());
        a.record_latency(ms(5));
        b.record_latency(ms(5));
        let registry = registry(&[a, b]);

        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.1:27017")
        );
    }

    #[tokio::test]
    async fn test_disqualified_first_candidate_is_replaced() {
        let primary_first = server_with_info("10.0.0.1:27017", primary());
        let west = server_with_info("10.0.0.2:27017", tagged("west"));
        let east = server_with_info("10.0.0.3:27017", tagged("east"));
        let registry = registry(&[primary_first, west, east]);

        assert_eq!(
            chosen(&registry, ReadMode::Secondary, &east_filter()).as_deref(),
            Some("10.0.0.3:27017")
        );
    }

    #[tokio::test]
    async fn test_custom_tolerance() {
        let mut registry = Servers::with_latency_tolerance(ms(50));
        let a = server_with_info("10.0.0.1:27017", secondary());
        let b = server_with_info("10.0.0.2:27017", secondary());
        a.record_latency(ms(40));
        b.record_latency(ms(5));
        let _busy = b.acquire(0, TIMEOUT).await.unwrap();
        registry.add(a);
        registry.add(b);

        // 35ms apart is inside a 50ms tolerance, so load decides.
        assert_eq!(
            chosen(&registry, ReadMode::Nearest, &[]).as_deref(),
            Some("10.0.0.1:27017")
        );
    }
}
