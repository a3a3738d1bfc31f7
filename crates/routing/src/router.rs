use std::time::Duration;

use {
    dashmap::{DashMap, mapref::entry::Entry},
    relaydesk_common::{OperatorId, UserId},
    tracing::{debug, info},
};

#[cfg(feature = "metrics")]
use relaydesk_metrics::{counter, gauge, state as state_metrics};

/// A live binding from one operator to one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyRoute {
    pub operator_id: OperatorId,
    pub target: UserId,
    /// When the operator claimed `target`.
    pub claimed_at: u64,
    /// Last claim or reply; expiry is measured from here.
    pub bound_at: u64,
}

/// Per-operator routing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RouteState {
    #[default]
    Unbound,
    Bound(ReplyRoute),
}

impl RouteState {
    #[must_use]
    pub fn target(&self) -> Option<UserId> {
        match self {
            Self::Unbound => None,
            Self::Bound(route) => Some(route.target),
        }
    }

    #[must_use]
    pub fn is_bound(&self) -> bool {
        matches!(self, Self::Bound(_))
    }
}

/// Operator → user bindings.
///
/// An operator holds at most one route. A user may be the target of several
/// operators at once. Single-key operations use the entry API so they are
/// atomic per operator; sweeps lock one shard at a time.
#[derive(Debug, Default)]
pub struct ReplyRouter {
    routes: DashMap<OperatorId, RouteState>,
}

impl ReplyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `operator` to `target`, replacing any existing route.
    /// Returns the previous target, if there was one.
    pub fn bind(&self, operator: OperatorId, target: UserId, now: u64) -> Option<UserId> {
        let route = RouteState::Bound(ReplyRoute {
            operator_id: operator,
            target,
            claimed_at: now,
            bound_at: now,
        });
        let previous = match self.routes.entry(operator) {
            Entry::Occupied(mut occupied) => occupied.insert(route).target(),
            Entry::Vacant(vacant) => {
                vacant.insert(route);
                None
            },
        };
        debug!(operator_id = %operator, user_id = %target, ?previous, "route bound");
        self.report_bound();
        previous
    }

    pub fn route_for(&self, operator: OperatorId) -> Option<UserId> {
        self.state(operator).target()
    }

    pub fn route(&self, operator: OperatorId) -> Option<ReplyRoute> {
        match self.state(operator) {
            RouteState::Bound(route) => Some(route),
            RouteState::Unbound => None,
        }
    }

    pub fn state(&self, operator: OperatorId) -> RouteState {
        self.routes
            .get(&operator)
            .map(|s| *s.value())
            .unwrap_or_default()
    }

    /// Refresh the expiry clock of a bound route. No-op when unbound.
    pub fn touch(&self, operator: OperatorId, now: u64) -> bool {
        match self.routes.get_mut(&operator) {
            Some(mut state) => match state.value_mut() {
                RouteState::Bound(route) => {
                    route.bound_at = route.bound_at.max(now);
                    true
                },
                RouteState::Unbound => false,
            },
            None => false,
        }
    }

    /// Drop the operator's route. Idempotent. Returns the target it pointed at.
    pub fn unbind(&self, operator: OperatorId) -> Option<UserId> {
        let previous = self
            .routes
            .get_mut(&operator)
            .and_then(|mut state| std::mem::take(state.value_mut()).target());
        if let Some(target) = previous {
            debug!(operator_id = %operator, user_id = %target, "route unbound");
        }
        self.report_bound();
        previous
    }

    /// Drop the operator's route only if it still points at `target`.
    ///
    /// Used after a failed reply, where the operator may have re-claimed a
    /// different user while the send was in flight.
    pub fn unbind_if_target(&self, operator: OperatorId, target: UserId) -> bool {
        let unbound = match self.routes.get_mut(&operator) {
            Some(mut state) if state.target() == Some(target) => {
                *state.value_mut() = RouteState::Unbound;
                true
            },
            _ => false,
        };
        if unbound {
            debug!(operator_id = %operator, user_id = %target, "route unbound after failure");
            self.report_bound();
        }
        unbound
    }

    /// Drop every route whose target is `target`. Returns the affected operators.
    pub fn unbind_target(&self, target: UserId) -> Vec<OperatorId> {
        let mut affected = Vec::new();
        for mut entry in self.routes.iter_mut() {
            if entry.value().target() == Some(target) {
                *entry.value_mut() = RouteState::Unbound;
                affected.push(*entry.key());
            }
        }
        affected.sort();
        self.report_bound();
        affected
    }

    /// Operators currently bound to `target`, in id order.
    pub fn operators_for(&self, target: UserId) -> Vec<OperatorId> {
        let mut operators: Vec<OperatorId> = self
            .routes
            .iter()
            .filter(|entry| entry.value().target() == Some(target))
            .map(|entry| *entry.key())
            .collect();
        operators.sort();
        operators
    }

    /// Unbind every route idle for longer than `timeout`. Returns the count expired.
    pub fn sweep(&self, timeout: Duration, now: u64) -> usize {
        let timeout_ms = timeout.as_millis() as u64;
        let mut expired = 0;
        for mut entry in self.routes.iter_mut() {
            let stale = matches!(
                entry.value(),
                RouteState::Bound(route) if now.saturating_sub(route.bound_at) > timeout_ms
            );
            if stale {
                *entry.value_mut() = RouteState::Unbound;
                expired += 1;
            }
        }
        if expired > 0 {
            info!(expired, "expired stale reply routes");
            #[cfg(feature = "metrics")]
            counter!(state_metrics::ROUTES_EXPIRED_TOTAL).increment(expired as u64);
        }
        self.report_bound();
        expired
    }

    /// All bound routes, oldest claim first.
    pub fn list(&self) -> Vec<ReplyRoute> {
        let mut routes: Vec<ReplyRoute> = self
            .routes
            .iter()
            .filter_map(|entry| match entry.value() {
                RouteState::Bound(route) => Some(*route),
                RouteState::Unbound => None,
            })
            .collect();
        routes.sort_by_key(|r| (r.claimed_at, r.operator_id));
        routes
    }

    pub fn count_bound(&self) -> usize {
        self.routes.iter().filter(|e| e.value().is_bound()).count()
    }

    fn report_bound(&self) {
        #[cfg(feature = "metrics")]
        gauge!(state_metrics::ACTIVE_ROUTES).set(self.count_bound() as f64);
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, std::sync::Arc};

    const OP: OperatorId = OperatorId(100);
    const MIN: u64 = 60_000;

    #[test]
    fn last_bind_wins() {
        let router = ReplyRouter::new();
        assert_eq!(router.bind(OP, UserId(1), 0), None);
        assert_eq!(router.bind(OP, UserId(2), 10), Some(UserId(1)));
        assert_eq!(router.route_for(OP), Some(UserId(2)));
        assert!(router.operators_for(UserId(1)).is_empty());
        assert_eq!(router.count_bound(), 1);
    }

    #[test]
    fn unbound_operator_has_explicit_state() {
        let router = ReplyRouter::new();
        assert_eq!(router.state(OP), RouteState::Unbound);
        router.bind(OP, UserId(1), 0);
        assert!(router.state(OP).is_bound());
        assert_eq!(router.unbind(OP), Some(UserId(1)));
        assert_eq!(router.state(OP), RouteState::Unbound);
        assert_eq!(router.unbind(OP), None);
    }

    #[test]
    fn several_operators_may_share_a_target() {
        let router = ReplyRouter::new();
        router.bind(OperatorId(2), UserId(9), 0);
        router.bind(OperatorId(1), UserId(9), 0);
        router.bind(OperatorId(3), UserId(8), 0);
        assert_eq!(
            router.operators_for(UserId(9)),
            vec![OperatorId(1), OperatorId(2)]
        );
        assert_eq!(
            router.unbind_target(UserId(9)),
            vec![OperatorId(1), OperatorId(2)]
        );
        assert_eq!(router.route_for(OperatorId(3)), Some(UserId(8)));
        assert_eq!(router.count_bound(), 1);
    }

    #[test]
    fn unbind_if_target_keeps_newer_claim() {
        let router = ReplyRouter::new();
        router.bind(OP, UserId(1), 0);
        router.bind(OP, UserId(2), 5);
        assert!(!router.unbind_if_target(OP, UserId(1)));
        assert_eq!(router.route_for(OP), Some(UserId(2)));
        assert!(router.unbind_if_target(OP, UserId(2)));
        assert_eq!(router.route_for(OP), None);
    }

    #[rstest]
    #[case(0, 31 * MIN, 1)]
    #[case(0, 30 * MIN, 0)]
    #[case(20 * MIN, 31 * MIN, 0)]
    fn sweep_expires_idle_routes(#[case] touched_at: u64, #[case] now: u64, #[case] expired: usize) {
        let router = ReplyRouter::new();
        router.bind(OP, UserId(1), 0);
        router.touch(OP, touched_at);
        let timeout = Duration::from_millis(30 * MIN);

        assert_eq!(router.sweep(timeout, now), expired);
        assert_eq!(router.sweep(timeout, now), 0);
        assert_eq!(router.route_for(OP).is_none(), expired == 1);
    }

    #[test]
    fn touch_on_unbound_is_noop() {
        let router = ReplyRouter::new();
        assert!(!router.touch(OP, 5));
        assert_eq!(router.state(OP), RouteState::Unbound);
    }

    #[test]
    fn list_orders_by_claim_time() {
        let router = ReplyRouter::new();
        router.bind(OperatorId(1), UserId(1), 30);
        router.bind(OperatorId(2), UserId(2), 10);
        router.bind(OperatorId(3), UserId(3), 20);
        router.unbind(OperatorId(3));
        let ops: Vec<OperatorId> = router.list().iter().map(|r| r.operator_id).collect();
        assert_eq!(ops, vec![OperatorId(2), OperatorId(1)]);
    }

    #[test]
    fn concurrent_binds_and_sweeps_leave_one_state_per_operator() {
        let router = Arc::new(ReplyRouter::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let router = Arc::clone(&router);
                std::thread::spawn(move || {
                    for i in 0..500_i64 {
                        router.bind(OperatorId(i % 4), UserId(t * 1000 + i), i as u64);
                        if i % 50 == 0 {
                            router.sweep(Duration::ZERO, u64::MAX);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(router.count_bound() <= 4);
        assert!(router.list().len() <= 4);
    }
}
