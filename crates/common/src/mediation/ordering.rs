//! Provider ordering algorithms.
//!
//! Orderings are recomputed for every load and show; nothing is cached
//! between calls except the round-robin cursor.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use super::config::{MediationPolicy, MediationStrategy, ProviderDescriptor};

/// Ascending priority, then descending weight, then ascending id.
fn waterfall_cmp(a: &ProviderDescriptor, b: &ProviderDescriptor) -> CmpOrdering {
    a.priority
        .cmp(&b.priority)
        .then_with(|| b.weight.cmp(&a.weight))
        .then_with(|| a.id.cmp(&b.id))
}

/// Descending weight, then ascending priority, then ascending id.
fn highest_paying_cmp(a: &ProviderDescriptor, b: &ProviderDescriptor) -> CmpOrdering {
    b.weight
        .cmp(&a.weight)
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.id.cmp(&b.id))
}

/// Order the enabled providers of `providers` according to `strategy`.
///
/// `cursor` is only read by round-robin; `rng` only by smart.
pub fn order_providers<'a, R: Rng + ?Sized>(
    strategy: MediationStrategy,
    providers: &'a [ProviderDescriptor],
    cursor: usize,
    rng: &mut R,
) -> Vec<&'a ProviderDescriptor> {
    let mut enabled: Vec<&ProviderDescriptor> = providers.iter().filter(|p| p.enabled).collect();
    if enabled.is_empty() {
        return enabled;
    }

    match strategy {
        MediationStrategy::Waterfall => enabled.sort_by(|a, b| waterfall_cmp(a, b)),
        MediationStrategy::HighestPaying => enabled.sort_by(|a, b| highest_paying_cmp(a, b)),
        MediationStrategy::RoundRobin => {
            let shift = cursor % enabled.len();
            enabled.rotate_left(shift);
        }
        MediationStrategy::Smart => enabled = weighted_permutation(enabled, rng),
    }

    enabled
}

/// Weighted sampling without replacement: each draw picks a remaining
/// provider with probability `weight / remaining_total`. When every remaining
/// weight is zero the draw is uniform.
fn weighted_permutation<'a, R: Rng + ?Sized>(
    mut remaining: Vec<&'a ProviderDescriptor>,
    rng: &mut R,
) -> Vec<&'a ProviderDescriptor> {
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let total: u64 = remaining.iter().map(|p| u64::from(p.weight)).sum();
        let index = if total == 0 {
            rng.gen_range(0..remaining.len())
        } else {
            let mut ticket = rng.gen_range(0..total);
            let mut chosen = remaining.len() - 1;
            for (i, provider) in remaining.iter().enumerate() {
                let weight = u64::from(provider.weight);
                if ticket < weight {
                    chosen = i;
                    break;
                }
                ticket -= weight;
            }
            chosen
        };
        ordered.push(remaining.remove(index));
    }

    ordered
}

/// Stateful orderer owned by a dispatcher: round-robin cursor plus the
/// random source for the smart strategy.
pub struct ProviderOrdering {
    cursor: AtomicUsize,
    rng: Mutex<StdRng>,
}

impl ProviderOrdering {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic random source, for tests and reproducible simulations.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            cursor: AtomicUsize::new(0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    #[must_use]
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }

    pub fn restore_cursor(&self, cursor: usize) {
        self.cursor.store(cursor, Ordering::SeqCst);
    }

    /// Compute the candidate ids for one request.
    ///
    /// The round-robin cursor advances on every call. The policy's fallback
    /// provider, when enabled, is always last.
    pub fn next_order(&self, policy: &MediationPolicy) -> Vec<String> {
        let cursor = self.cursor.fetch_add(1, Ordering::SeqCst);
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);

        let mut ids: Vec<String> =
            order_providers(policy.strategy, &policy.providers, cursor, &mut *rng)
                .into_iter()
                .map(|p| p.id.clone())
                .collect();

        if let Some(fallback) = &policy.fallback_provider {
            if let Some(position) = ids.iter().position(|id| id == fallback) {
                let id = ids.remove(position);
                ids.push(id);
            }
        }

        ids
    }
}

impl Default for ProviderOrdering {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(ordered: &[&ProviderDescriptor]) -> Vec<String> {
        ordered.iter().map(|p| p.id.clone()).collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn test_waterfall_ignores_weight() {
        let providers = vec![
            ProviderDescriptor::new("b", 2, 90),
            ProviderDescriptor::new("a", 1, 50),
        ];
        for cursor in 0..5 {
            let ordered = order_providers(
                MediationStrategy::Waterfall,
                &providers,
                cursor,
                &mut rng(),
            );
            assert_eq!(ids(&ordered), vec!["a", "b"]);
        }
    }

    #[test]
    fn test_waterfall_tie_breaks_by_weight_then_id() {
        let providers = vec![
            ProviderDescriptor::new("zeta", 1, 40),
            ProviderDescriptor::new("beta", 1, 40),
            ProviderDescriptor::new("alpha", 1, 80),
        ];
        let ordered = order_providers(MediationStrategy::Waterfall, &providers, 0, &mut rng());
        assert_eq!(ids(&ordered), vec!["alpha", "beta", "zeta"]);
    }

    #[test]
    fn test_disabled_providers_are_excluded() {
        let providers = vec![
            ProviderDescriptor::new("a", 1, 50).disabled(),
            ProviderDescriptor::new("b", 2, 50),
        ];
        let ordered = order_providers(MediationStrategy::Waterfall, &providers, 0, &mut rng());
        assert_eq!(ids(&ordered), vec!["b"]);
    }

    #[test]
    fn test_highest_paying_orders_by_weight() {
        let providers = vec![
            ProviderDescriptor::new("a", 1, 20),
            ProviderDescriptor::new("b", 3, 90),
            ProviderDescriptor::new("c", 2, 90),
        ];
        let ordered =
            order_providers(MediationStrategy::HighestPaying, &providers, 0, &mut rng());
        assert_eq!(ids(&ordered), vec!["c", "b", "a"]);
    }

    #[test]
    fn test_round_robin_rotates_with_cursor() {
        let providers = vec![
            ProviderDescriptor::new("a", 1, 50),
            ProviderDescriptor::new("b", 2, 50),
            ProviderDescriptor::new("c", 3, 50),
        ];
        let first: Vec<_> = (0..4)
            .map(|cursor| {
                order_providers(MediationStrategy::RoundRobin, &providers, cursor, &mut rng())[0]
                    .id
                    .clone()
            })
            .collect();
        assert_eq!(first, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_smart_distribution_follows_weights() {
        let providers = vec![
            ProviderDescriptor::new("a", 1, 70),
            ProviderDescriptor::new("b", 2, 30),
        ];
        let mut rng = StdRng::seed_from_u64(42);
        let runs = 10_000;
        let a_first = (0..runs)
            .filter(|_| {
                order_providers(MediationStrategy::Smart, &providers, 0, &mut rng)[0].id == "a"
            })
            .count();
        let share = a_first as f64 / runs as f64;
        assert!(
            (0.65..=0.75).contains(&share),
            "a should be first in ~70% of orderings, got {share}"
        );
    }

    #[test]
    fn test_smart_returns_full_permutation() {
        let providers = vec![
            ProviderDescriptor::new("a", 1, 0),
            ProviderDescriptor::new("b", 2, 0),
            ProviderDescriptor::new("c", 3, 10),
        ];
        let mut ordered = ids(&order_providers(
            MediationStrategy::Smart,
            &providers,
            0,
            &mut rng(),
        ));
        assert_eq!(ordered[0], "c", "only weighted provider must be drawn first");
        ordered.sort();
        assert_eq!(ordered, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_next_order_advances_cursor_and_moves_fallback_last() {
        let policy = MediationPolicy::new(
            MediationStrategy::RoundRobin,
            vec![
                ProviderDescriptor::new("a", 1, 50),
                ProviderDescriptor::new("b", 2, 50),
                ProviderDescriptor::new("c", 3, 50),
            ],
        )
        .with_fallback("a");
        let ordering = ProviderOrdering::seeded(1);

        assert_eq!(ordering.next_order(&policy), vec!["b", "c", "a"]);
        assert_eq!(ordering.next_order(&policy), vec!["b", "c", "a"]);
        assert_eq!(ordering.next_order(&policy), vec!["c", "b", "a"]);
        assert_eq!(ordering.cursor(), 3);
    }
}
