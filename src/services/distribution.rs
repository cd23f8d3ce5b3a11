//! Randomizer distribution engine: turns a participant list and a bucket
//! configuration into a randomized assignment preview.
//!
//! The engine is pure. Callers inject the random source so previews can be
//! reproduced with a seeded generator in tests.

use std::collections::{BTreeMap, HashSet};

use rand::{Rng, seq::SliceRandom};
use serde::Deserialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::state::randomizer::{Assignment, Bucket, RandomizerConfig, UserId};

/// Width above which unique draws switch from index sampling to rejection sampling.
const DENSE_SAMPLING_FACTOR: u128 = 2;

/// What happens when a tables randomizer has more participants than seats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Keep dealing round-robin so surplus participants are spread evenly.
    #[default]
    Spread,
    /// Refuse to compute the preview.
    Reject,
}

/// Errors raised by the distribution engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DistributionError {
    /// Bucket configuration is not usable.
    #[error("invalid randomizer config: {0}")]
    InvalidConfig(String),
    /// More participants than seats while overflow is rejected.
    #[error("{participants} participants exceed the {capacity} available seats")]
    CapacityExceeded {
        /// Participants to seat.
        participants: usize,
        /// Total seats across tables.
        capacity: usize,
    },
}

/// Result of one engine run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionPlan {
    /// One row per distinct participant.
    pub assignments: Vec<Assignment>,
    /// Participants seated beyond the configured capacity (tables mode only).
    pub overflow: usize,
}

/// Check that a configuration can produce a distribution at all.
pub fn validate_config(config: &RandomizerConfig) -> Result<(), DistributionError> {
    match *config {
        RandomizerConfig::Tables {
            tables_count,
            participants_per_table,
        } => {
            if tables_count == 0 {
                return Err(DistributionError::InvalidConfig(
                    "tables_count must be at least 1".into(),
                ));
            }
            if participants_per_table == 0 {
                return Err(DistributionError::InvalidConfig(
                    "participants_per_table must be at least 1".into(),
                ));
            }
        }
        RandomizerConfig::Simple {
            number_min,
            number_max,
            ..
        } => {
            if number_min > number_max {
                return Err(DistributionError::InvalidConfig(format!(
                    "number_min ({number_min}) must not exceed number_max ({number_max})"
                )));
            }
        }
    }
    Ok(())
}

/// Assign every participant to exactly one bucket.
///
/// Duplicate identifiers in `participants` are collapsed to their first
/// occurrence. An empty list yields an empty plan once the config is valid.
pub fn compute_preview<R>(
    participants: &[UserId],
    config: &RandomizerConfig,
    overflow_policy: OverflowPolicy,
    rng: &mut R,
) -> Result<DistributionPlan, DistributionError>
where
    R: Rng + ?Sized,
{
    validate_config(config)?;

    let mut seen = HashSet::with_capacity(participants.len());
    let mut users: Vec<UserId> = participants
        .iter()
        .copied()
        .filter(|user| seen.insert(*user))
        .collect();

    match *config {
        RandomizerConfig::Tables {
            tables_count,
            participants_per_table,
        } => seat_at_tables(
            &mut users,
            tables_count,
            participants_per_table,
            overflow_policy,
            rng,
        ),
        RandomizerConfig::Simple {
            number_min,
            number_max,
            unique_numbers,
        } => {
            let numbers = if unique_numbers {
                draw_unique(users.len(), number_min, number_max, rng)?
            } else {
                (0..users.len())
                    .map(|_| rng.random_range(number_min..=number_max))
                    .collect()
            };

            let assignments = users
                .into_iter()
                .zip(numbers)
                .map(|(user_id, number)| Assignment {
                    user_id,
                    bucket: Bucket::Number(number),
                })
                .collect();

            Ok(DistributionPlan {
                assignments,
                overflow: 0,
            })
        }
    }
}

/// Count how many assignments landed in each bucket, ordered by bucket.
pub fn occupancy(assignments: &[Assignment]) -> BTreeMap<Bucket, usize> {
    let mut counts = BTreeMap::new();
    for assignment in assignments {
        *counts.entry(assignment.bucket).or_insert(0) += 1;
    }
    counts
}

/// Shuffle, then deal seats round-robin: participant `i` sits at table
/// `i % tables_count + 1`, so every table gets its k-th seat before any table
/// gets its (k+1)-th.
fn seat_at_tables<R>(
    users: &mut [UserId],
    tables_count: u32,
    participants_per_table: u32,
    overflow_policy: OverflowPolicy,
    rng: &mut R,
) -> Result<DistributionPlan, DistributionError>
where
    R: Rng + ?Sized,
{
    let capacity = (tables_count as usize).saturating_mul(participants_per_table as usize);
    let overflow = users.len().saturating_sub(capacity);
    if overflow > 0 && overflow_policy == OverflowPolicy::Reject {
        return Err(DistributionError::CapacityExceeded {
            participants: users.len(),
            capacity,
        });
    }

    users.shuffle(rng);

    let tables = tables_count as usize;
    let assignments = users
        .iter()
        .enumerate()
        .map(|(index, user_id)| Assignment {
            user_id: *user_id,
            bucket: Bucket::Table((index % tables) as u32 + 1),
        })
        .collect();

    Ok(DistributionPlan {
        assignments,
        overflow,
    })
}

/// Draw `count` distinct numbers from `[min, max]`.
fn draw_unique<R>(
    count: usize,
    min: i64,
    max: i64,
    rng: &mut R,
) -> Result<Vec<i64>, DistributionError>
where
    R: Rng + ?Sized,
{
    let width = (max as i128 - min as i128 + 1) as u128;
    if (count as u128) > width {
        return Err(DistributionError::InvalidConfig(format!(
            "cannot draw {count} unique numbers from a range of {width}"
        )));
    }

    if width <= (count as u128).saturating_mul(DENSE_SAMPLING_FACTOR) {
        // Dense range: width fits in usize here since it is bounded by 2 * count.
        let sampled = rand::seq::index::sample(rng, width as usize, count);
        return Ok(sampled
            .into_iter()
            .map(|offset| (min as i128 + offset as i128) as i64)
            .collect());
    }

    let mut drawn = HashSet::with_capacity(count);
    let mut numbers = Vec::with_capacity(count);
    while numbers.len() < count {
        let candidate = rng.random_range(min..=max);
        if drawn.insert(candidate) {
            numbers.push(candidate);
        }
    }
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn tables(tables_count: u32, participants_per_table: u32) -> RandomizerConfig {
        RandomizerConfig::Tables {
            tables_count,
            participants_per_table,
        }
    }

    fn simple(number_min: i64, number_max: i64, unique_numbers: bool) -> RandomizerConfig {
        RandomizerConfig::Simple {
            number_min,
            number_max,
            unique_numbers,
        }
    }

    fn users(count: i64) -> Vec<UserId> {
        (1..=count).map(|id| 1_000 + id).collect()
    }

    fn assert_everyone_once(participants: &[UserId], plan: &DistributionPlan) {
        let mut assigned: Vec<UserId> = plan.assignments.iter().map(|a| a.user_id).collect();
        assigned.sort_unstable();
        let mut expected = participants.to_vec();
        expected.sort_unstable();
        assert_eq!(assigned, expected);
    }

    #[test]
    fn five_participants_two_tables_of_three() {
        let participants = users(5);
        let mut rng = StdRng::seed_from_u64(7);
        let plan =
            compute_preview(&participants, &tables(2, 3), OverflowPolicy::Spread, &mut rng)
                .unwrap();

        assert_eq!(plan.assignments.len(), 5);
        assert_eq!(plan.overflow, 0);
        assert_everyone_once(&participants, &plan);

        let counts = occupancy(&plan.assignments);
        assert_eq!(counts.get(&Bucket::Table(1)), Some(&3));
        assert_eq!(counts.get(&Bucket::Table(2)), Some(&2));
    }

    #[test]
    fn tables_never_exceed_capacity_within_bounds() {
        let mut rng = StdRng::seed_from_u64(42);
        for (count, tables_count, per_table) in [(1, 4, 1), (12, 4, 3), (11, 4, 3), (7, 7, 1)] {
            let participants = users(count);
            for _ in 0..20 {
                let plan = compute_preview(
                    &participants,
                    &tables(tables_count, per_table),
                    OverflowPolicy::Reject,
                    &mut rng,
                )
                .unwrap();
                assert_everyone_once(&participants, &plan);
                let counts = occupancy(&plan.assignments);
                assert!(counts.values().all(|seats| *seats <= per_table as usize));
                assert!(counts.keys().all(|bucket| matches!(
                    bucket,
                    Bucket::Table(t) if (1..=tables_count).contains(t)
                )));
            }
        }
    }

    #[test]
    fn round_robin_keeps_tables_balanced() {
        let participants = users(10);
        let mut rng = StdRng::seed_from_u64(3);
        let plan =
            compute_preview(&participants, &tables(4, 5), OverflowPolicy::Spread, &mut rng)
                .unwrap();
        let counts = occupancy(&plan.assignments);
        let max = counts.values().max().unwrap();
        let min = counts.values().min().unwrap();
        assert!(max - min <= 1, "unbalanced occupancy: {counts:?}");
        assert_eq!(counts.len(), 4);
    }

    #[test]
    fn same_seed_gives_same_preview() {
        let participants = users(9);
        let first = compute_preview(
            &participants,
            &tables(3, 3),
            OverflowPolicy::Spread,
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
        let second = compute_preview(
            &participants,
            &tables(3, 3),
            OverflowPolicy::Spread,
            &mut StdRng::seed_from_u64(11),
        )
        .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn overflow_is_spread_over_all_tables() {
        let participants = users(8);
        let mut rng = StdRng::seed_from_u64(5);
        let plan =
            compute_preview(&participants, &tables(3, 2), OverflowPolicy::Spread, &mut rng)
                .unwrap();

        assert_eq!(plan.overflow, 2);
        assert_everyone_once(&participants, &plan);
        let counts = occupancy(&plan.assignments);
        assert_eq!(counts.values().copied().collect::<Vec<_>>(), vec![3, 3, 2]);
    }

    #[test]
    fn overflow_rejected_when_policy_says_so() {
        let participants = users(4);
        let err = compute_preview(
            &participants,
            &tables(1, 3),
            OverflowPolicy::Reject,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert_eq!(
            err,
            DistributionError::CapacityExceeded {
                participants: 4,
                capacity: 3
            }
        );
    }

    #[test]
    fn empty_participants_yield_empty_plan() {
        let plan = compute_preview(
            &[],
            &tables(2, 2),
            OverflowPolicy::Reject,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap();
        assert!(plan.assignments.is_empty());
        assert_eq!(plan.overflow, 0);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut rng = StdRng::seed_from_u64(1);
        for config in [tables(0, 3), tables(3, 0), simple(5, 4, false)] {
            let err = compute_preview(&users(2), &config, OverflowPolicy::Spread, &mut rng)
                .unwrap_err();
            assert!(matches!(err, DistributionError::InvalidConfig(_)), "{config:?}");
        }
    }

    #[test]
    fn duplicate_participants_are_assigned_once() {
        let plan = compute_preview(
            &[7, 8, 7, 9, 8],
            &tables(2, 2),
            OverflowPolicy::Reject,
            &mut StdRng::seed_from_u64(2),
        )
        .unwrap();
        assert_everyone_once(&[7, 8, 9], &plan);
    }

    #[test]
    fn zero_width_range_gives_everyone_the_same_number() {
        let participants = users(3);
        let plan = compute_preview(
            &participants,
            &simple(1, 1, false),
            OverflowPolicy::Spread,
            &mut StdRng::seed_from_u64(9),
        )
        .unwrap();
        assert_everyone_once(&participants, &plan);
        assert!(
            plan.assignments
                .iter()
                .all(|a| a.bucket == Bucket::Number(1))
        );
    }

    #[test]
    fn simple_draws_stay_in_range() {
        let participants = users(50);
        let plan = compute_preview(
            &participants,
            &simple(-3, 3, false),
            OverflowPolicy::Spread,
            &mut StdRng::seed_from_u64(13),
        )
        .unwrap();
        assert!(plan.assignments.iter().all(|a| matches!(
            a.bucket,
            Bucket::Number(n) if (-3..=3).contains(&n)
        )));
    }

    #[test]
    fn unique_draws_never_collide() {
        let mut rng = StdRng::seed_from_u64(21);
        for (min, max) in [(1, 10), (1, 1_000_000), (i64::MIN, i64::MAX)] {
            let participants = users(10);
            let plan = compute_preview(
                &participants,
                &simple(min, max, true),
                OverflowPolicy::Spread,
                &mut rng,
            )
            .unwrap();
            let numbers: HashSet<Bucket> = plan.assignments.iter().map(|a| a.bucket).collect();
            assert_eq!(numbers.len(), 10);
        }
    }

    #[test]
    fn unique_draws_need_a_wide_enough_range() {
        let err = compute_preview(
            &users(4),
            &simple(1, 3, true),
            OverflowPolicy::Spread,
            &mut StdRng::seed_from_u64(1),
        )
        .unwrap_err();
        assert!(matches!(err, DistributionError::InvalidConfig(_)));
    }
}
