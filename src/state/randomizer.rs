//! Domain types describing a randomizer, its buckets and its assignments.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Telegram user identifier forwarded by the upstream `initData` verifier.
pub type UserId = i64;

/// Lifecycle status of a randomizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RandomizerStatus {
    /// Accepting participants; previews can be generated, edited and published.
    Open,
    /// Participation is paused; the randomizer can be reopened.
    Closed,
    /// Published. Terminal.
    Distributed,
}

impl RandomizerStatus {
    /// Stable storage/wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            RandomizerStatus::Open => "open",
            RandomizerStatus::Closed => "closed",
            RandomizerStatus::Distributed => "distributed",
        }
    }
}

impl fmt::Display for RandomizerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How participants are split into buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RandomizerConfig {
    /// Seat participants at `tables_count` tables of `participants_per_table` seats.
    Tables {
        /// Number of tables, at least one.
        tables_count: u32,
        /// Seats per table, at least one.
        participants_per_table: u32,
    },
    /// Draw a number in `[number_min, number_max]` for every participant.
    Simple {
        /// Inclusive lower bound.
        number_min: i64,
        /// Inclusive upper bound.
        number_max: i64,
        /// Sample without replacement so no two participants share a number.
        #[serde(default)]
        unique_numbers: bool,
    },
}

impl RandomizerConfig {
    /// Whether `bucket` is of this config's kind and inside its bounds.
    pub fn accepts(&self, bucket: &Bucket) -> bool {
        match (self, bucket) {
            (RandomizerConfig::Tables { tables_count, .. }, Bucket::Table(table)) => {
                (1..=*tables_count).contains(table)
            }
            (
                RandomizerConfig::Simple {
                    number_min,
                    number_max,
                    ..
                },
                Bucket::Number(number),
            ) => (*number_min..=*number_max).contains(number),
            _ => false,
        }
    }
}

/// A table number (tables mode, 1-based) or a drawn number (simple mode).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Bucket {
    /// Table number, starting at 1.
    Table(u32),
    /// Drawn number.
    Number(i64),
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Table(table) => write!(f, "table {table}"),
            Bucket::Number(number) => write!(f, "number {number}"),
        }
    }
}

/// One participant placed in one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Assignment {
    /// Telegram id of the participant.
    pub user_id: UserId,
    /// Table or number the participant got.
    pub bucket: Bucket,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_config_accepts_only_existing_tables() {
        let config = RandomizerConfig::Tables {
            tables_count: 3,
            participants_per_table: 2,
        };
        assert!(config.accepts(&Bucket::Table(1)));
        assert!(config.accepts(&Bucket::Table(3)));
        assert!(!config.accepts(&Bucket::Table(0)));
        assert!(!config.accepts(&Bucket::Table(4)));
        assert!(!config.accepts(&Bucket::Number(2)));
    }

    #[test]
    fn simple_config_accepts_numbers_in_range() {
        let config = RandomizerConfig::Simple {
            number_min: -2,
            number_max: 5,
            unique_numbers: false,
        };
        assert!(config.accepts(&Bucket::Number(-2)));
        assert!(config.accepts(&Bucket::Number(5)));
        assert!(!config.accepts(&Bucket::Number(6)));
        assert!(!config.accepts(&Bucket::Table(1)));
    }

    #[test]
    fn config_uses_mode_tag_on_the_wire() {
        let config: RandomizerConfig = serde_json::from_str(
            r#"{"mode":"simple","number_min":1,"number_max":10}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            RandomizerConfig::Simple {
                number_min: 1,
                number_max: 10,
                unique_numbers: false
            }
        );

        let bucket = serde_json::to_value(Bucket::Table(2)).unwrap();
        assert_eq!(bucket, serde_json::json!({"kind": "table", "value": 2}));
    }
}
