//! Validation helpers for DTOs.

use validator::ValidationError;

use crate::{services::distribution, state::randomizer::RandomizerConfig};

/// Longest accepted randomizer title, in characters.
pub const MAX_TITLE_CHARS: usize = 120;
/// Upper bound for the points granted per participant.
pub const MAX_REWARD_POINTS: u32 = 10_000;

/// Validates that a title is non-blank and at most [`MAX_TITLE_CHARS`] long.
pub fn validate_title(title: &str) -> Result<(), ValidationError> {
    if title.trim().is_empty() {
        let mut err = ValidationError::new("title_blank");
        err.message = Some("Title must not be blank".into());
        return Err(err);
    }

    let length = title.chars().count();
    if length > MAX_TITLE_CHARS {
        let mut err = ValidationError::new("title_length");
        err.message = Some(
            format!("Title must be at most {MAX_TITLE_CHARS} characters (got {length})").into(),
        );
        return Err(err);
    }

    Ok(())
}

/// Validates the bucket configuration of a randomizer with the engine's own rules.
///
/// ```ignore
/// validate_randomizer_config(&RandomizerConfig::Tables { tables_count: 4, participants_per_table: 6 }) // Ok
/// validate_randomizer_config(&RandomizerConfig::Tables { tables_count: 0, participants_per_table: 6 }) // Err
/// ```
pub fn validate_randomizer_config(config: &RandomizerConfig) -> Result<(), ValidationError> {
    distribution::validate_config(config).map_err(|err| {
        let mut validation = ValidationError::new("randomizer_config");
        validation.message = Some(err.to_string().into());
        validation
    })
}

/// Validates that the reward stays within [`MAX_REWARD_POINTS`].
pub fn validate_reward_points(points: u32) -> Result<(), ValidationError> {
    if points > MAX_REWARD_POINTS {
        let mut err = ValidationError::new("reward_points_range");
        err.message = Some(format!("reward_points must be at most {MAX_REWARD_POINTS}").into());
        return Err(err);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_title() {
        assert!(validate_title("Networking lunch").is_ok());
        assert!(validate_title("   ").is_err());
        assert!(validate_title("").is_err());
        assert!(validate_title(&"é".repeat(MAX_TITLE_CHARS)).is_ok());
        assert!(validate_title(&"a".repeat(MAX_TITLE_CHARS + 1)).is_err());
    }

    #[test]
    fn test_validate_tables_config() {
        let ok = RandomizerConfig::Tables {
            tables_count: 3,
            participants_per_table: 4,
        };
        assert!(validate_randomizer_config(&ok).is_ok());

        let no_tables = RandomizerConfig::Tables {
            tables_count: 0,
            participants_per_table: 4,
        };
        let err = validate_randomizer_config(&no_tables).unwrap_err();
        assert_eq!(err.code, "randomizer_config");
        assert!(err.message.unwrap().contains("tables_count"));

        let no_seats = RandomizerConfig::Tables {
            tables_count: 3,
            participants_per_table: 0,
        };
        assert!(validate_randomizer_config(&no_seats).is_err());
    }

    #[test]
    fn test_validate_simple_config() {
        let single = RandomizerConfig::Simple {
            number_min: 1,
            number_max: 1,
            unique_numbers: false,
        };
        assert!(validate_randomizer_config(&single).is_ok());

        let inverted = RandomizerConfig::Simple {
            number_min: 10,
            number_max: 1,
            unique_numbers: false,
        };
        let err = validate_randomizer_config(&inverted).unwrap_err();
        assert!(err.message.unwrap().contains("number_min (10)"));
    }

    #[test]
    fn test_validate_reward_points() {
        assert!(validate_reward_points(0).is_ok());
        assert!(validate_reward_points(MAX_REWARD_POINTS).is_ok());
        assert!(validate_reward_points(MAX_REWARD_POINTS + 1).is_err());
    }
}
