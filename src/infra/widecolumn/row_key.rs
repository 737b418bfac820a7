use time::OffsetDateTime;

use crate::domain::{entities::unix_micros, error::DomainError};

const MAX_MICROS: i64 = 9_999_999_999_999_999;

/// Owner ids are written digit-reversed so consecutive ids spread across the
/// key space; the trailing `:` keeps `1` from prefixing `12`.
pub fn owner_prefix(owner_id: i64) -> String {
    let reversed: String = owner_id.to_string().chars().rev().collect();
    format!("{reversed}:")
}

/// `{reversed owner}:{created_at µs, 16 digits}:{post id}`.
///
/// Within one owner the keys sort chronologically; the post id keeps two
/// posts created in the same microsecond apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowKey {
    pub owner_id: i64,
    pub micros: i64,
    pub post_id: i64,
}

impl RowKey {
    pub fn new(owner_id: i64, created_at: OffsetDateTime, post_id: i64) -> Result<Self, DomainError> {
        Ok(Self {
            owner_id,
            micros: checked_micros(created_at)?,
            post_id,
        })
    }

    pub fn encode(&self) -> String {
        format!(
            "{}{:016}:{}",
            owner_prefix(self.owner_id),
            self.micros,
            self.post_id
        )
    }

    /// Sorts below every row of `owner_id` at or after `at`.
    pub fn floor(owner_id: i64, at: OffsetDateTime) -> Result<String, DomainError> {
        Ok(format!("{}{:016}", owner_prefix(owner_id), checked_micros(at)?))
    }

    /// Sorts above every row of `owner_id` at or before `at`.
    pub fn ceiling(owner_id: i64, at: OffsetDateTime) -> Result<String, DomainError> {
        // ';' is the byte right after ':'
        Ok(format!("{};", Self::floor(owner_id, at)?))
    }

    /// Microsecond timestamp embedded in an encoded key.
    pub fn micros_of(key: &str) -> Result<i64, DomainError> {
        let invalid = || DomainError::invariant(format!("malformed feed row key `{key}`"));
        let mut parts = key.split(':');
        let _owner = parts.next().ok_or_else(invalid)?;
        let micros = parts.next().ok_or_else(invalid)?;
        if micros.len() != 16 {
            return Err(invalid());
        }
        micros.parse().map_err(|_| invalid())
    }
}

fn checked_micros(at: OffsetDateTime) -> Result<i64, DomainError> {
    let micros = unix_micros(at);
    if !(0..=MAX_MICROS).contains(&micros) {
        return Err(DomainError::validation(format!(
            "timestamp {at} cannot be encoded in a feed row key"
        )));
    }
    Ok(micros)
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn keys_reverse_owner_and_pad_time() {
        let at = datetime!(2024-01-01 0:00 UTC);
        let key = RowKey::new(123, at, 9).expect("valid").encode();

        assert_eq!(key, "321:1704067200000000:9");
        assert_eq!(RowKey::micros_of(&key).expect("parse"), 1_704_067_200_000_000);
    }

    #[test]
    fn keys_sort_chronologically_within_owner() {
        let earlier = RowKey::new(10, datetime!(2024-01-01 0:00 UTC), 99)
            .expect("valid")
            .encode();
        let later = RowKey::new(10, datetime!(2024-01-01 0:00:00.000001 UTC), 1)
            .expect("valid")
            .encode();

        assert!(earlier < later);
        assert!(later.starts_with(&owner_prefix(10)));
        assert!(!later.starts_with(&owner_prefix(1)));
    }

    #[test]
    fn floor_and_ceiling_bracket_rows_at_the_same_instant() {
        let at = datetime!(2024-01-01 0:00 UTC);
        let row = RowKey::new(5, at, 77).expect("valid").encode();
        let next = RowKey::new(5, at + time::Duration::microseconds(1), 1)
            .expect("valid")
            .encode();

        let floor = RowKey::floor(5, at).expect("valid");
        let ceiling = RowKey::ceiling(5, at).expect("valid");

        assert!(floor < row && row < ceiling);
        assert!(ceiling < next);
    }

    #[test]
    fn pre_epoch_timestamps_are_rejected() {
        assert!(RowKey::new(1, datetime!(1969-12-31 23:59 UTC), 1).is_err());
    }
}
