//! Safe-ish conversions between rust and sql types.
//! Postgres has no unsigned integers, so ids and counts cross the boundary here.

use anyhow::{Result, anyhow};

pub fn i64_to_u64(i: i64) -> Result<u64> {
    u64::try_from(i).map_err(|_| anyhow!("i64 value {i} is negative and cannot be converted to u64"))
}
pub fn u64_to_i64(i: u64) -> Result<i64> {
    i64::try_from(i).map_err(|_| anyhow!("u64 value {i} exceeds i64::MAX and cannot be converted to i64"))
}

pub fn i32_to_u32(i: i32) -> Result<u32> {
    u32::try_from(i).map_err(|_| anyhow!("i32 value {i} is negative and cannot be converted to u32"))
}
pub fn u32_to_i32(i: u32) -> Result<i32> {
    i32::try_from(i).map_err(|_| anyhow!("u32 value {i} exceeds i32::MAX and cannot be converted to i32"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_conversions() {
        assert_eq!(i64_to_u64(42).unwrap(), 42);
        assert!(i64_to_u64(-1).is_err());
        assert_eq!(u64_to_i64(7).unwrap(), 7);
        assert!(u64_to_i64(u64::MAX).is_err());
    }

    #[test]
    fn test_count_conversions() {
        assert_eq!(i32_to_u32(100).unwrap(), 100);
        assert!(i32_to_u32(-5).is_err());
        assert_eq!(u32_to_i32(85).unwrap(), 85);
        assert!(u32_to_i32(u32::MAX).is_err());
    }
}
