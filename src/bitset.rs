//! Distributed bit-field access.
//!
//! Wraps `BITFIELD` sub-commands over a single string key. Field widths
//! are capped by the command itself: 64 bits signed, 63 bits unsigned.

use crate::client::RedcoordClient;
use crate::error::Error;
use crate::object::{HasObject, ObjectBase};

/// A distributed bit field.
#[derive(Clone)]
pub struct BitSet {
    object: ObjectBase,
}

impl HasObject for BitSet {
    fn object(&self) -> &ObjectBase {
        &self.object
    }
}

impl BitSet {
    pub(crate) fn new(client: RedcoordClient, name: impl Into<String>) -> Self {
        Self {
            object: ObjectBase::new(client, name),
        }
    }

    /// Read a signed field of `size` bits at bit `offset`.
    pub async fn get_signed(&self, size: u32, offset: u64) -> Result<i64, Error> {
        check_signed(size)?;
        self.bitfield(&["GET", &format!("i{size}"), &offset.to_string()])
            .await
    }

    /// Write a signed field, returning the previous value.
    pub async fn set_signed(&self, size: u32, offset: u64, value: i64) -> Result<i64, Error> {
        check_signed(size)?;
        self.bitfield(&[
            "SET",
            &format!("i{size}"),
            &offset.to_string(),
            &value.to_string(),
        ])
        .await
    }

    /// Add `delta` to a signed field, returning the new value.
    pub async fn increment_and_get_signed(
        &self,
        size: u32,
        offset: u64,
        delta: i64,
    ) -> Result<i64, Error> {
        check_signed(size)?;
        self.bitfield(&[
            "INCRBY",
            &format!("i{size}"),
            &offset.to_string(),
            &delta.to_string(),
        ])
        .await
    }

    /// Read an unsigned field of `size` bits at bit `offset`.
    pub async fn get_unsigned(&self, size: u32, offset: u64) -> Result<i64, Error> {
        check_unsigned(size)?;
        self.bitfield(&["GET", &format!("u{size}"), &offset.to_string()])
            .await
    }

    /// Write an unsigned field, returning the previous value.
    pub async fn set_unsigned(&self, size: u32, offset: u64, value: i64) -> Result<i64, Error> {
        check_unsigned(size)?;
        self.bitfield(&[
            "SET",
            &format!("u{size}"),
            &offset.to_string(),
            &value.to_string(),
        ])
        .await
    }

    /// Add `delta` to an unsigned field, returning the new value.
    pub async fn increment_and_get_unsigned(
        &self,
        size: u32,
        offset: u64,
        delta: i64,
    ) -> Result<i64, Error> {
        check_unsigned(size)?;
        self.bitfield(&[
            "INCRBY",
            &format!("u{size}"),
            &offset.to_string(),
            &delta.to_string(),
        ])
        .await
    }

    pub async fn get_byte(&self, offset: u64) -> Result<u8, Error> {
        Ok(self.get_signed(8, offset).await? as u8)
    }

    pub async fn set_byte(&self, offset: u64, value: u8) -> Result<u8, Error> {
        Ok(self.set_signed(8, offset, i64::from(value as i8)).await? as u8)
    }

    pub async fn get_short(&self, offset: u64) -> Result<i16, Error> {
        Ok(self.get_signed(16, offset).await? as i16)
    }

    pub async fn set_short(&self, offset: u64, value: i16) -> Result<i16, Error> {
        Ok(self.set_signed(16, offset, i64::from(value)).await? as i16)
    }

    pub async fn get_int32(&self, offset: u64) -> Result<i32, Error> {
        Ok(self.get_signed(32, offset).await? as i32)
    }

    pub async fn set_int32(&self, offset: u64, value: i32) -> Result<i32, Error> {
        Ok(self.set_signed(32, offset, i64::from(value)).await? as i32)
    }

    pub async fn get_int64(&self, offset: u64) -> Result<i64, Error> {
        self.get_signed(64, offset).await
    }

    pub async fn set_int64(&self, offset: u64, value: i64) -> Result<i64, Error> {
        self.set_signed(64, offset, value).await
    }

    async fn bitfield(&self, op: &[&str]) -> Result<i64, Error> {
        let mut conn = self.object.conn().await?;
        let mut cmd = redis::cmd("BITFIELD");
        cmd.arg(&self.object.raw_name);
        for part in op {
            cmd.arg(*part);
        }
        let reply: Vec<i64> = cmd.query_async(&mut conn).await?;
        reply
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedReply("empty BITFIELD reply".into()))
    }
}

fn check_signed(size: u32) -> Result<(), Error> {
    if size == 0 || size > 64 {
        return Err(Error::InvalidArgument(format!(
            "signed bit field size must be 1..=64, got {size}"
        )));
    }
    Ok(())
}

fn check_unsigned(size: u32) -> Result<(), Error> {
    if size == 0 || size > 63 {
        return Err(Error::InvalidArgument(format!(
            "unsigned bit field size must be 1..=63, got {size}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_size_bounds() {
        assert!(check_signed(1).is_ok());
        assert!(check_signed(64).is_ok());
        assert!(matches!(check_signed(0), Err(Error::InvalidArgument(_))));
        assert!(matches!(check_signed(65), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn unsigned_size_bounds() {
        assert!(check_unsigned(63).is_ok());
        assert!(matches!(check_unsigned(64), Err(Error::InvalidArgument(_))));
    }
}

#[cfg(all(test, feature = "integration"))]
mod integration_tests {
    use crate::config::RedcoordConfig;

    use super::*;

    fn test_client() -> RedcoordClient {
        let url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        RedcoordClient::new(&RedcoordConfig::new(url)).expect("client creation should succeed")
    }

    fn unique_name(prefix: &str) -> String {
        format!("{prefix}-{}", uuid::Uuid::new_v4())
    }

    #[tokio::test]
    async fn fields_round_trip() {
        let bits = test_client().get_bit_set(unique_name("bits"));

        assert_eq!(bits.get_signed(8, 0).await.expect("cold read"), 0);
        assert_eq!(bits.set_signed(8, 0, -5).await.expect("set"), 0);
        assert_eq!(bits.get_signed(8, 0).await.expect("get"), -5);

        assert_eq!(
            bits.increment_and_get_signed(8, 0, 10).await.expect("incr"),
            5
        );

        assert_eq!(bits.set_unsigned(16, 64, 40_000).await.expect("set u16"), 0);
        assert_eq!(bits.get_unsigned(16, 64).await.expect("get u16"), 40_000);
    }

    #[tokio::test]
    async fn typed_helpers() {
        let bits = test_client().get_bit_set(unique_name("typed"));

        bits.set_int32(0, i32::MIN).await.expect("set i32");
        assert_eq!(bits.get_int32(0).await.expect("get i32"), i32::MIN);

        bits.set_int64(64, i64::MAX).await.expect("set i64");
        assert_eq!(bits.get_int64(64).await.expect("get i64"), i64::MAX);

        bits.set_short(128, -123).await.expect("set short");
        assert_eq!(bits.get_short(128).await.expect("get short"), -123);
    }
}
