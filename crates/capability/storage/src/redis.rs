//! Redis 缓存与网关目录实现

use crate::error::StorageError;
use crate::models::DirectoryEntry;
use crate::traits::{GatewayDirectory, KvCache};
use redis::AsyncCommands;

fn directory_key(device_id: &str) -> String {
    format!("iot:device:server:{}", device_id)
}

/// 仅当当前值等于 ARGV[1] 时删除，不会误删其他实例或后续会话的归属。
const UNBIND_IF_OWNER: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

fn encode_entry(server_id: &str, session_id: &str) -> Result<String, StorageError> {
    serde_json::to_string(&DirectoryEntry {
        server_id: server_id.to_string(),
        session_id: session_id.to_string(),
    })
    .map_err(|err| StorageError::new(err.to_string()))
}

/// 非 JSON 的旧值整体视为 serverID。
fn decode_entry(raw: &str) -> DirectoryEntry {
    serde_json::from_str(raw).unwrap_or_else(|_| DirectoryEntry {
        server_id: raw.to_string(),
        session_id: String::new(),
    })
}

/// Redis KV 缓存（设备查询缓存等）。
pub struct RedisKvCache {
    client: redis::Client,
}

impl RedisKvCache {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl KvCache for RedisKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let value: Option<String> = connection.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        connection
            .set_ex::<_, _, ()>(key, value, ttl_seconds.max(1))
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        connection.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Redis 设备 → 网关实例目录（多实例部署共享）。
pub struct RedisGatewayDirectory {
    client: redis::Client,
}

impl RedisGatewayDirectory {
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    pub fn connect(redis_url: &str) -> Result<Self, StorageError> {
        let client =
            redis::Client::open(redis_url).map_err(|err| StorageError::new(err.to_string()))?;
        Ok(Self::new(client))
    }
}

#[async_trait::async_trait]
impl GatewayDirectory for RedisGatewayDirectory {
    async fn bind(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<(), StorageError> {
        let value = encode_entry(server_id, session_id)?;
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        connection
            .set::<_, _, ()>(directory_key(device_id), value)
            .await?;
        Ok(())
    }

    async fn owner(&self, device_id: &str) -> Result<Option<String>, StorageError> {
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let value: Option<String> = connection.get(directory_key(device_id)).await?;
        Ok(value.map(|raw| decode_entry(&raw).server_id))
    }

    async fn unbind_if_owner(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<bool, StorageError> {
        let expected = encode_entry(server_id, session_id)?;
        let mut connection = self.client.get_multiplexed_tokio_connection().await?;
        let removed: i64 = redis::Script::new(UNBIND_IF_OWNER)
            .key(directory_key(device_id))
            .arg(expected)
            .invoke_async(&mut connection)
            .await?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_encoding_is_stable_and_tolerates_plain_values() {
        let encoded = encode_entry("gw-1", "sess-1").expect("encode");
        assert_eq!(encoded, r#"{"serverId":"gw-1","sessionId":"sess-1"}"#);
        assert_eq!(decode_entry(&encoded).session_id, "sess-1");
        let legacy = decode_entry("gw-2");
        assert_eq!(legacy.server_id, "gw-2");
        assert!(legacy.session_id.is_empty());
    }
}
