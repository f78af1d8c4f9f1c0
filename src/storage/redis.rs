//! # Redis 存储
//!
//! 支持两种寻址方式：直连主节点，或先向哨兵查询集群当前主节点。
//! 每次建连都会重新查询主节点，主从切换后下一次建连即可连上新主节点。

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{Client, Cmd, FromRedisValue};
use tokio::time::timeout;

use super::KeyValueStore;
use super::pool::{ConnectionPool, Dialer};
use crate::config::RedisConfig;
use crate::error::{StorageError, StorageResult};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lerror, linfo};

/// 启动探测使用的键，不存在也算成功
const PROBE_KEY: &str = "gitter://probe";

/// 负责解析主节点并建立连接
pub struct RedisDialer {
    address: String,
    cluster_name: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl RedisDialer {
    #[must_use]
    pub fn from_config(config: &RedisConfig) -> Self {
        Self {
            address: config.address.clone(),
            cluster_name: config.cluster_name.clone().filter(|name| !name.is_empty()),
            password: config.password.clone().filter(|pw| !pw.is_empty()),
            timeout: Duration::from_secs(config.dial_timeout_secs),
        }
    }

    /// 当前主节点地址（host:port）
    async fn resolve_primary(&self) -> StorageResult<String> {
        let Some(cluster) = self.cluster_name.as_deref() else {
            return Ok(self.address.clone());
        };

        let client = Client::open(format!("redis://{}/", self.address))?;
        let mut conn = self.connect(&client, "sentinel", &self.address).await?;

        let mut cmd = redis::cmd("SENTINEL");
        cmd.arg("get-master-addr-by-name").arg(cluster);
        let pair: Vec<String> = self.run(&mut conn, &cmd, "SENTINEL").await?;

        if pair.len() != 2 {
            return Err(StorageError::connection(format!(
                "redis sentinel get-master-addr-by-name result invalid: {pair:?}"
            )));
        }

        let primary = format!("{}:{}", pair[0], pair[1]);
        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::RedisPool,
            "sentinel_resolved",
            &format!("哨兵返回主节点: cluster={cluster}, primary={primary}")
        );
        Ok(primary)
    }

    fn primary_url(&self, primary: &str) -> String {
        match &self.password {
            Some(password) => format!("redis://:{}@{primary}/", urlencoding::encode(password)),
            None => format!("redis://{primary}/"),
        }
    }

    async fn connect(
        &self,
        client: &Client,
        role: &str,
        address: &str,
    ) -> StorageResult<MultiplexedConnection> {
        match timeout(self.timeout, client.get_multiplexed_async_connection()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => {
                lerror!(
                    "system",
                    LogStage::Storage,
                    LogComponent::RedisPool,
                    "dial_failed",
                    &format!("dial redis {role} ({address}) error: {e}")
                );
                Err(StorageError::connection(format!("dial redis {role} ({address}) error: {e}")))
            }
            Err(_) => Err(StorageError::timeout(format!("dial redis {role} ({address})"))),
        }
    }

    /// 带超时执行一条命令
    async fn run<T: FromRedisValue>(
        &self,
        conn: &mut MultiplexedConnection,
        cmd: &Cmd,
        operation: &str,
    ) -> StorageResult<T> {
        match timeout(self.timeout, cmd.query_async(conn)).await {
            Ok(result) => result.map_err(StorageError::from),
            Err(_) => Err(StorageError::timeout(format!("redis {operation}"))),
        }
    }
}

#[async_trait]
impl Dialer for RedisDialer {
    type Connection = MultiplexedConnection;

    async fn dial(&self) -> StorageResult<MultiplexedConnection> {
        let primary = self.resolve_primary().await?;
        // 密码通过 URL 传入，建连时自动 AUTH
        let client = Client::open(self.primary_url(&primary))?;
        self.connect(&client, "master", &primary).await
    }

    async fn probe(&self, conn: &mut MultiplexedConnection) -> StorageResult<()> {
        let reply: String = self.run(conn, &redis::cmd("PING"), "PING").await?;
        if reply == "PONG" {
            Ok(())
        } else {
            Err(StorageError::connection(format!("unexpected PING reply: {reply}")))
        }
    }
}

/// 基于连接池的 Redis 键值存储
pub struct RedisStore {
    pool: ConnectionPool<RedisDialer>,
}

impl RedisStore {
    /// 创建存储，不会立即建连
    #[must_use]
    pub fn new(config: &RedisConfig) -> Self {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Storage,
            "redis_store_init",
            &format!(
                "Redis 存储: address={}, sentinel_cluster={:?}, max_connections={}",
                config.address, config.cluster_name, config.max_connections
            )
        );

        Self {
            pool: ConnectionPool::new(
                RedisDialer::from_config(config),
                config.max_connections,
                Duration::from_secs(config.idle_timeout_secs),
            ),
        }
    }

    /// 启动探测：完成一次 GET 往返，键不存在视为成功
    pub async fn probe(&self) -> StorageResult<()> {
        match self.get(PROBE_KEY).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    #[must_use]
    pub const fn pool(&self) -> &ConnectionPool<RedisDialer> {
        &self.pool
    }

    async fn execute<T: FromRedisValue>(&self, cmd: &Cmd, operation: &str) -> StorageResult<T> {
        let mut pooled = self.pool.get().await?;
        let result = {
            let conn = pooled.connection()?;
            self.pool.dialer().run(conn, cmd, operation).await
        };

        if let Err(e) = &result {
            lerror!(
                "system",
                LogStage::Storage,
                LogComponent::Storage,
                "command_failed",
                &format!("[{operation}] err: {e}")
            );
            pooled.mark_broken();
        }
        result
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        self.execute::<()>(&cmd, "SET").await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let mut cmd = redis::cmd("GET");
        cmd.arg(key);
        let value: Option<Vec<u8>> = self.execute(&cmd, "GET").await?;
        value.ok_or_else(|| StorageError::not_found(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut cmd = redis::cmd("DEL");
        cmd.arg(key);
        self.execute::<()>(&cmd, "DEL").await
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
