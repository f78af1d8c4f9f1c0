//! # 连接池
//!
//! 有上限的连接池：借出数量由信号量限制，池满时等待而不是失败；
//! 复用空闲连接前先做一次探活，失败的连接直接丢弃并继续取下一个或重新建连；
//! 空闲超过 `idle_timeout` 的连接在借出时被清理。

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{StorageError, StorageResult};
use crate::logging::{LogComponent, LogStage};
use crate::{ldebug, lwarn};

/// 建连与探活
#[async_trait]
pub trait Dialer: Send + Sync {
    type Connection: Send;

    /// 建立一条新连接
    async fn dial(&self) -> StorageResult<Self::Connection>;

    /// 复用前的探活
    async fn probe(&self, conn: &mut Self::Connection) -> StorageResult<()>;
}

struct IdleConnection<C> {
    conn: C,
    returned_at: Instant,
}

pub struct ConnectionPool<D: Dialer> {
    dialer: D,
    idle: Mutex<VecDeque<IdleConnection<D::Connection>>>,
    permits: Semaphore,
    max_connections: usize,
    idle_timeout: Duration,
}

impl<D: Dialer> ConnectionPool<D> {
    pub fn new(dialer: D, max_connections: usize, idle_timeout: Duration) -> Self {
        Self {
            dialer,
            idle: Mutex::new(VecDeque::with_capacity(max_connections)),
            permits: Semaphore::new(max_connections),
            max_connections,
            idle_timeout,
        }
    }

    /// 借出一条连接，池满时等待
    pub async fn get(&self) -> StorageResult<PooledConnection<'_, D>> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StorageError::PoolClosed)?;

        while let Some(mut conn) = self.take_idle() {
            match self.dialer.probe(&mut conn).await {
                Ok(()) => return Ok(PooledConnection::new(self, conn, permit)),
                Err(e) => {
                    lwarn!(
                        "system",
                        LogStage::Storage,
                        LogComponent::RedisPool,
                        "probe_failed",
                        &format!("空闲连接探活失败，丢弃: {e}")
                    );
                }
            }
        }

        let conn = self.dialer.dial().await?;
        ldebug!(
            "system",
            LogStage::Storage,
            LogComponent::RedisPool,
            "dialed",
            "建立新连接"
        );
        Ok(PooledConnection::new(self, conn, permit))
    }

    /// 关闭连接池，之后的借出返回 `PoolClosed`
    pub fn close(&self) {
        self.permits.close();
        self.lock_idle().clear();
    }

    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.lock_idle().len()
    }

    /// 当前可借出的连接数
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    #[must_use]
    pub const fn max_connections(&self) -> usize {
        self.max_connections
    }

    pub const fn dialer(&self) -> &D {
        &self.dialer
    }

    fn lock_idle(&self) -> MutexGuard<'_, VecDeque<IdleConnection<D::Connection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 取最近归还的连接，顺带清理过期的空闲连接
    fn take_idle(&self) -> Option<D::Connection> {
        let mut idle = self.lock_idle();
        while idle
            .back()
            .is_some_and(|entry| entry.returned_at.elapsed() > self.idle_timeout)
        {
            idle.pop_back();
        }
        idle.pop_front().map(|entry| entry.conn)
    }

    fn put_back(&self, conn: D::Connection) {
        if self.permits.is_closed() {
            return;
        }
        self.lock_idle().push_front(IdleConnection {
            conn,
            returned_at: Instant::now(),
        });
    }
}

/// 借出的连接，drop 时归还；标记为损坏的连接不归还
pub struct PooledConnection<'a, D: Dialer> {
    pool: &'a ConnectionPool<D>,
    conn: Option<D::Connection>,
    broken: bool,
    _permit: SemaphorePermit<'a>,
}

impl<'a, D: Dialer> PooledConnection<'a, D> {
    fn new(pool: &'a ConnectionPool<D>, conn: D::Connection, permit: SemaphorePermit<'a>) -> Self {
        Self {
            pool,
            conn: Some(conn),
            broken: false,
            _permit: permit,
        }
    }

    /// 命令失败后调用，连接不再回到池中
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn connection(&mut self) -> StorageResult<&mut D::Connection> {
        self.conn.as_mut().ok_or(StorageError::PoolClosed)
    }
}

impl<D: Dialer> Drop for PooledConnection<'_, D> {
    fn drop(&mut self) {
        if self.broken {
            return;
        }
        if let Some(conn) = self.conn.take() {
            self.pool.put_back(conn);
        }
    }
}
