//! # Redis
//!
//! Persistent store for the weekly capacity counters and order records.
//!
//! ## Keys
//!
//! - `capacity:<YYYY-MM-DD>`: integer count of boxes booked for the shipping
//!   week whose Wednesday falls on that date. Created lazily on first
//!   reservation, incremented only, never deleted.
//! - `order:<session-id>`: JSON order record written by the payment webhook.
//! - `orders`: list of session ids, in confirmation order.
//!
//! ## Atomicity
//!
//! Reserving capacity is a single Lua script, so the capacity check and the
//! increment execute as one Redis command. Concurrent webhook deliveries for
//! the same week serialize inside Redis and cannot jointly push a counter
//! past the configured maximum.
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client, Script,
};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();

    client
        .get_connection_manager_with_config(config)
        .await
        .unwrap()
}

/// Per-week counter operations used by the capacity search.
#[async_trait]
pub trait CapacityStore: Send + Sync {
    /// Boxes already booked for the week, 0 when the week has no record yet.
    async fn boxes_ordered(&self, week: NaiveDate) -> Result<u32, AppError>;

    /// Book `boxes` more for the week only if the counter stays within `max`.
    /// Returns whether the reservation was taken.
    async fn try_reserve(&self, week: NaiveDate, boxes: u32, max: u32) -> Result<bool, AppError>;
}

const RESERVE_SCRIPT: &str = r#"
local booked = tonumber(redis.call('GET', KEYS[1]) or '0')
local boxes = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
if booked + boxes <= max then
    redis.call('INCRBY', KEYS[1], boxes)
    return 1
end
return 0
"#;

pub struct RedisStore {
    connection: ConnectionManager,
    reserve: Script,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            reserve: Script::new(RESERVE_SCRIPT),
        }
    }

    fn capacity_key(week: NaiveDate) -> String {
        format!("capacity:{week}")
    }

    pub async fn record_order(&self, order: &Order) -> Result<(), AppError> {
        let payload =
            serde_json::to_string(order).map_err(|e| AppError::Internal(e.to_string()))?;
        let mut connection = self.connection.clone();

        let _: () = connection
            .set(format!("order:{}", order.session_id), payload)
            .await?;
        let _: () = connection.rpush("orders", &order.session_id).await?;

        Ok(())
    }
}

#[async_trait]
impl CapacityStore for RedisStore {
    async fn boxes_ordered(&self, week: NaiveDate) -> Result<u32, AppError> {
        let mut connection = self.connection.clone();
        let booked: Option<u32> = connection.get(Self::capacity_key(week)).await?;

        Ok(booked.unwrap_or(0))
    }

    async fn try_reserve(&self, week: NaiveDate, boxes: u32, max: u32) -> Result<bool, AppError> {
        let mut connection = self.connection.clone();
        let reserved: i32 = self
            .reserve
            .key(Self::capacity_key(week))
            .arg(boxes)
            .arg(max)
            .invoke_async(&mut connection)
            .await?;

        Ok(reserved == 1)
    }
}

/// Order record persisted once the payment webhook confirms a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Order {
    pub session_id: String,
    pub customer_email: String,
    pub amount_total: f64,
    pub currency: String,
    pub status: String,
    pub ship_date: NaiveDate,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderItem {
    pub description: String,
    pub quantity: u32,
    pub amount_total: f64,
}
