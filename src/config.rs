use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::shipping::ClosurePeriod;

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub max_boxes_per_week: u32,
    pub cutoff_hour: u32,
    pub shipping_fee: f64,
    pub closure: Option<ClosurePeriod>,
    pub site_url: String,
    pub catalog_path: String,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "8080"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            stripe_secret_key: read_secret("STRIPE_SECRET_KEY"),
            stripe_webhook_secret: read_secret("STRIPE_WEBHOOK_SECRET"),
            max_boxes_per_week: try_load("MAX_BOXES_PER_WEEK", "25"),
            cutoff_hour: try_load("ORDER_CUTOFF_HOUR", "12"),
            shipping_fee: try_load("SHIPPING_FEE", "9.90"),
            closure: load_closure(),
            site_url: try_load("SITE_URL", "http://localhost:8080"),
            catalog_path: try_load("CATALOG_PATH", "data/products.json"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}

fn read_secret(secret_name: &str) -> String {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(s) => s.trim().to_string(),
        Err(e) => {
            warn!("Failed to read {secret_name} from file, falling back to env: {e}");
            var(secret_name).expect("Secrets misconfigured!")
        }
    }
}

fn load_closure() -> Option<ClosurePeriod> {
    let start = env::var("CLOSURE_START").ok()?;
    let end = env::var("CLOSURE_END").ok()?;

    let start: NaiveDate = start.parse().expect("Invalid CLOSURE_START date!");
    let end: NaiveDate = end.parse().expect("Invalid CLOSURE_END date!");

    if start > end {
        panic!("Closure period misconfigured: start is after end");
    }

    info!("Closure period active: {start} through {end}");
    Some(ClosurePeriod { start, end })
}
