use std::sync::Arc;

use crate::{
    catalog::Catalog,
    config::Config,
    database::{init_redis, RedisStore},
    stripe::StripeClient,
};

pub struct AppState {
    pub config: Config,
    pub catalog: Catalog,
    pub database: RedisStore,
    pub stripe: StripeClient,
}

impl AppState {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();
        let catalog = Catalog::load(&config.catalog_path);

        let connection = init_redis(&config.redis_url).await;
        let database = RedisStore::new(connection);
        let stripe = StripeClient::new(&config.stripe_secret_key, &config.stripe_webhook_secret);

        Arc::new(Self {
            config,
            catalog,
            database,
            stripe,
        })
    }
}
