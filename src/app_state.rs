use sqlx::{Pool, Sqlite};
use std::sync::Arc;
use crate::{
    config::Config,
    loyalty::LoyaltyService,
    pass::PassPipeline,
    wallet::{WalletObjectSynchronizer, notify::NotificationPolicy},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Sqlite>,
    pub config: Arc<Config>,
    pub loyalty: LoyaltyService,
    pub passes: Arc<PassPipeline>,
    pub wallet: Arc<WalletObjectSynchronizer>,
    pub notifications: NotificationPolicy,
}
