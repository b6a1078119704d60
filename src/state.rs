use sqlx::SqlitePool;

use crate::{config::AppConfig, ledger::AppointmentLedger};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: AppConfig,
    pub ledger: AppointmentLedger,
}

impl AppState {
    pub fn new(db: SqlitePool, config: AppConfig) -> Self {
        let ledger = AppointmentLedger::new(db.clone(), config.business_hours);
        AppState { db, config, ledger }
    }
}
