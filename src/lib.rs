pub mod auth;
pub mod db;
pub mod error;
pub mod routes;

use db::DbPool;
use opendal::Operator;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub storage: Operator,
}
