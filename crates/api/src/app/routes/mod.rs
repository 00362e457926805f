use axum::{Router, routing::get};

use backoffice_directory::{Company, Personnel, WorkGroup, Worksite};
use backoffice_infra::LedgerStore;

pub mod audit;
pub mod common;
pub mod customers;
pub mod directory;
pub mod entries;
pub mod system;

/// Router for all authenticated endpoints.
pub fn router<S: LedgerStore>() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .merge(customers::router::<S>())
        .merge(entries::router::<S>())
        .merge(audit::router::<S>())
        .merge(directory::router::<S, Worksite>("/worksites"))
        .merge(directory::router::<S, WorkGroup>("/groups"))
        .merge(directory::router::<S, Company>("/companies"))
        .merge(directory::router::<S, Personnel>("/personnel"))
}
