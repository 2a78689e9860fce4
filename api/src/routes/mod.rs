pub mod health;
pub mod query;
pub mod root_route;
