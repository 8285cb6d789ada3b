pub mod alert;
pub mod config;
pub mod cooldown;
pub mod db;
pub mod errors;
pub mod fetch;
pub mod metrics;
pub mod model;
pub mod normalize;
pub mod notify;
pub mod poller;
