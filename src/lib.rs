pub mod cache;
pub mod config;
pub mod handlers;
pub mod humanize;
pub mod ledger;
pub mod messaging;
pub mod notify;
pub mod observability;
pub mod queue;
pub mod record;
pub mod repository;
pub mod server;
pub mod service;
