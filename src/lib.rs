//! Vessel voyage tracker: authentication, voyage tracking, the successful
//! trips archive and user administration, served as a JSON API.

pub mod admin;
pub mod backend;
pub mod cache;
pub mod config;
pub mod database;
pub mod errors;
pub mod models;
pub mod notice;
pub mod server;
pub mod session;
pub mod voyages;
