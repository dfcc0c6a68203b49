pub mod annotation;
pub mod api;
pub mod auth;
pub mod clients;
pub mod cloudinary;
pub mod cluster;
pub mod config;
pub mod error;
pub mod geo_ext;
pub mod ingest;
pub mod net;
pub mod rate_limit;
pub mod retry;
pub mod route_service;
pub mod store;
pub mod types;
pub mod user_service;
