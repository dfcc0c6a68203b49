pub mod route;
pub mod user;
