pub mod config;
pub mod dispatch;
pub mod errors;
pub mod generate;
pub mod interpreter;
pub mod routes;
pub mod storage;
pub mod transforms;
