//! Persistence layer for ordersync

mod connection;
mod gateway;
mod libsql_gateway;
mod memory;
mod migrations;

pub use connection::Database;
pub use gateway::OrderGateway;
pub use libsql_gateway::LibSqlOrderGateway;
pub use memory::InMemoryOrderGateway;
