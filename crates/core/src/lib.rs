pub mod chart;
pub mod config;
pub mod connection_session;
pub mod epoch;
pub mod gateway;
pub mod query_workflow;
pub mod results_table;
pub mod session;
