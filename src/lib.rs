pub mod app;
pub mod archive;
pub mod cli;
pub mod config;
pub mod errors;
pub mod extract;
pub mod filter;
pub mod gmail;
pub mod ingest;
pub mod oauth;
pub mod response;
pub mod types;
