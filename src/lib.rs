pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod matching;
pub mod pipeline;
pub mod providers;
pub mod types;
pub mod watch;
