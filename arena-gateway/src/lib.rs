//! Music Arena gateway: routes battle requests to system servers, persists
//! battle records, and records votes.

pub mod battle;
pub mod chat;
pub mod config;
pub mod generator;
pub mod matchup;
pub mod prebaked;
pub mod server;
pub mod store;

pub use battle::{BattleError, BattleGenerator, BattlePromptRequest};
pub use config::{ConfigOverrides, GatewayConfig};
pub use server::{make_app, run_server, ServerState};
