//! The gateway's HTTP surface.

mod error;
mod server;
mod state;

pub use error::ApiError;
pub use server::{
    make_app, run_server, BattleResponse, GenerateBattleRequest, RecordVoteRequest, VoteResponse,
};
pub use state::ServerState;
