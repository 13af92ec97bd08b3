pub mod board;
pub mod config;
pub mod game;
pub mod piece;
pub mod rules;
pub mod session;
pub mod web;

pub use board::*;
pub use config::*;
pub use game::*;
pub use piece::*;
pub use rules::*;
pub use session::*;
