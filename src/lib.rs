//! Arena matchmaker - queues, duel requests and live matches for a
//! competitive arena game server.

pub mod app;
pub mod combatant;
pub mod config;
pub mod game;
pub mod headless;
pub mod http;
pub mod matchmaking;
pub mod notify;
pub mod rating;
pub mod util;
pub mod world;

#[cfg(test)]
mod testing;
