//! CodeQuest learning engine: course progress with sequential unlocking,
//! experience and levels, and five kinds of stage-based coding games whose
//! submissions are checked by an external code runner.

pub mod config;
pub mod domain;
pub mod error;
pub mod games;
pub mod logic;
pub mod machine;
pub mod progress;
pub mod protocol;
pub mod routes;
pub mod runner;
pub mod seeds;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;
pub mod xp;
