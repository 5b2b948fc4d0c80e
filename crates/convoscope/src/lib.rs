pub mod handlers;
pub mod jobs;
pub mod signals;
pub mod state;
pub mod utils;
