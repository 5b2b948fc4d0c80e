pub mod analysis;
pub mod conversations;
pub mod reports;
pub mod utils;
