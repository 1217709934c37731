pub mod handlers;
pub mod tally;
