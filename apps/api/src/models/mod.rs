pub mod category;
pub mod prompt;
pub mod purchase;
pub mod user;
pub mod vote;
