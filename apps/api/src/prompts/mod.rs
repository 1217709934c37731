pub mod handlers;
pub mod queries;
pub mod run;
pub mod validation;
