pub mod achievements;
pub mod actions;
pub mod activities;
pub mod audit;
pub mod users;
