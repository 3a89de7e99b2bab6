pub mod chapter;
pub mod quest;
pub mod season;
pub mod task;
