pub mod assignments;
pub mod averages;
pub mod classes;
pub mod core;
pub mod grades;
pub mod schedules;
pub mod setup;
