pub mod admin;
pub mod auth;
pub mod dashboard;
pub mod expenses;
pub mod manage;
pub mod todos;
pub mod uploads;
pub mod users;
