pub mod activity;
pub mod api;
pub mod donors;
pub mod notifications;
pub mod presenter;
pub mod scheduler;
