pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod service;
