pub mod quote_service;
pub mod scheduler;
