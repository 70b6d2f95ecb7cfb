pub mod audit;
pub mod conversations;
pub mod executions;
pub mod extension_configs;
pub mod guests;
pub mod knowledge;
pub mod messages;
pub mod reservations;
pub mod rules;
pub mod tasks;
