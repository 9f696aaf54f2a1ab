// Settings record, validation, form gating and two-phase clear
pub mod settings;

// Upstream session-token exchange
pub mod broker;

// HTTP APIs
pub mod api;

// Admin bearer token checks
pub mod auth;

// Service configuration
pub mod config;
