// Lifecycle services
pub mod generation_poller;
pub mod payment_orchestrator;

// Backend seam
pub mod facade;
pub mod registry;
