pub mod auth_service;
pub mod broadcast_hub;
pub mod coordinator;
pub mod drag_locks;
pub mod proposal_store;
pub mod reconciliation;
pub mod room;
pub mod session_registry;
pub mod sweeper;
