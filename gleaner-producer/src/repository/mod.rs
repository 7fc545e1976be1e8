//! Repository layer
//!
//! Repositories abstract communication with the coordinator and with
//! destination callbacks. They provide simple, focused interfaces without
//! any job lifecycle logic.
//!
//! All repositories are trait-based so the engine can be exercised with
//! in-memory implementations.

mod coordinator;
mod destinations;

// Re-export traits
pub use coordinator::CoordinatorRepository;
pub use destinations::DestinationRepository;

// Re-export implementations
pub use coordinator::HttpCoordinatorRepository;
pub use destinations::HttpDestinationRepository;
