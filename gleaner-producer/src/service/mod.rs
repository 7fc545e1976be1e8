//! Service layer
//!
//! Services hold the logic that sits between the engine and the
//! repositories. The router fans reconciled items out to their destination
//! callbacks and reports every outcome to the coordinator.

mod router;

pub use router::{
    DeliveryGroup, DeliveryReport, DestinationRouter, GroupOutcome, delivery_failure_reason,
    group_by_destination,
};
