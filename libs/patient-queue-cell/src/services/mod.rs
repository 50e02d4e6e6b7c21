pub mod allocator;
pub mod call_next;
pub mod clock;
pub mod directory;
pub mod engine;
pub mod estimator;
pub mod notifier;
pub mod rebalancer;
pub mod scorer;
pub mod store;
pub mod triage;
pub mod worker;

pub use clock::*;
pub use directory::*;
pub use engine::*;
pub use notifier::*;
pub use store::*;
pub use triage::*;
pub use worker::*;
