//! In-memory provider implementations.

mod channel;
mod clock;
mod coordinator;
mod ledger;
mod repository;

pub use channel::InMemoryOrderChannel;
pub use clock::{FixedClock, ManualClock, test_clock};
pub use coordinator::InMemoryCoordinator;
pub use ledger::InMemoryOrderLedger;
pub use repository::InMemoryEntityRepository;
