mod bus;
mod types;

pub use bus::{EventBus, EventStream, RunPublisher};
pub use types::{EventEnvelope, RunEvent};
