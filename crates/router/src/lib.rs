//! Routing of hub invocation targets into registry updates.
//!
//! Each hub connection gets its own [`EventRouter`] instance so device
//! hub and challenge hub targets never cross. Handlers only translate
//! push payloads into registry calls; they hold no state of their own.

mod handlers;
mod router;

pub use handlers::{challenge_hub_router, device_hub_router};
pub use router::EventRouter;
