#![deny(missing_docs)]
#![doc = "Shared primitives for the simfarm workspace: the canonical error type, the restricted expression evaluator, the typed event bus and the remote transport seam."]

pub mod channel;
pub mod errors;
pub mod events;
pub mod expr;

pub use channel::{RemoteChannel, REMOTE_PATH_MISSING};
pub use errors::{ErrorInfo, SimError};
pub use events::EventBus;
