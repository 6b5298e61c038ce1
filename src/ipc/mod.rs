mod error;
mod handlers;
mod helpers;
mod router;
mod types;

pub use error::{err, event, ok};
pub use router::{apply_completion, handle_request};
pub use types::{AppState, Completion, Inbound, Jobs, Request};
