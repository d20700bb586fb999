//! # realm_persist - Player Save Pipeline
//!
//! Saves leave the tick thread immediately: the map submits a
//! [`SaveRequest`] and keeps simulating. Worker threads write the account
//! phase, then the character phase, and finally invoke the request's
//! continuation. Failed writes are retried by re-queuing the request.
//!
//! ```ignore
//! let store = Arc::new(FilePersistence::new("./saves", SaveFormat::Json)?);
//! let queue = SaveQueue::start(&PersistConfig::default(), store)?;
//! queue.submit(SaveRequest::new(snapshot, SaveFollowUp::ResumeCommands, |done| {
//!     inbound.send(done);
//! }))?;
//! ```

pub mod config;
pub mod error;
pub mod queue;
pub mod store;

pub use config::{PersistConfig, SaveFormat};
pub use error::{PersistError, PersistResult};
pub use queue::{SaveCompletion, SaveQueue, SaveRequest};
pub use store::{FilePersistence, MemoryPersistence, Persistence, SavePhase};

pub mod prelude {
    pub use crate::config::PersistConfig;
    pub use crate::error::{PersistError, PersistResult};
    pub use crate::queue::{SaveCompletion, SaveQueue, SaveRequest};
    pub use crate::store::{Persistence, SavePhase};
}
