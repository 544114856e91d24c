//! Domain layer: readings, the results cache, and temperature helpers.
//!
//! These are the collaborators one hop downstream of the connection: the
//! cache subscribes to result payloads, turns them into [`Reading`]s, and
//! republishes snapshots for rendering.

pub mod reading;
pub mod reading_bus;
pub mod reading_cache;
pub mod report;
pub mod temperature;

pub use reading::{Reading, ResultPayload};
pub use reading_bus::{ReadingBus, Snapshot};
pub use reading_cache::ReadingCache;
pub use temperature::{is_valid_temperature, log_temperature};
