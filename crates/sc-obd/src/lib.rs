pub mod catalog;
pub mod channel;
pub mod decode;
pub mod dtc_db;
pub mod elm327;
pub mod error;
pub mod formatter;
pub mod formula;
pub mod mock;
pub mod pid_db;
pub mod session;
pub mod sink;
pub mod tables;
pub mod vehicle;

pub use catalog::{Catalog, PidDefinition, SensorDefinition, StaticCatalog};
pub use channel::{Channel, ChannelKind, SerialChannel, TraceChannel};
pub use decode::{DecodedRecord, decode_payload, decode_record};
pub use error::{CatalogError, ChannelError, DecodeError, FormatError, SessionError};
pub use formula::{Formula, FormulaError, Number};
pub use mock::MockChannel;
pub use session::{ConnectionState, Received, Session};
pub use sink::{FileTraceSink, MemoryTraceSink, TraceSink};
pub use vehicle::{Snapshot, Vehicle};
