pub mod dtc;
pub mod link;
pub mod mode;
pub mod reading;
pub mod record;

pub use dtc::*;
pub use link::*;
pub use mode::*;
pub use reading::*;
pub use record::*;
