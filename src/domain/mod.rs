pub mod change;
pub mod clock;
pub mod event;
pub mod log;
pub mod stint;

pub use change::*;
pub use clock::*;
pub use event::*;
pub use log::*;
pub use stint::*;
