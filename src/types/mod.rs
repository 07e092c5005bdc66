pub mod notification;
pub mod ws;

pub use notification::*;
pub use ws::*;
