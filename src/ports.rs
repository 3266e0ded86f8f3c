pub mod push;
pub mod receiver;
pub mod time;

pub use push::{PushSender, SendError};
pub use receiver::{ContextRouter, NotificationDisplay};
pub use time::TimeProvider;
