pub mod actor;
pub mod broadcaster;
pub mod evictor;
pub mod registrar;

pub use actor::{spawn_channel, ChannelHandle};
pub use registrar::{Receiver, ReceiverId};
