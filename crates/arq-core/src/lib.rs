pub mod error;
pub mod receiver;
pub mod sender;
pub mod slot_buffer;

pub use error::WindowError;
pub use receiver::{ReceiverWindow, WindowState};
pub use sender::SenderWindow;
pub use slot_buffer::{Closed, SlotBuffer};
