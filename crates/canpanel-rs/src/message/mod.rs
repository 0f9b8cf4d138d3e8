pub mod codec;
pub mod dispatch;

pub use codec::{Codec, MessageCodec, PanelMessage, decode_frame};
pub use dispatch::Dispatcher;
