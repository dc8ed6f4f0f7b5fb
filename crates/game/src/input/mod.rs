mod buffer;
mod command;
mod history;
mod sender;

pub use buffer::InputBuffer;
pub use command::{DEFAULT_INPUT_DT, InputCommand};
pub use history::{InputHistory, InputHistoryEntry, MAX_HISTORY_SIZE};
pub use sender::{DEFAULT_SEND_INTERVAL, ErrorHandler, NetworkSender, SendError, SenderConfig};
