// Background task execution
// A task body runs on its own worker; progress and completion come back
// through a status channel.

pub mod cancel;
pub mod runner;
pub mod status;

pub use cancel::{CancelToken, Interrupted};
pub use runner::{BackgroundTask, RunState, Task, TaskContext};
pub use status::{ChannelListener, ListenerMessage, StatusChannel, TaskEvent};
