//! Stable IPC channel names

// Agent session invokes
pub const SESSION_CREATE: &str = "session.create";
pub const SESSION_SEND: &str = "session.send";
pub const SESSION_STOP: &str = "session.stop";
pub const SESSION_DESTROY: &str = "session.destroy";
pub const SESSION_HAS: &str = "session.has";
pub const SESSION_LIST: &str = "session.list";
pub const PERMISSION_RESPOND: &str = "session.permission.respond";
pub const MODELS_LIST: &str = "models.list";

// Agent session events
pub const SESSION_EVENT: &str = "session.event";
pub const PERMISSION_REQUEST: &str = "session.permission.request";

// Terminal invokes
pub const TERMINAL_CREATE: &str = "terminal.create";
pub const TERMINAL_WRITE: &str = "terminal.write";
pub const TERMINAL_RESIZE: &str = "terminal.resize";
pub const TERMINAL_KILL: &str = "terminal.kill";
pub const TERMINAL_LIST: &str = "terminal.list";

// Terminal events
pub const TERMINAL_DATA: &str = "terminal.data";
pub const TERMINAL_EXIT: &str = "terminal.exit";
