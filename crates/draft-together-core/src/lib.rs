// Library root: the shared draft/champion model and the websocket protocol,
// free of I/O so both the server and any client can depend on it.

pub mod champion;
pub mod draft;
pub mod protocol;
