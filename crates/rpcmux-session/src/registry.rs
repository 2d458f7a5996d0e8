use std::collections::HashMap;
use std::sync::Arc;

use rpcmux_frame::{Command, Message};
use serde_json::Value;

use crate::error::{Result, SessionError};
use crate::stream::StreamChannel;

/// Handler for a unary command: decode the request from the message, return
/// a value to encode into the `Response` frame, or an error to carry in an
/// `Error` frame.
pub type UnaryHandler = Arc<dyn Fn(&Message) -> Result<Value> + Send + Sync>;

/// Handler for a streaming command: receives the initiating message and a
/// live [`StreamChannel`] bound to the same sequence number, and runs until
/// it returns or the channel reports closure. No dispatcher-imposed
/// timeout — the application drives its own completion.
pub type StreamHandler = Arc<dyn Fn(&Message, &StreamChannel) -> Result<()> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Handler {
    Unary(UnaryHandler),
    Stream(StreamHandler),
}

/// Command-name-to-handler binding table.
///
/// Populated once at startup, then frozen behind an `Arc` before the
/// server accepts connections — lookups never take a lock.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Handler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a unary handler to a command.
    ///
    /// Registering a command twice is a configuration error, reported here
    /// rather than at call time.
    pub fn register<F>(&mut self, cmd: &str, handler: F) -> Result<()>
    where
        F: Fn(&Message) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(cmd, Handler::Unary(Arc::new(handler)))
    }

    /// Bind a streaming handler to a command.
    pub fn register_stream<F>(&mut self, cmd: &str, handler: F) -> Result<()>
    where
        F: Fn(&Message, &StreamChannel) -> Result<()> + Send + Sync + 'static,
    {
        self.insert(cmd, Handler::Stream(Arc::new(handler)))
    }

    fn insert(&mut self, cmd: &str, handler: Handler) -> Result<()> {
        // Overlength names are caught here, at startup, not on first call.
        Command::new(cmd)?;
        if self.handlers.contains_key(cmd) {
            return Err(SessionError::DuplicateCommand(cmd.to_string()));
        }
        self.handlers.insert(cmd.to_string(), handler);
        Ok(())
    }

    /// Clone out the handler so dispatch can run it on another thread
    /// without borrowing the registry.
    pub(crate) fn lookup(&self, cmd: &str) -> Option<Handler> {
        self.handlers.get(cmd).cloned()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if no commands are registered (pure-client sessions).
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use rpcmux_frame::COMMAND_CAPACITY;

    use super::*;

    #[test]
    fn registers_and_looks_up_both_kinds() {
        let mut registry = HandlerRegistry::new();
        registry
            .register("ping_echo", |msg| Ok(msg.decode_value()?))
            .unwrap();
        registry
            .register_stream("tail_log", |_msg, _stream| Ok(()))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.lookup("ping_echo"),
            Some(Handler::Unary(_))
        ));
        assert!(matches!(
            registry.lookup("tail_log"),
            Some(Handler::Stream(_))
        ));
        assert!(registry.lookup("get_host").is_none());
    }

    #[test]
    fn duplicate_registration_is_a_config_error() {
        let mut registry = HandlerRegistry::new();
        registry.register("echo", |_| Ok(Value::Null)).unwrap();

        let err = registry.register("echo", |_| Ok(Value::Null)).unwrap_err();
        assert!(matches!(err, SessionError::DuplicateCommand(cmd) if cmd == "echo"));

        // Cross-kind duplicates are rejected too.
        let err = registry
            .register_stream("echo", |_, _| Ok(()))
            .unwrap_err();
        assert!(matches!(err, SessionError::DuplicateCommand(_)));
    }

    #[test]
    fn overlength_command_rejected_at_registration() {
        let mut registry = HandlerRegistry::new();
        let name = "c".repeat(COMMAND_CAPACITY + 1);

        let err = registry.register(&name, |_| Ok(Value::Null)).unwrap_err();
        assert!(matches!(
            err,
            SessionError::Wire(rpcmux_frame::WireError::CommandOverlength { .. })
        ));
        assert!(registry.is_empty());
    }
}
