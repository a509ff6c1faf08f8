//! CommandHandler: per-session dispatch of decoded serial commands.
//!
//! Every client session owns exactly one `CommandHandler`.  It holds the
//! session's open bindings and turns each [`Request`] into the [`Response`]
//! the client expects, or into nothing at all for commands the emulator does
//! not serve.
//!
//! # Handles (for beginners)
//!
//! A pigpio handle is just a small integer the client passes back on every
//! later call.  Here it is the index of the binding in the session's list:
//!
//! ```text
//! SERO /dev/ttyAMA0        → handle 0   bindings = [Some(A)]
//! SERO /dev/ttyUSBMotorCard → handle 1   bindings = [Some(A), Some(B)]
//! SERC 0                   → 0          bindings = [None,    Some(B)]
//! SERO /dev/ttyAMA0        → handle 2   bindings = [None,    Some(B), Some(C)]
//! ```
//!
//! A closed slot stays in the list as `None`, so handle 1 keeps meaning "B"
//! for as long as the session lives and a closed handle is never reissued.
//! Commands naming an empty or out-of-range slot get [`PI_BAD_HANDLE`].

use std::sync::Arc;

use pigpio_core::protocol::messages::{PI_BAD_HANDLE, PORT_NOT_FOUND};
use pigpio_core::{CommandCode, PortRegistry, Request, Response};
use tracing::{debug, info, warn};

use crate::application::serial_binding::SerialBinding;

/// Per-session command state and dispatcher.
#[derive(Debug)]
pub struct CommandHandler {
    session_id: u64,
    registry: Arc<PortRegistry>,
    bindings: Vec<Option<SerialBinding>>,
}

impl CommandHandler {
    pub fn new(session_id: u64, registry: Arc<PortRegistry>) -> Self {
        Self {
            session_id,
            registry,
            bindings: Vec::new(),
        }
    }

    /// Number of handles currently open in this session.
    pub fn open_handles(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }

    /// The open binding behind `handle`, if any.
    pub fn binding(&self, handle: u32) -> Option<&SerialBinding> {
        self.bindings.get(handle as usize).and_then(Option::as_ref)
    }

    /// Executes one command.
    ///
    /// Returns the response to send on the primary socket, or `None` when the
    /// command is not served (the client then gets no reply at all).
    pub fn handle(&mut self, request: Request) -> Option<Response> {
        let session = self.session_id;
        match request {
            Request::OpenPort {
                bit_rate,
                flags,
                port_name,
            } => Some(self.open_port(&port_name, bit_rate, flags)),

            Request::ClosePort { handle } => {
                let Some(slot) = self.bindings.get_mut(handle as usize) else {
                    return Some(bad_handle(session, "SERC", handle));
                };
                match slot.take() {
                    Some(binding) => {
                        info!(
                            "session {session}: closed handle {handle} on {}",
                            binding.port().name()
                        );
                        Some(Response::status(handle_result(handle)))
                    }
                    None => Some(bad_handle(session, "SERC", handle)),
                }
            }

            Request::Write { handle, data } => match self.binding(handle) {
                Some(binding) => {
                    debug!("session {session}: SERW handle {handle}, {} bytes", data.len());
                    binding.write(&data);
                    Some(Response::status(handle_result(handle)))
                }
                None => Some(bad_handle(session, "SERW", handle)),
            },

            Request::Read { handle, max_len } => match self.binding_mut(handle) {
                Some(binding) => {
                    let bytes = binding.read(max_len as usize);
                    debug!(
                        "session {session}: SERR handle {handle}, requested {max_len}, returning {}",
                        bytes.len()
                    );
                    Some(Response::with_payload(bytes))
                }
                None => Some(bad_handle(session, "SERR", handle)),
            },

            Request::DataAvailable { handle } => match self.binding(handle) {
                Some(binding) => {
                    let count = i32::try_from(binding.available()).unwrap_or(i32::MAX);
                    Some(Response::status(count))
                }
                None => Some(bad_handle(session, "SERDA", handle)),
            },

            Request::Unsupported { header, .. } => {
                let name = header.command().map_or("UNKNOWN", CommandCode::mnemonic);
                warn!(
                    "session {session}: unsupported command {name} (cmd={}, p1={}, p3={}), no response sent",
                    header.cmd, header.p1, header.p3
                );
                None
            }
        }
    }

    fn open_port(&mut self, port_name: &str, bit_rate: u32, flags: u32) -> Response {
        let session = self.session_id;
        let Some(port) = self.registry.find_port(port_name, bit_rate) else {
            warn!("session {session}: SERO failed, no port {port_name} at {bit_rate} baud");
            return Response::status(PORT_NOT_FOUND);
        };

        let handle = u32::try_from(self.bindings.len()).unwrap_or(u32::MAX);
        self.bindings.push(Some(SerialBinding::open(port, handle)));
        info!(
            "session {session}: opened {port_name} at {bit_rate} baud as handle {handle} (flags={flags:#x})"
        );
        Response::status(handle_result(handle))
    }

    fn binding_mut(&mut self, handle: u32) -> Option<&mut SerialBinding> {
        self.bindings.get_mut(handle as usize).and_then(Option::as_mut)
    }
}

fn handle_result(handle: u32) -> i32 {
    i32::try_from(handle).unwrap_or(i32::MAX)
}

fn bad_handle(session: u64, command: &str, handle: u32) -> Response {
    warn!("session {session}: {command} on unknown handle {handle}");
    Response::status(PI_BAD_HANDLE)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use pigpio_core::protocol::messages::FrameHeader;

    fn make_registry() -> Arc<PortRegistry> {
        let mut registry = PortRegistry::new();
        registry.register("/dev/ttyAMA0", 115_200).unwrap();
        registry.register("/dev/ttyUSBMotorCard", 115_200).unwrap();
        Arc::new(registry)
    }

    fn open(handler: &mut CommandHandler, name: &str) -> Option<Response> {
        handler.handle(Request::OpenPort {
            bit_rate: 115_200,
            flags: 0,
            port_name: name.to_string(),
        })
    }

    #[test]
    fn test_open_known_port_returns_first_handle() {
        // Arrange
        let mut handler = CommandHandler::new(0, make_registry());

        // Act
        let response = open(&mut handler, "/dev/ttyAMA0");

        // Assert
        assert_eq!(response, Some(Response::status(0)));
        assert_eq!(handler.open_handles(), 1);
    }

    #[test]
    fn test_open_unknown_port_returns_not_found_and_binds_nothing() {
        let mut handler = CommandHandler::new(0, make_registry());

        let response = open(&mut handler, "/dev/ttyS9");

        assert_eq!(response, Some(Response::status(-1)));
        assert_eq!(handler.open_handles(), 0);
    }

    #[test]
    fn test_open_with_wrong_bit_rate_is_not_found() {
        let mut handler = CommandHandler::new(0, make_registry());
        let response = handler.handle(Request::OpenPort {
            bit_rate: 9_600,
            flags: 0,
            port_name: "/dev/ttyAMA0".to_string(),
        });
        assert_eq!(response, Some(Response::status(PORT_NOT_FOUND)));
    }

    #[test]
    fn test_handles_are_sequential_indices() {
        let mut handler = CommandHandler::new(0, make_registry());
        assert_eq!(open(&mut handler, "/dev/ttyAMA0"), Some(Response::status(0)));
        assert_eq!(open(&mut handler, "/dev/ttyUSBMotorCard"), Some(Response::status(1)));
        assert_eq!(open(&mut handler, "/dev/ttyAMA0"), Some(Response::status(2)));
    }

    #[test]
    fn test_write_reaches_port_output_buffer() {
        // Arrange
        let registry = make_registry();
        let port = registry.find_port("/dev/ttyAMA0", 115_200).unwrap();
        let (_, output_cursor) = port.bind();
        let mut handler = CommandHandler::new(0, Arc::clone(&registry));
        open(&mut handler, "/dev/ttyAMA0");

        // Act
        let response = handler.handle(Request::Write {
            handle: 0,
            data: b"abc".to_vec(),
        });

        // Assert
        assert_eq!(response, Some(Response::status(0)));
        assert_eq!(port.output_available(output_cursor), 3);
        assert_eq!(port.get_output(output_cursor, 3).0, b"abc");
    }

    #[test]
    fn test_read_returns_only_available_bytes() {
        // Arrange
        let registry = make_registry();
        let port = registry.find_port("/dev/ttyAMA0", 115_200).unwrap();
        let mut handler = CommandHandler::new(0, Arc::clone(&registry));
        open(&mut handler, "/dev/ttyAMA0");
        port.put_input(b"OK");

        // Act
        let response = handler.handle(Request::Read {
            handle: 0,
            max_len: 1000,
        });

        // Assert
        assert_eq!(response, Some(Response::with_payload(b"OK".to_vec())));
    }

    #[test]
    fn test_data_available_reports_pending_input() {
        let registry = make_registry();
        let port = registry.find_port("/dev/ttyAMA0", 115_200).unwrap();
        let mut handler = CommandHandler::new(0, Arc::clone(&registry));
        open(&mut handler, "/dev/ttyAMA0");
        port.put_input(b"12345");

        let response = handler.handle(Request::DataAvailable { handle: 0 });

        assert_eq!(response, Some(Response::status(5)));
    }

    #[test]
    fn test_close_returns_handle_and_leaves_other_handles_intact() {
        // Arrange
        let mut handler = CommandHandler::new(0, make_registry());
        open(&mut handler, "/dev/ttyAMA0");
        open(&mut handler, "/dev/ttyUSBMotorCard");

        // Act
        let response = handler.handle(Request::ClosePort { handle: 0 });

        // Assert
        assert_eq!(response, Some(Response::status(0)));
        assert!(handler.binding(0).is_none());
        assert_eq!(handler.binding(1).unwrap().port().name(), "/dev/ttyUSBMotorCard");
        assert_eq!(handler.open_handles(), 1);
    }

    #[test]
    fn test_closed_handle_is_not_reused() {
        let mut handler = CommandHandler::new(0, make_registry());
        open(&mut handler, "/dev/ttyAMA0");
        handler.handle(Request::ClosePort { handle: 0 });

        let response = open(&mut handler, "/dev/ttyAMA0");

        assert_eq!(response, Some(Response::status(1)));
    }

    #[test]
    fn test_commands_on_closed_handle_return_bad_handle() {
        // Arrange
        let mut handler = CommandHandler::new(0, make_registry());
        open(&mut handler, "/dev/ttyAMA0");
        handler.handle(Request::ClosePort { handle: 0 });

        // Act / Assert
        let bad = Some(Response::status(PI_BAD_HANDLE));
        assert_eq!(handler.handle(Request::ClosePort { handle: 0 }), bad);
        assert_eq!(
            handler.handle(Request::Write {
                handle: 0,
                data: b"x".to_vec()
            }),
            bad
        );
        assert_eq!(handler.handle(Request::Read { handle: 0, max_len: 1 }), bad);
        assert_eq!(handler.handle(Request::DataAvailable { handle: 0 }), bad);
    }

    #[test]
    fn test_never_issued_handle_returns_bad_handle() {
        let mut handler = CommandHandler::new(0, make_registry());
        let response = handler.handle(Request::DataAvailable { handle: 7 });
        assert_eq!(response, Some(Response::status(PI_BAD_HANDLE)));
    }

    #[test]
    fn test_unsupported_command_produces_no_response() {
        let mut handler = CommandHandler::new(0, make_registry());
        let response = handler.handle(Request::Unsupported {
            header: FrameHeader::new(78, 0, 0, 0),
            extension: Vec::new(),
        });
        assert!(response.is_none());
    }

    #[test]
    fn test_sessions_have_independent_handle_spaces() {
        // Arrange
        let registry = make_registry();
        let port = registry.find_port("/dev/ttyAMA0", 115_200).unwrap();
        let mut first = CommandHandler::new(0, Arc::clone(&registry));
        let mut second = CommandHandler::new(1, Arc::clone(&registry));
        open(&mut first, "/dev/ttyAMA0");
        open(&mut second, "/dev/ttyAMA0");
        port.put_input(b"data");

        // Act – first session drains, second has not read yet
        let drained = first.handle(Request::Read {
            handle: 0,
            max_len: 10,
        });

        // Assert
        assert_eq!(drained, Some(Response::with_payload(b"data".to_vec())));
        assert_eq!(
            first.handle(Request::DataAvailable { handle: 0 }),
            Some(Response::status(0))
        );
        assert_eq!(
            second.handle(Request::DataAvailable { handle: 0 }),
            Some(Response::status(4))
        );
    }
}
