//! Command codes, frame headers and the typed request/response values.
//!
//! # Frame layout (for beginners)
//!
//! Every command a pigpio client sends starts with a 16-byte header made of
//! four little-endian 32-bit words:
//!
//! ```text
//!  0        4        8        12       16
//!  ┌────────┬────────┬────────┬────────┐
//!  │  cmd   │   p1   │   p2   │   p3   │  [extension: p3 bytes]
//!  └────────┴────────┴────────┴────────┘
//! ```
//!
//! `p3` doubles as the length of an optional *extension* that follows the
//! header.  When `p3 == 0`, `p2` is a number whose meaning depends on `cmd`
//! (for `SERR` it is the requested read size).  When `p3 != 0`, `p2` and the
//! extension together form one byte string: for `SERO` the four `p2` bytes are
//! the open flags and the extension is the device path.
//!
//! The codec resolves that dual meaning once, when it turns a header into a
//! [`Request`], so nothing downstream ever looks at a raw `p2` again.
//!
//! Responses are always at least the four words `0, 0, 0, result`.  A `SERR`
//! response appends the bytes that were read.

// ── Constants ─────────────────────────────────────────────────────────────────

/// Size of a command frame header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Size of a response frame without payload in bytes.
pub const RESPONSE_SIZE: usize = 16;

/// Four-word handshake sent on the notification connection.
pub const GREETING_WORDS: [u32; 4] = [10, 0, 0, 0];

/// Result of `SERO` when no port matches the requested name and bit rate.
pub const PORT_NOT_FOUND: i32 = -1;

/// Result for a command naming a handle this session never issued or already
/// closed.  Same value as pigpio's `PI_BAD_HANDLE`.
pub const PI_BAD_HANDLE: i32 = -25;

// ── Command codes ─────────────────────────────────────────────────────────────

/// The serial command codes the emulator recognises.
///
/// Values match `pigpio.h`.  `SerialReadByte` and `SerialWriteByte` are known
/// but not served: they take the same path as an unknown command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandCode {
    SerialOpen = 76,
    SerialClose = 77,
    SerialReadByte = 78,
    SerialWriteByte = 79,
    SerialRead = 80,
    SerialWrite = 81,
    SerialDataAvailable = 82,
}

impl CommandCode {
    /// The pigpio mnemonic for this command, used in log lines.
    pub fn mnemonic(self) -> &'static str {
        match self {
            CommandCode::SerialOpen => "SERO",
            CommandCode::SerialClose => "SERC",
            CommandCode::SerialReadByte => "SERRB",
            CommandCode::SerialWriteByte => "SERWB",
            CommandCode::SerialRead => "SERR",
            CommandCode::SerialWrite => "SERW",
            CommandCode::SerialDataAvailable => "SERDA",
        }
    }
}

impl TryFrom<u32> for CommandCode {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            76 => Ok(CommandCode::SerialOpen),
            77 => Ok(CommandCode::SerialClose),
            78 => Ok(CommandCode::SerialReadByte),
            79 => Ok(CommandCode::SerialWriteByte),
            80 => Ok(CommandCode::SerialRead),
            81 => Ok(CommandCode::SerialWrite),
            82 => Ok(CommandCode::SerialDataAvailable),
            _ => Err(()),
        }
    }
}

// ── Frame header ──────────────────────────────────────────────────────────────

/// The raw 16-byte header of a command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub cmd: u32,
    pub p1: u32,
    /// Kept as raw bytes: a number or the start of a byte string depending on
    /// `cmd` and `p3`.
    pub p2: [u8; 4],
    /// Extension length.
    pub p3: u32,
}

impl FrameHeader {
    /// Builds a header whose `p2` carries a little-endian number.
    pub fn new(cmd: u32, p1: u32, p2: u32, p3: u32) -> Self {
        Self {
            cmd,
            p1,
            p2: p2.to_le_bytes(),
            p3,
        }
    }

    /// `p2` read as a little-endian `u32`.
    pub fn p2_value(&self) -> u32 {
        u32::from_le_bytes(self.p2)
    }

    /// Number of extension bytes that follow this header on the wire.
    pub fn extension_len(&self) -> usize {
        self.p3 as usize
    }

    /// The recognised command, if any.
    pub fn command(&self) -> Option<CommandCode> {
        CommandCode::try_from(self.cmd).ok()
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// A fully decoded command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    /// `SERO`: bind a port by device path and bit rate.
    OpenPort {
        bit_rate: u32,
        flags: u32,
        port_name: String,
    },
    /// `SERC`: release a handle.
    ClosePort { handle: u32 },
    /// `SERW`: send bytes to the port.
    Write { handle: u32, data: Vec<u8> },
    /// `SERR`: read up to `max_len` bytes from the port.
    Read { handle: u32, max_len: u32 },
    /// `SERDA`: how many bytes are waiting.
    DataAvailable { handle: u32 },
    /// Anything else, including `SERRB`/`SERWB`.  No response is sent.
    Unsupported {
        header: FrameHeader,
        extension: Vec<u8>,
    },
}

impl Request {
    /// Short name for log lines.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Request::OpenPort { .. } => CommandCode::SerialOpen.mnemonic(),
            Request::ClosePort { .. } => CommandCode::SerialClose.mnemonic(),
            Request::Write { .. } => CommandCode::SerialWrite.mnemonic(),
            Request::Read { .. } => CommandCode::SerialRead.mnemonic(),
            Request::DataAvailable { .. } => CommandCode::SerialDataAvailable.mnemonic(),
            Request::Unsupported { header, .. } => {
                header.command().map_or("UNKNOWN", CommandCode::mnemonic)
            }
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// A response frame: `0, 0, 0, result` followed by `payload`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub result: i32,
    pub payload: Vec<u8>,
}

impl Response {
    /// A response carrying only a result word (a handle, a count or an error).
    pub fn status(result: i32) -> Self {
        Self {
            result,
            payload: Vec::new(),
        }
    }

    /// A read response: the result word is the payload length.
    pub fn with_payload(payload: Vec<u8>) -> Self {
        Self {
            result: i32::try_from(payload.len()).unwrap_or(i32::MAX),
            payload,
        }
    }

    /// Total bytes this response occupies on the wire.
    pub fn encoded_len(&self) -> usize {
        RESPONSE_SIZE + self.payload.len()
    }
}
