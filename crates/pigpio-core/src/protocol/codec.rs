//! Binary codec for pigpio command and response frames.
//!
//! Wire format:
//! ```text
//! command:  [cmd:4][p1:4][p2:4][p3:4][extension:p3]
//! response: [0:4][0:4][0:4][result:4][payload:N]
//! ```
//! All words are little-endian.  Decoding is split in two steps because the
//! server reads a frame off the socket in two steps: first the fixed header,
//! then exactly `p3` extension bytes.

use thiserror::Error;

use crate::protocol::messages::{
    CommandCode, FrameHeader, Request, Response, GREETING_WORDS, HEADER_SIZE, RESPONSE_SIZE,
};

/// Errors that can occur during frame decoding.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the fixed part of the frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The extension handed to the decoder is not the length `p3` announced.
    #[error("extension length mismatch: header says {declared}, available is {available}")]
    ExtensionLengthMismatch { declared: usize, available: usize },
}

// ── Headers ───────────────────────────────────────────────────────────────────

/// Decodes the 16-byte header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 16 bytes are given.
///
/// # Examples
///
/// ```rust
/// use pigpio_core::protocol::{decode_header, encode_header, FrameHeader};
///
/// let header = FrameHeader::new(82, 0, 0, 0);
/// assert_eq!(decode_header(&encode_header(&header)).unwrap(), header);
/// ```
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    Ok(FrameHeader {
        cmd: read_u32(bytes, 0),
        p1: read_u32(bytes, 4),
        p2: [bytes[8], bytes[9], bytes[10], bytes[11]],
        p3: read_u32(bytes, 12),
    })
}

/// Encodes a header into its 16 wire bytes.
pub fn encode_header(header: &FrameHeader) -> [u8; HEADER_SIZE] {
    let mut buf = [0u8; HEADER_SIZE];
    buf[0..4].copy_from_slice(&header.cmd.to_le_bytes());
    buf[4..8].copy_from_slice(&header.p1.to_le_bytes());
    buf[8..12].copy_from_slice(&header.p2);
    buf[12..16].copy_from_slice(&header.p3.to_le_bytes());
    buf
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Turns a header and its extension into a typed [`Request`].
///
/// `extension` must hold exactly `header.p3` bytes.  The per-command meaning
/// of `p2` is resolved here:
///
/// | cmd   | decoded as                                          |
/// |-------|-----------------------------------------------------|
/// | SERO  | `p1` = bit rate, `p2` = flags, extension = path     |
/// | SERC  | `p1` = handle                                       |
/// | SERW  | `p1` = handle, extension = data                     |
/// | SERR  | `p1` = handle, `p2` = requested size                |
/// | SERDA | `p1` = handle                                       |
///
/// Every other code becomes [`Request::Unsupported`].  A device path that is
/// not valid UTF-8 is decoded lossily, so it simply never matches a port.
///
/// # Errors
///
/// Returns [`ProtocolError::ExtensionLengthMismatch`] if `extension.len()`
/// differs from `header.p3`.
pub fn decode_request(header: FrameHeader, extension: &[u8]) -> Result<Request, ProtocolError> {
    if extension.len() != header.extension_len() {
        return Err(ProtocolError::ExtensionLengthMismatch {
            declared: header.extension_len(),
            available: extension.len(),
        });
    }

    let request = match header.command() {
        Some(CommandCode::SerialOpen) => Request::OpenPort {
            bit_rate: header.p1,
            flags: header.p2_value(),
            port_name: String::from_utf8_lossy(extension).into_owned(),
        },
        Some(CommandCode::SerialClose) => Request::ClosePort { handle: header.p1 },
        Some(CommandCode::SerialWrite) => Request::Write {
            handle: header.p1,
            data: extension.to_vec(),
        },
        Some(CommandCode::SerialRead) => Request::Read {
            handle: header.p1,
            max_len: header.p2_value(),
        },
        Some(CommandCode::SerialDataAvailable) => Request::DataAvailable { handle: header.p1 },
        Some(CommandCode::SerialReadByte) | Some(CommandCode::SerialWriteByte) | None => {
            Request::Unsupported {
                header,
                extension: extension.to_vec(),
            }
        }
    };
    Ok(request)
}

/// Encodes a [`Request`] the way a pigpio client library puts it on the wire.
///
/// The emulator itself only decodes requests; this is the client half, used by
/// test clients and benchmarks.
///
/// # Examples
///
/// ```rust
/// use pigpio_core::protocol::{decode_header, decode_request, encode_request, Request, HEADER_SIZE};
///
/// let request = Request::Write { handle: 0, data: b"abc".to_vec() };
/// let bytes = encode_request(&request);
/// let header = decode_header(&bytes).unwrap();
/// assert_eq!(decode_request(header, &bytes[HEADER_SIZE..]).unwrap(), request);
/// ```
pub fn encode_request(request: &Request) -> Vec<u8> {
    let (header, extension): (FrameHeader, &[u8]) = match request {
        Request::OpenPort {
            bit_rate,
            flags,
            port_name,
        } => (
            FrameHeader::new(
                CommandCode::SerialOpen as u32,
                *bit_rate,
                *flags,
                port_name.len() as u32,
            ),
            port_name.as_bytes(),
        ),
        Request::ClosePort { handle } => (
            FrameHeader::new(CommandCode::SerialClose as u32, *handle, 0, 0),
            &[],
        ),
        Request::Write { handle, data } => (
            FrameHeader::new(CommandCode::SerialWrite as u32, *handle, 0, data.len() as u32),
            data.as_slice(),
        ),
        Request::Read { handle, max_len } => (
            FrameHeader::new(CommandCode::SerialRead as u32, *handle, *max_len, 0),
            &[],
        ),
        Request::DataAvailable { handle } => (
            FrameHeader::new(CommandCode::SerialDataAvailable as u32, *handle, 0, 0),
            &[],
        ),
        Request::Unsupported { header, extension } => (*header, extension.as_slice()),
    };

    let mut buf = Vec::with_capacity(HEADER_SIZE + extension.len());
    buf.extend_from_slice(&encode_header(&header));
    buf.extend_from_slice(extension);
    buf
}

// ── Responses ─────────────────────────────────────────────────────────────────

/// Encodes a [`Response`]: three zero words, the result word, then the payload.
pub fn encode_response(response: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(response.encoded_len());
    buf.extend_from_slice(&[0u8; 12]);
    buf.extend_from_slice(&response.result.to_le_bytes());
    buf.extend_from_slice(&response.payload);
    buf
}

/// Reads the signed result word from the first 16 bytes of a response.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] if fewer than 16 bytes are given.
pub fn decode_response_result(bytes: &[u8]) -> Result<i32, ProtocolError> {
    if bytes.len() < RESPONSE_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: RESPONSE_SIZE,
            available: bytes.len(),
        });
    }
    Ok(read_u32(bytes, 12) as i32)
}

/// The 16-byte handshake frame `10, 0, 0, 0`.
pub fn encode_greeting() -> [u8; RESPONSE_SIZE] {
    let mut buf = [0u8; RESPONSE_SIZE];
    for (chunk, word) in buf.chunks_exact_mut(4).zip(GREETING_WORDS) {
        chunk.copy_from_slice(&word.to_le_bytes());
    }
    buf
}

// ── Utility helpers ───────────────────────────────────────────────────────────

/// Caller guarantees `buf.len() >= offset + 4`.
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::{PI_BAD_HANDLE, PORT_NOT_FOUND};

    fn frame(cmd: u32, p1: u32, p2: u32, ext: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&cmd.to_le_bytes());
        bytes.extend_from_slice(&p1.to_le_bytes());
        bytes.extend_from_slice(&p2.to_le_bytes());
        bytes.extend_from_slice(&(ext.len() as u32).to_le_bytes());
        bytes.extend_from_slice(ext);
        bytes
    }

    fn decode_frame(bytes: &[u8]) -> Request {
        let header = decode_header(bytes).unwrap();
        decode_request(header, &bytes[HEADER_SIZE..]).unwrap()
    }

    #[test]
    fn test_decode_header_reads_little_endian_words() {
        // Arrange
        let bytes = frame(80, 3, 512, &[]);

        // Act
        let header = decode_header(&bytes).unwrap();

        // Assert
        assert_eq!(header.cmd, 80);
        assert_eq!(header.p1, 3);
        assert_eq!(header.p2_value(), 512);
        assert_eq!(header.p3, 0);
    }

    #[test]
    fn test_decode_header_rejects_short_input() {
        let err = decode_header(&[0u8; 15]).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::InsufficientData {
                needed: 16,
                available: 15
            }
        );
    }

    #[test]
    fn test_sero_decodes_flags_and_port_name_from_extension() {
        // Arrange
        let bytes = frame(76, 115_200, 0, b"/dev/ttyAMA0");

        // Act
        let request = decode_frame(&bytes);

        // Assert
        assert_eq!(
            request,
            Request::OpenPort {
                bit_rate: 115_200,
                flags: 0,
                port_name: "/dev/ttyAMA0".to_string(),
            }
        );
    }

    #[test]
    fn test_sero_with_non_utf8_name_decodes_lossily() {
        let request = decode_frame(&frame(76, 9_600, 0, &[0xFF, b'x']));
        match request {
            Request::OpenPort { port_name, .. } => assert_eq!(port_name, "\u{FFFD}x"),
            other => panic!("expected OpenPort, got {other:?}"),
        }
    }

    #[test]
    fn test_serw_data_is_the_extension() {
        let request = decode_frame(&frame(81, 2, 0, b"abc"));
        assert_eq!(
            request,
            Request::Write {
                handle: 2,
                data: b"abc".to_vec()
            }
        );
    }

    #[test]
    fn test_serr_size_comes_from_p2() {
        let request = decode_frame(&frame(80, 1, 4096, &[]));
        assert_eq!(
            request,
            Request::Read {
                handle: 1,
                max_len: 4096
            }
        );
    }

    #[test]
    fn test_serc_and_serda_take_handle_from_p1() {
        assert_eq!(
            decode_frame(&frame(77, 5, 0, &[])),
            Request::ClosePort { handle: 5 }
        );
        assert_eq!(
            decode_frame(&frame(82, 6, 0, &[])),
            Request::DataAvailable { handle: 6 }
        );
    }

    #[test]
    fn test_single_byte_commands_are_unsupported() {
        for cmd in [78u32, 79] {
            let request = decode_frame(&frame(cmd, 0, 0x41, &[]));
            assert!(matches!(request, Request::Unsupported { .. }), "cmd {cmd}");
        }
    }

    #[test]
    fn test_unknown_command_keeps_its_extension() {
        let request = decode_frame(&frame(17, 0, 0, b"xy"));
        match request {
            Request::Unsupported { header, extension } => {
                assert_eq!(header.cmd, 17);
                assert_eq!(extension, b"xy");
            }
            other => panic!("expected Unsupported, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_request_rejects_wrong_extension_length() {
        let header = FrameHeader::new(81, 0, 0, 4);
        let err = decode_request(header, b"ab").unwrap_err();
        assert_eq!(
            err,
            ProtocolError::ExtensionLengthMismatch {
                declared: 4,
                available: 2
            }
        );
    }

    #[test]
    fn test_encode_request_matches_client_byte_layout() {
        // Arrange
        let request = Request::OpenPort {
            bit_rate: 115_200,
            flags: 0,
            port_name: "/dev/ttyAMA0".to_string(),
        };

        // Act
        let bytes = encode_request(&request);

        // Assert
        assert_eq!(bytes, frame(76, 115_200, 0, b"/dev/ttyAMA0"));
    }

    #[test]
    fn test_encode_response_layout() {
        let bytes = encode_response(&Response::with_payload(b"hi".to_vec()));
        assert_eq!(&bytes[0..12], &[0u8; 12]);
        assert_eq!(&bytes[12..16], &2i32.to_le_bytes());
        assert_eq!(&bytes[16..], b"hi");
    }

    #[test]
    fn test_negative_results_round_trip_through_result_word() {
        for code in [PORT_NOT_FOUND, PI_BAD_HANDLE] {
            let bytes = encode_response(&Response::status(code));
            assert_eq!(decode_response_result(&bytes).unwrap(), code);
        }
    }

    #[test]
    fn test_decode_response_result_rejects_short_input() {
        assert!(decode_response_result(&[0u8; 8]).is_err());
    }

    #[test]
    fn test_greeting_is_ten_then_zeros() {
        let greeting = encode_greeting();
        assert_eq!(&greeting[0..4], &10u32.to_le_bytes());
        assert_eq!(&greeting[4..], &[0u8; 12]);
    }
}
