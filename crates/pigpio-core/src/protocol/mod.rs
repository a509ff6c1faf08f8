//! Protocol module containing the command codes, frame types and binary codec.

pub mod codec;
pub mod messages;

pub use codec::{
    decode_header, decode_request, decode_response_result, encode_greeting, encode_header,
    encode_request, encode_response, ProtocolError,
};
pub use messages::*;
