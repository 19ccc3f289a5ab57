//! Protocol Module
//!
//! Defines the binary wire protocol spoken with the cache server.
//!
//! ## Frame Format
//!
//! Every frame starts with a fixed 24-byte header, big-endian throughout:
//!
//! ```text
//! ┌────────┬────────┬─────────────┬────────────┬───────────┐
//! │Magic(1)│Opcode(1)│ Key len (2) │ Extras (1) │ Type (1)  │
//! ├────────┴────────┴─────────────┴────────────┴───────────┤
//! │ Vbucket / Status (2)  │        Body length (4)         │
//! ├───────────────────────┴────────────────────────────────┤
//! │                      Opaque (4)                        │
//! ├────────────────────────────────────────────────────────┤
//! │                       CAS (8)                          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! followed by extras, key, and value. Body length counts all three.
//!
//! ### Magic
//! - 0x80: request
//! - 0x81: response
//!
//! ### Opcodes
//! - 0x00: GET    - no extras; response extras: flags (4)
//! - 0x01: SET    - extras: flags (4) + expiry (4); header CAS for checked set
//! - 0x04: DELETE - no extras
//!
//! ### Status Codes (response header, bytes 6..8)
//! - 0x0000: OK
//! - 0x0001: KEY_NOT_FOUND
//! - 0x0002: KEY_EXISTS
//! - 0x0003: VALUE_TOO_LARGE
//! - 0x0004: INVALID_ARGUMENTS
//! - 0x0005: NOT_STORED
//! - 0x0081: UNKNOWN_COMMAND
//!
//! The opaque field correlates a response to its request; the client assigns
//! sequence numbers to it and matches replies in whatever order they arrive.

mod request;
mod response;
mod codec;

pub use request::{Opcode, Request};
pub use response::{Response, Status};
pub use codec::{
    encode_request, decode_request, encode_response, decode_response, read_request, write_request,
    read_response, write_response, HEADER_SIZE, MAX_BODY_SIZE,
};
