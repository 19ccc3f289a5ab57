//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol. See the module
//! docs in `protocol` for the frame layout.

use std::io::{Read, Write};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CachetError, Result};

use super::{Opcode, Request, Response, Status};

/// Fixed frame header size
pub const HEADER_SIZE: usize = 24;

/// Maximum frame body size (20 MB)
pub const MAX_BODY_SIZE: u32 = 20 * 1024 * 1024;

const MAGIC_REQUEST: u8 = 0x80;
const MAGIC_RESPONSE: u8 = 0x81;

// =============================================================================
// Request Encoding/Decoding
// =============================================================================

/// Encode a request to bytes
///
/// `opaque` is the correlation id the matching response will echo back.
pub fn encode_request(request: &Request, opaque: u32) -> Bytes {
    let key = request.key();
    let (extras_len, value_len) = match request {
        Request::Set { value, .. } => (8usize, value.len()),
        _ => (0, 0),
    };
    let body_len = extras_len + key.len() + value_len;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body_len);
    frame.put_u8(MAGIC_REQUEST);
    frame.put_u8(request.opcode() as u8);
    frame.put_u16(key.len() as u16);
    frame.put_u8(extras_len as u8);
    frame.put_u8(0); // data type, reserved
    frame.put_u16(0); // vbucket id
    frame.put_u32(body_len as u32);
    frame.put_u32(opaque);
    frame.put_u64(request.cas());

    if let Request::Set { flags, expiry, .. } = request {
        frame.put_u32(*flags);
        frame.put_u32(*expiry);
    }
    frame.put_slice(key);
    if let Request::Set { value, .. } = request {
        frame.put_slice(value);
    }

    frame.freeze()
}

/// Decode a request from bytes
///
/// Returns the request and its opaque correlation id.
pub fn decode_request(bytes: &[u8]) -> Result<(Request, u32)> {
    let header = FrameHeader::parse(bytes, MAGIC_REQUEST)?;
    let opcode = Opcode::from_u8(header.opcode).ok_or_else(|| {
        CachetError::Protocol(format!("unknown opcode: 0x{:02x}", header.opcode))
    })?;

    let (mut extras, key, value) = header.split_body(bytes);

    let request = match opcode {
        Opcode::Get => {
            expect_shape(opcode, extras.is_empty() && value.is_empty())?;
            Request::Get { key: key.to_vec() }
        }
        Opcode::Set => {
            expect_shape(opcode, extras.len() == 8)?;
            let flags = extras.get_u32();
            let expiry = extras.get_u32();
            Request::Set {
                key: key.to_vec(),
                value: value.to_vec(),
                flags,
                expiry,
                cas: header.cas,
            }
        }
        Opcode::Delete => {
            expect_shape(opcode, extras.is_empty() && value.is_empty())?;
            Request::Delete { key: key.to_vec() }
        }
    };

    Ok((request, header.opaque))
}

fn expect_shape(opcode: Opcode, ok: bool) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(CachetError::Protocol(format!(
            "malformed {:?} request: unexpected extras or value",
            opcode
        )))
    }
}

// =============================================================================
// Response Encoding/Decoding
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Bytes {
    // Only successful gets carry extras: the entry's 4-byte flags.
    let extras_len = if response.opcode == Opcode::Get && response.status.is_ok() {
        4usize
    } else {
        0
    };
    let body_len = extras_len + response.key.len() + response.value.len();

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + body_len);
    frame.put_u8(MAGIC_RESPONSE);
    frame.put_u8(response.opcode as u8);
    frame.put_u16(response.key.len() as u16);
    frame.put_u8(extras_len as u8);
    frame.put_u8(0);
    frame.put_u16(response.status.code());
    frame.put_u32(body_len as u32);
    frame.put_u32(response.opaque);
    frame.put_u64(response.cas);

    if extras_len == 4 {
        frame.put_u32(response.flags);
    }
    frame.put_slice(&response.key);
    frame.put_slice(&response.value);

    frame.freeze()
}

/// Decode a response from bytes
pub fn decode_response(bytes: &[u8]) -> Result<Response> {
    let header = FrameHeader::parse(bytes, MAGIC_RESPONSE)?;
    let opcode = Opcode::from_u8(header.opcode).ok_or_else(|| {
        CachetError::Protocol(format!("unknown opcode in response: 0x{:02x}", header.opcode))
    })?;

    let (mut extras, key, value) = header.split_body(bytes);
    let flags = if extras.len() >= 4 { extras.get_u32() } else { 0 };

    Ok(Response {
        opcode,
        status: Status::from_code(header.status),
        opaque: header.opaque,
        cas: header.cas,
        flags,
        key: key.to_vec(),
        value: value.to_vec(),
    })
}

// =============================================================================
// Header Parsing
// =============================================================================

/// Parsed fixed-size frame header
struct FrameHeader {
    opcode: u8,
    key_len: usize,
    extras_len: usize,
    status: u16,
    body_len: usize,
    opaque: u32,
    cas: u64,
}

impl FrameHeader {
    /// Parse and validate a frame header, checking that the buffer holds the
    /// full body and that the length fields are mutually consistent.
    fn parse(bytes: &[u8], expected_magic: u8) -> Result<FrameHeader> {
        if bytes.len() < HEADER_SIZE {
            return Err(CachetError::Protocol(format!(
                "incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut header = &bytes[..HEADER_SIZE];
        let magic = header.get_u8();
        if magic != expected_magic {
            return Err(CachetError::Protocol(format!(
                "invalid magic: expected 0x{:02x}, got 0x{:02x}",
                expected_magic, magic
            )));
        }

        let opcode = header.get_u8();
        let key_len = header.get_u16() as usize;
        let extras_len = header.get_u8() as usize;
        let _data_type = header.get_u8();
        let status = header.get_u16();
        let body_len = header.get_u32();
        let opaque = header.get_u32();
        let cas = header.get_u64();

        if body_len > MAX_BODY_SIZE {
            return Err(CachetError::Protocol(format!(
                "frame body too large: {} bytes (max {})",
                body_len, MAX_BODY_SIZE
            )));
        }
        let body_len = body_len as usize;

        if bytes.len() < HEADER_SIZE + body_len {
            return Err(CachetError::Protocol(format!(
                "incomplete body: expected {} bytes, got {}",
                HEADER_SIZE + body_len,
                bytes.len()
            )));
        }

        if extras_len + key_len > body_len {
            return Err(CachetError::Protocol(format!(
                "inconsistent lengths: extras {} + key {} exceed body {}",
                extras_len, key_len, body_len
            )));
        }

        Ok(FrameHeader {
            opcode,
            key_len,
            extras_len,
            status,
            body_len,
            opaque,
            cas,
        })
    }

    /// Split the validated body into (extras, key, value) slices
    fn split_body<'a>(&self, bytes: &'a [u8]) -> (&'a [u8], &'a [u8], &'a [u8]) {
        let body = &bytes[HEADER_SIZE..HEADER_SIZE + self.body_len];
        let (extras, rest) = body.split_at(self.extras_len);
        let (key, value) = rest.split_at(self.key_len);
        (extras, key, value)
    }
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one complete frame (header + body) from a stream
fn read_frame<R: Read>(reader: &mut R) -> Result<Vec<u8>> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let body_len = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
    if body_len > MAX_BODY_SIZE {
        return Err(CachetError::Protocol(format!(
            "frame body too large: {} bytes (max {})",
            body_len, MAX_BODY_SIZE
        )));
    }

    let mut frame = vec![0u8; HEADER_SIZE + body_len as usize];
    frame[..HEADER_SIZE].copy_from_slice(&header);
    if body_len > 0 {
        reader.read_exact(&mut frame[HEADER_SIZE..])?;
    }
    Ok(frame)
}

/// Read a complete request from a stream
///
/// Blocks until a full frame is received or an error occurs.
pub fn read_request<R: Read>(reader: &mut R) -> Result<(Request, u32)> {
    let frame = read_frame(reader)?;
    decode_request(&frame)
}

/// Write a request to a stream
pub fn write_request<W: Write>(writer: &mut W, request: &Request, opaque: u32) -> Result<()> {
    writer.write_all(&encode_request(request, opaque))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: Read>(reader: &mut R) -> Result<Response> {
    let frame = read_frame(reader)?;
    decode_response(&frame)
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}
