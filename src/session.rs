//! Transport Session
//!
//! Owns the single duplex connection to the server.

use std::io::{BufReader, BufWriter, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{CachetError, Result};
use crate::protocol::{encode_request, read_response, Request, Response};

/// A session over one TCP connection
///
/// Writes are buffered; `flush` pushes every queued frame to the wire in one
/// go, which is what makes pipelined runs a single round of writes. Reads
/// return one full response frame at a time, in whatever order the server
/// sends them. The socket closes when the session drops, on every exit path.
pub struct Session {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    /// Peer address for logging
    peer_addr: String,
}

impl Session {
    /// Connect to the server named in the config
    ///
    /// Applies nodelay and socket timeout settings before any I/O happens.
    pub fn connect(config: &ClientConfig) -> Result<Self> {
        let stream = if config.connect_timeout_ms > 0 {
            let addr = config
                .addr
                .to_socket_addrs()?
                .next()
                .ok_or_else(|| {
                    CachetError::Config(format!("address resolves to nothing: {}", config.addr))
                })?;
            TcpStream::connect_timeout(&addr, Duration::from_millis(config.connect_timeout_ms))?
        } else {
            TcpStream::connect(&config.addr)?
        };

        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        if config.nodelay {
            stream.set_nodelay(true)?;
        }
        if config.read_timeout_ms > 0 {
            stream.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms)))?;
        }
        if config.write_timeout_ms > 0 {
            stream.set_write_timeout(Some(Duration::from_millis(config.write_timeout_ms)))?;
        }

        // Clone stream for separate read/write handles
        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        tracing::debug!("connected to {}", peer_addr);

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(write_stream),
            peer_addr,
        })
    }

    /// Queue one request frame for transmission
    ///
    /// The frame sits in the write buffer until `flush`; a full buffer spills
    /// to the socket on its own. Either the whole frame is accepted or this
    /// fails with a connection error.
    pub fn send(&mut self, request: &Request, opaque: u32) -> Result<()> {
        tracing::trace!(
            "send {:?} seq={} to {}",
            request.opcode(),
            opaque,
            self.peer_addr
        );
        self.writer.write_all(&encode_request(request, opaque))?;
        Ok(())
    }

    /// Push all queued frames to the wire
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Block until one full response frame arrives
    ///
    /// A closed or half-closed connection surfaces as a connection error;
    /// garbage on the wire as a protocol error.
    pub fn receive(&mut self) -> Result<Response> {
        let response = read_response(&mut self.reader)?;
        tracing::trace!(
            "recv {:?} seq={} status={:?} from {}",
            response.opcode,
            response.opaque,
            response.status,
            self.peer_addr
        );
        Ok(response)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
