//! Batched runs
//!
//! A run is the unit of pipelining: operations issued on a [`Run`] handle are
//! queued with increasing sequence numbers, flushed together, and their
//! responses drained and dispatched before the run returns to its caller.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{CachetError, Result};
use crate::protocol::{Opcode, Request, Response, Status};
use crate::session::Session;

/// The payload delivered to a per-request handler
///
/// Misses under quiet policy arrive as `value: None`; everything the wire
/// carried is present either way, so there is no separate "extended" handler
/// shape.
#[derive(Debug, Clone)]
pub struct Fetched {
    /// The key the request was issued for
    pub key: Vec<u8>,

    /// The entry's value, or `None` for a quiet miss
    pub value: Option<Vec<u8>>,

    /// Caller-defined flags stored with the entry
    pub flags: u32,

    /// CAS token of the entry
    pub cas: u64,
}

/// What an error handler decided to do with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Treat the error as handled; the run continues
    Swallow,
    /// Propagate the error, aborting the run
    Raise,
}

/// Connection-scoped error handler
///
/// Invoked with the opcode and key of the failed request. Only cache-level
/// errors are offered to it; connection and protocol failures abort the run
/// unconditionally.
pub type ErrorHandler = Box<dyn FnMut(Opcode, &[u8], &CachetError) -> ErrorAction>;

/// Per-call get options
///
/// Unset fields inherit the connection defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct GetOptions {
    /// Override the miss policy for this call
    pub quiet: Option<bool>,
}

/// Per-call set options
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Opaque 32-bit flags stored and returned with the entry
    pub flags: u32,

    /// Expiration in seconds (0 = never)
    pub expiry: u32,

    /// Non-zero makes the store conditional on the entry's current CAS;
    /// a mismatch fails with a key-exists error
    pub cas: u64,
}

/// Per-call delete options
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteOptions {
    /// Override the miss policy for this call
    pub quiet: Option<bool>,
}

type Handler<'a> = Rc<RefCell<dyn FnMut(Fetched) + 'a>>;

/// A request waiting for its response
struct Pending<'a> {
    opcode: Opcode,
    key: Vec<u8>,
    /// Miss policy in effect when the request was issued
    quiet: bool,
    handler: Option<Handler<'a>>,
}

/// An open batching scope
///
/// Operations never block; they are assigned the next sequence number and
/// queued. The drain at the end of the scope blocks until every queued
/// request has been answered or the run aborts on an error, abandoning
/// whatever was still outstanding.
pub struct Run<'a> {
    session: &'a mut Session,
    /// Connection-default miss policy
    quiet: bool,
    /// Run-scoped error handler, shadowing the connection default
    on_error: Option<Box<dyn FnMut(Opcode, &[u8], &CachetError) -> ErrorAction + 'a>>,
    default_on_error: Option<&'a mut ErrorHandler>,
    seqno: u32,
    pending: HashMap<u32, Pending<'a>>,
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        session: &'a mut Session,
        quiet: bool,
        default_on_error: Option<&'a mut ErrorHandler>,
    ) -> Self {
        Self {
            session,
            quiet,
            on_error: None,
            default_on_error,
            seqno: 0,
            pending: HashMap::new(),
        }
    }

    /// Number of operations issued so far in this run
    ///
    /// Sequence numbers start at 1 and increase by one per operation, so this
    /// is also the sequence number most recently assigned.
    pub fn seqno(&self) -> u32 {
        self.seqno
    }

    /// Install a run-scoped error handler
    ///
    /// Shadows the connection's `on_error` for the rest of this run.
    pub fn on_error(
        &mut self,
        handler: impl FnMut(Opcode, &[u8], &CachetError) -> ErrorAction + 'a,
    ) {
        self.on_error = Some(Box::new(handler));
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fetch a key; the handler fires once its response is dispatched
    pub fn get(&mut self, key: &[u8], handler: impl FnMut(Fetched) + 'a) -> Result<()> {
        self.get_with(key, &GetOptions::default(), handler)
    }

    /// Fetch a key with per-call options
    pub fn get_with(
        &mut self,
        key: &[u8],
        options: &GetOptions,
        handler: impl FnMut(Fetched) + 'a,
    ) -> Result<()> {
        let quiet = options.quiet.unwrap_or(self.quiet);
        let handler: Handler<'a> = Rc::new(RefCell::new(handler));
        self.issue(Request::Get { key: key.to_vec() }, quiet, Some(handler))
    }

    /// Fetch a key and discard the result
    ///
    /// Still consumes a sequence number and a round trip; errors are policy
    /// handled as usual.
    pub fn get_discard(&mut self, key: &[u8]) -> Result<()> {
        let quiet = self.quiet;
        self.issue(Request::Get { key: key.to_vec() }, quiet, None)
    }

    /// Fetch several keys through one shared handler
    ///
    /// The handler fires once per key, in server response order.
    pub fn get_multi<K>(&mut self, keys: &[K], handler: impl FnMut(Fetched) + 'a) -> Result<()>
    where
        K: AsRef<[u8]>,
    {
        self.get_multi_with(keys, &GetOptions::default(), handler)
    }

    /// Fetch several keys through one shared handler, with per-call options
    pub fn get_multi_with<K>(
        &mut self,
        keys: &[K],
        options: &GetOptions,
        handler: impl FnMut(Fetched) + 'a,
    ) -> Result<()>
    where
        K: AsRef<[u8]>,
    {
        let quiet = options.quiet.unwrap_or(self.quiet);
        let handler: Handler<'a> = Rc::new(RefCell::new(handler));
        for key in keys {
            self.issue(
                Request::Get {
                    key: key.as_ref().to_vec(),
                },
                quiet,
                Some(Rc::clone(&handler)),
            )?;
        }
        Ok(())
    }

    /// Store a value; the handler receives the new CAS token
    pub fn set(
        &mut self,
        key: &[u8],
        value: &[u8],
        options: &SetOptions,
        handler: impl FnMut(Fetched) + 'a,
    ) -> Result<()> {
        let handler: Handler<'a> = Rc::new(RefCell::new(handler));
        self.issue(set_request(key, value, options), false, Some(handler))
    }

    /// Store a value and discard the result
    pub fn set_discard(&mut self, key: &[u8], value: &[u8], options: &SetOptions) -> Result<()> {
        self.issue(set_request(key, value, options), false, None)
    }

    /// Delete a key
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.delete_with(key, &DeleteOptions::default())
    }

    /// Delete a key with per-call options
    pub fn delete_with(&mut self, key: &[u8], options: &DeleteOptions) -> Result<()> {
        let quiet = options.quiet.unwrap_or(self.quiet);
        self.issue(Request::Delete { key: key.to_vec() }, quiet, None)
    }

    // =========================================================================
    // Queueing and Dispatch
    // =========================================================================

    /// Assign the next sequence number and queue the request
    fn issue(&mut self, request: Request, quiet: bool, handler: Option<Handler<'a>>) -> Result<()> {
        self.seqno += 1;
        let seqno = self.seqno;
        let pending = Pending {
            opcode: request.opcode(),
            key: request.key().to_vec(),
            quiet,
            handler,
        };
        self.session.send(&request, seqno)?;
        self.pending.insert(seqno, pending);
        Ok(())
    }

    /// Flush queued requests and block until all responses are dispatched
    ///
    /// An abort leaves the remaining pending requests abandoned: their
    /// handlers never fire and the error propagates to the caller. Their
    /// responses are still read off the wire so the connection stays usable
    /// for later operations.
    pub(crate) fn finish(mut self) -> Result<()> {
        self.session.flush()?;
        while !self.pending.is_empty() {
            let response = self.session.receive()?;
            if let Err(error) = self.dispatch(response) {
                if !error.is_fatal() {
                    self.reclaim();
                }
                return Err(error);
            }
        }
        Ok(())
    }

    /// Tear down a run whose body failed before the drain
    ///
    /// Requests already queued may be on the wire; push the rest out and
    /// reclaim their responses so they cannot bleed into the next run.
    pub(crate) fn abandon(mut self) {
        if self.session.flush().is_err() {
            return;
        }
        self.reclaim();
    }

    /// Read and drop responses for abandoned requests
    ///
    /// Handlers never fire here. Gives up on transport failure or on a frame
    /// that matches nothing, leaving the session to fail fast on next use.
    fn reclaim(&mut self) {
        while !self.pending.is_empty() {
            match self.session.receive() {
                Ok(response) => {
                    if self.pending.remove(&response.opaque).is_none() {
                        return;
                    }
                }
                Err(_) => return,
            }
        }
    }

    /// Match one response to its pending request and apply miss policy
    fn dispatch(&mut self, response: Response) -> Result<()> {
        let pending = self.pending.remove(&response.opaque).ok_or_else(|| {
            CachetError::Protocol(format!(
                "response for unknown sequence number {}",
                response.opaque
            ))
        })?;

        match response.status {
            Status::Ok => {
                if let Some(handler) = &pending.handler {
                    let value = match pending.opcode {
                        Opcode::Get => Some(response.value),
                        _ => None,
                    };
                    (&mut *handler.borrow_mut())(Fetched {
                        key: pending.key,
                        value,
                        flags: response.flags,
                        cas: response.cas,
                    });
                }
                Ok(())
            }
            Status::KeyNotFound if pending.quiet => {
                if let Some(handler) = &pending.handler {
                    (&mut *handler.borrow_mut())(Fetched {
                        key: pending.key,
                        value: None,
                        flags: 0,
                        cas: 0,
                    });
                }
                Ok(())
            }
            status => {
                let error = status_error(status, &response.value);
                self.raise(pending.opcode, &pending.key, error)
            }
        }
    }

    /// Route a cache-level error through the effective error handler
    fn raise(&mut self, opcode: Opcode, key: &[u8], error: CachetError) -> Result<()> {
        let action = if let Some(handler) = self.on_error.as_mut() {
            handler(opcode, key, &error)
        } else if let Some(handler) = self.default_on_error.as_mut() {
            handler(opcode, key, &error)
        } else {
            tracing::debug!("aborting run: {:?} on key failed: {}", opcode, error);
            return Err(error);
        };

        match action {
            ErrorAction::Swallow => {
                tracing::trace!("error handler swallowed {:?} failure: {}", opcode, error);
                Ok(())
            }
            ErrorAction::Raise => {
                tracing::debug!("error handler re-raised {:?} failure: {}", opcode, error);
                Err(error)
            }
        }
    }
}

fn set_request(key: &[u8], value: &[u8], options: &SetOptions) -> Request {
    Request::Set {
        key: key.to_vec(),
        value: value.to_vec(),
        flags: options.flags,
        expiry: options.expiry,
        cas: options.cas,
    }
}

/// Convert a non-success status into the error surfaced to callers
fn status_error(status: Status, message: &[u8]) -> CachetError {
    match status {
        Status::KeyNotFound => CachetError::NotFound,
        Status::KeyExists => CachetError::KeyExists,
        other => CachetError::Server {
            status: other,
            message: String::from_utf8_lossy(message).into_owned(),
        },
    }
}
