//! Client Facade
//!
//! The public surface of the crate: synchronous get/set/delete plus batched
//! asynchronous runs over one connection.
//!
//! ## Concurrency Model: Single Driving Thread
//!
//! - One transport session per client; the protocol is pipelined but there is
//!   only ever one thread driving it (`&mut self` throughout).
//! - Synchronous calls are a run of exactly one request, executed to
//!   completion before returning.
//! - Asynchronous calls inside [`Client::run`] suspend only at the drain, not
//!   per call.

use std::collections::{HashMap, VecDeque};

use crate::config::ClientConfig;
use crate::error::{CachetError, Result};
use crate::protocol::Opcode;
use crate::run::{DeleteOptions, ErrorAction, ErrorHandler, GetOptions, Run, SetOptions};
use crate::session::Session;

/// An entry's value together with its metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// The stored bytes
    pub value: Vec<u8>,

    /// Caller-defined flags, returned verbatim
    pub flags: u32,

    /// CAS token; changes on every successful mutation of the key
    pub cas: u64,
}

/// A cache client over one connection
pub struct Client {
    session: Session,

    /// Default miss policy (overridable per call)
    quiet: bool,

    /// Default error handler for asynchronous runs
    on_error: Option<ErrorHandler>,
}

impl Client {
    /// Connect to the server named in the config
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let quiet = config.quiet;
        let session = Session::connect(&config)?;
        Ok(Self {
            session,
            quiet,
            on_error: None,
        })
    }

    // =========================================================================
    // Connection Settings
    // =========================================================================

    /// The connection's default miss policy
    pub fn quiet(&self) -> bool {
        self.quiet
    }

    /// Change the default miss policy
    ///
    /// Takes effect for operations issued afterwards.
    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Install the default error handler for asynchronous runs
    ///
    /// Inside a run, cache-level errors on requests are routed to this
    /// handler instead of any inline handler; its return value decides
    /// whether the run continues or aborts. Synchronous calls never consult
    /// it.
    pub fn set_on_error(
        &mut self,
        handler: impl FnMut(Opcode, &[u8], &CachetError) -> ErrorAction + 'static,
    ) {
        self.on_error = Some(Box::new(handler));
    }

    /// Remove the default error handler
    pub fn clear_on_error(&mut self) {
        self.on_error = None;
    }

    // =========================================================================
    // Get
    // =========================================================================

    /// Fetch a key's value
    ///
    /// Under quiet policy a miss is `Ok(None)`; under verbose policy it is
    /// [`CachetError::NotFound`].
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.get_with(key, &GetOptions::default())
    }

    /// Fetch a key's value with per-call options
    pub fn get_with(&mut self, key: &[u8], options: &GetOptions) -> Result<Option<Vec<u8>>> {
        let mut found = None;
        self.solo(|run| run.get_with(key, options, |fetched| found = fetched.value))?;
        Ok(found)
    }

    /// Fetch a key's value together with its flags and CAS token
    pub fn get_extended(&mut self, key: &[u8]) -> Result<Option<Entry>> {
        self.get_extended_with(key, &GetOptions::default())
    }

    /// Fetch a key's entry with per-call options
    pub fn get_extended_with(&mut self, key: &[u8], options: &GetOptions) -> Result<Option<Entry>> {
        let mut found = None;
        self.solo(|run| {
            run.get_with(key, options, |fetched| {
                if let Some(value) = fetched.value {
                    found = Some(Entry {
                        value,
                        flags: fetched.flags,
                        cas: fetched.cas,
                    });
                }
            })
        })?;
        Ok(found)
    }

    /// Fetch several keys in one pipelined round trip
    ///
    /// The result is aligned positionally with `keys` regardless of the order
    /// the server answered in. Under quiet policy a missing key yields `None`
    /// at its position; under verbose policy the first miss dispatched aborts
    /// the whole call and no partial results are returned.
    pub fn get_multi<K>(&mut self, keys: &[K]) -> Result<Vec<Option<Vec<u8>>>>
    where
        K: AsRef<[u8]>,
    {
        self.get_multi_with(keys, &GetOptions::default())
    }

    /// Fetch several keys with per-call options
    pub fn get_multi_with<K>(
        &mut self,
        keys: &[K],
        options: &GetOptions,
    ) -> Result<Vec<Option<Vec<u8>>>>
    where
        K: AsRef<[u8]>,
    {
        let mut results: Vec<Option<Vec<u8>>> = vec![None; keys.len()];
        let mut positions: HashMap<Vec<u8>, VecDeque<usize>> = HashMap::new();
        for (index, key) in keys.iter().enumerate() {
            positions
                .entry(key.as_ref().to_vec())
                .or_default()
                .push_back(index);
        }

        self.solo(|run| {
            run.get_multi_with(keys, options, |fetched| {
                let position = positions
                    .get_mut(&fetched.key)
                    .and_then(|queue| queue.pop_front());
                if let Some(position) = position {
                    results[position] = fetched.value;
                }
            })
        })?;
        Ok(results)
    }

    /// Fetch several keys, returning a map of key to entry
    ///
    /// A key that misses under quiet policy is absent from the map:
    /// `contains_key` is the miss test. Under verbose policy the call aborts
    /// with [`CachetError::NotFound`] instead.
    pub fn get_multi_extended<K>(&mut self, keys: &[K]) -> Result<HashMap<Vec<u8>, Entry>>
    where
        K: AsRef<[u8]>,
    {
        self.get_multi_extended_with(keys, &GetOptions::default())
    }

    /// Fetch several entries with per-call options
    pub fn get_multi_extended_with<K>(
        &mut self,
        keys: &[K],
        options: &GetOptions,
    ) -> Result<HashMap<Vec<u8>, Entry>>
    where
        K: AsRef<[u8]>,
    {
        let mut results = HashMap::new();
        self.solo(|run| {
            run.get_multi_with(keys, options, |fetched| {
                if let Some(value) = fetched.value {
                    results.insert(
                        fetched.key,
                        Entry {
                            value,
                            flags: fetched.flags,
                            cas: fetched.cas,
                        },
                    );
                }
            })
        })?;
        Ok(results)
    }

    // =========================================================================
    // Set / Delete
    // =========================================================================

    /// Store a value, returning the entry's new CAS token
    pub fn set(&mut self, key: &[u8], value: &[u8]) -> Result<u64> {
        self.set_with(key, value, &SetOptions::default())
    }

    /// Store a value with flags, expiry, or a CAS check
    ///
    /// A CAS mismatch fails with [`CachetError::KeyExists`].
    pub fn set_with(&mut self, key: &[u8], value: &[u8], options: &SetOptions) -> Result<u64> {
        let mut cas = 0;
        self.solo(|run| run.set(key, value, options, |stored| cas = stored.cas))?;
        Ok(cas)
    }

    /// Delete a key
    ///
    /// Returns whether an entry was removed. Under verbose policy a miss is
    /// [`CachetError::NotFound`] instead of `Ok(false)`.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.delete_with(key, &DeleteOptions::default())
    }

    /// Delete a key with per-call options
    pub fn delete_with(&mut self, key: &[u8], options: &DeleteOptions) -> Result<bool> {
        let quiet = options.quiet.unwrap_or(self.quiet);
        // Issued verbose so a miss is distinguishable from a removal, then
        // mapped back to the caller's policy here.
        let verbose = DeleteOptions { quiet: Some(false) };
        match self.solo(|run| run.delete_with(key, &verbose)) {
            Ok(()) => Ok(true),
            Err(CachetError::NotFound) if quiet => Ok(false),
            Err(error) => Err(error),
        }
    }

    // =========================================================================
    // Runs
    // =========================================================================

    /// Open a batching scope, execute `body`, then drain it
    ///
    /// Operations issued on the [`Run`] handle are pipelined and their
    /// handlers fire during the drain, before this returns. An abort (from an
    /// error or the body itself) abandons outstanding requests.
    pub fn run<'a, F>(&'a mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Run<'a>) -> Result<()>,
    {
        let Client {
            session,
            quiet,
            on_error,
        } = self;
        let mut run = Run::new(session, *quiet, on_error.as_mut());
        match body(&mut run) {
            Ok(()) => run.finish(),
            Err(error) => {
                run.abandon();
                Err(error)
            }
        }
    }

    /// A private run of exactly one request, backing the synchronous calls
    ///
    /// Deliberately skips the connection's `on_error`: synchronous callers
    /// get their errors as return values, not through the async hook.
    fn solo<'a, F>(&'a mut self, body: F) -> Result<()>
    where
        F: FnOnce(&mut Run<'a>) -> Result<()>,
    {
        let mut run = Run::new(&mut self.session, self.quiet, None);
        match body(&mut run) {
            Ok(()) => run.finish(),
            Err(error) => {
                run.abandon();
                Err(error)
            }
        }
    }
}
