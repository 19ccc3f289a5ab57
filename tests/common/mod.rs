//! Shared test harness
//!
//! An in-process mock cache server speaking the binary protocol over a real
//! TCP socket on a dynamic port.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use cachet::protocol::{read_request, write_response, Opcode, Request, Response, Status};
use cachet::{Client, ClientConfig};

struct StoredEntry {
    value: Vec<u8>,
    flags: u32,
    cas: u64,
}

#[derive(Default)]
struct Store {
    entries: Mutex<HashMap<Vec<u8>, StoredEntry>>,
    cas_counter: AtomicU64,
}

impl Store {
    fn next_cas(&self) -> u64 {
        self.cas_counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// A mock server bound to a dynamic local port
pub struct MockServer {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
}

impl MockServer {
    pub fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let addr = listener.local_addr().expect("mock server addr");
        let store = Arc::new(Store::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let accept_shutdown = Arc::clone(&shutdown);
        thread::spawn(move || {
            for stream in listener.incoming() {
                if accept_shutdown.load(Ordering::SeqCst) {
                    break;
                }
                let Ok(stream) = stream else { break };
                let store = Arc::clone(&store);
                thread::spawn(move || serve(stream, store));
            }
        });

        Self { addr, shutdown }
    }

    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Connect a client to this server with the given miss policy
    pub fn client(&self, quiet: bool) -> Client {
        let config = ClientConfig::builder()
            .addr(self.addr())
            .quiet(quiet)
            .build();
        Client::connect(config).expect("connect to mock server")
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        // Wake the acceptor so it sees the flag.
        let _ = TcpStream::connect(self.addr);
    }
}

fn serve(stream: TcpStream, store: Arc<Store>) {
    let read_stream = match stream.try_clone() {
        Ok(s) => s,
        Err(_) => return,
    };
    let mut reader = BufReader::new(read_stream);
    let mut writer = BufWriter::new(stream);

    loop {
        // EOF means the client hung up; anything else is equally final here.
        let (request, opaque) = match read_request(&mut reader) {
            Ok(decoded) => decoded,
            Err(_) => return,
        };
        let response = execute(&request, opaque, &store);
        if write_response(&mut writer, &response).is_err() {
            return;
        }
    }
}

fn execute(request: &Request, opaque: u32, store: &Store) -> Response {
    match request {
        Request::Get { key } => {
            let entries = store.entries.lock();
            match entries.get(key) {
                Some(entry) => Response::entry(opaque, entry.value.clone(), entry.flags, entry.cas),
                None => Response::not_found(Opcode::Get, opaque),
            }
        }
        Request::Set {
            key,
            value,
            flags,
            cas,
            ..
        } => {
            let mut entries = store.entries.lock();
            if *cas != 0 {
                match entries.get(key) {
                    None => return Response::not_found(Opcode::Set, opaque),
                    Some(entry) if entry.cas != *cas => {
                        return Response::error(Opcode::Set, opaque, Status::KeyExists, "cas mismatch")
                    }
                    Some(_) => {}
                }
            }
            let new_cas = store.next_cas();
            entries.insert(
                key.clone(),
                StoredEntry {
                    value: value.clone(),
                    flags: *flags,
                    cas: new_cas,
                },
            );
            Response::stored(Opcode::Set, opaque, new_cas)
        }
        Request::Delete { key } => {
            let mut entries = store.entries.lock();
            match entries.remove(key) {
                Some(_) => Response::stored(Opcode::Delete, opaque, 0),
                None => Response::not_found(Opcode::Delete, opaque),
            }
        }
    }
}
