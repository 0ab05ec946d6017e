//! Backend for Redis-compatible servers.
//!
//! Each [`RespBackend`] owns exactly one TCP connection. Requests on a
//! connection are strictly request/reply, so concurrent callers serialize on
//! an async mutex; to parallelize, the pipeline opens several handles and
//! spreads workers across them.
//!
//! ## Command Mapping
//!
//! | Operation | Command                        | Success      | Failure                 |
//! |-----------|--------------------------------|--------------|-------------------------|
//! | insert    | `SET key value NX [EX secs]`   | `+OK`        | `$-1` means key exists  |
//! | get       | `GET key`                      | bulk string  | `$-1` means not found   |
//! | update    | `SET key value [EX secs]`      | `+OK`        | error reply             |
//!
//! A request that fails on I/O or parsing, or is abandoned halfway, leaves the
//! connection unusable: the next reply on the wire may belong to the old
//! request. Such a connection is marked broken and every later call fails
//! with [`BackendError::Disconnected`].

use crate::backend::{BackendError, StorageBackend};
use crate::protocol::{RespParser, RespValue};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

/// Initial read buffer capacity
const INITIAL_BUFFER_SIZE: usize = 4096;

/// One request/reply connection to the server.
#[derive(Debug)]
struct RespConnection {
    stream: BufWriter<TcpStream>,
    buffer: BytesMut,
    parser: RespParser,
    scratch: Vec<u8>,
    /// Set while a request is in flight and left set if it did not complete
    broken: bool,
}

impl RespConnection {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: BufWriter::new(stream),
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            parser: RespParser::new(),
            scratch: Vec::with_capacity(INITIAL_BUFFER_SIZE),
            broken: false,
        }
    }

    /// Sends one command and waits for its reply.
    async fn request(&mut self, command: &RespValue) -> Result<RespValue, BackendError> {
        if self.broken {
            return Err(BackendError::Disconnected);
        }

        self.broken = true;
        let reply = self.exchange(command).await;
        if reply.is_ok() {
            self.broken = false;
        } else {
            warn!("RESP connection out of sync, refusing further requests");
        }
        reply
    }

    async fn exchange(&mut self, command: &RespValue) -> Result<RespValue, BackendError> {
        self.scratch.clear();
        command.serialize_into(&mut self.scratch);
        self.stream.write_all(&self.scratch).await?;
        self.stream.flush().await?;

        loop {
            match self.parser.parse(&self.buffer) {
                Ok(Some((reply, consumed))) => {
                    self.buffer.advance(consumed);
                    trace!(consumed, "Parsed reply");
                    return Ok(reply);
                }
                Ok(None) => {}
                Err(e) => {
                    self.buffer.clear();
                    return Err(e.into());
                }
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self.stream.get_mut().read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Err(BackendError::Disconnected);
            }
        }
    }
}

/// A [`StorageBackend`] speaking RESP over one TCP connection.
#[derive(Debug)]
pub struct RespBackend {
    addr: String,
    conn: Mutex<RespConnection>,
}

impl RespBackend {
    /// Connects to `addr` (`host:port`).
    pub async fn connect(addr: &str) -> Result<Self, BackendError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| BackendError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        debug!(addr, "Connected to RESP server");

        Ok(Self {
            addr: addr.to_string(),
            conn: Mutex::new(RespConnection::new(stream)),
        })
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn call(&self, command: RespValue) -> Result<RespValue, BackendError> {
        self.conn.lock().await.request(&command).await
    }
}

fn set_command(key: &str, value: Bytes, expiry: u32, only_if_absent: bool) -> RespValue {
    let mut parts = vec![
        Bytes::from_static(b"SET"),
        Bytes::copy_from_slice(key.as_bytes()),
        value,
    ];
    if only_if_absent {
        parts.push(Bytes::from_static(b"NX"));
    }
    if expiry > 0 {
        parts.push(Bytes::from_static(b"EX"));
        parts.push(Bytes::from(expiry.to_string()));
    }
    RespValue::command(parts)
}

fn expect_ok(key: &str, reply: RespValue) -> Result<(), BackendError> {
    match reply {
        RespValue::SimpleString(ref s) if s == "OK" => Ok(()),
        RespValue::Null => Err(BackendError::KeyExists(key.to_string())),
        RespValue::Error(msg) => Err(BackendError::Server(msg)),
        other => Err(BackendError::UnexpectedReply(other.to_string())),
    }
}

#[async_trait]
impl StorageBackend for RespBackend {
    fn name(&self) -> &'static str {
        "resp"
    }

    async fn insert(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        let reply = self.call(set_command(key, value, expiry, true)).await?;
        expect_ok(key, reply)
    }

    async fn get(&self, key: &str, out: &mut BytesMut) -> Result<(), BackendError> {
        let reply = self
            .call(RespValue::command([
                Bytes::from_static(b"GET"),
                Bytes::copy_from_slice(key.as_bytes()),
            ]))
            .await?;

        match reply {
            RespValue::BulkString(data) => {
                out.clear();
                out.extend_from_slice(&data);
                Ok(())
            }
            RespValue::Null => Err(BackendError::NotFound(key.to_string())),
            RespValue::Error(msg) => Err(BackendError::Server(msg)),
            other => Err(BackendError::UnexpectedReply(other.to_string())),
        }
    }

    async fn update(&self, key: &str, value: Bytes, expiry: u32) -> Result<(), BackendError> {
        let reply = self.call(set_command(key, value, expiry, false)).await?;
        expect_ok(key, reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::net::TcpListener;

    /// Answers the handful of commands the backend sends, backed by a MemoryStore.
    fn execute(store: &MemoryStore, command: RespValue) -> RespValue {
        let args = match command.into_array() {
            Some(args) => args,
            None => return RespValue::Error("ERR expected array".into()),
        };
        let arg = |i: usize| args.get(i).and_then(|v| v.as_bytes()).unwrap_or_default();

        match (arg(0), args.len()) {
            (b"GET", 2) => match store.get(arg(1)) {
                Some(value) => RespValue::BulkString(value),
                None => RespValue::Null,
            },
            (b"SET", n) if n >= 3 => {
                let key = Bytes::copy_from_slice(arg(1));
                let value = Bytes::copy_from_slice(arg(2));
                let nx = (3..n).any(|i| arg(i) == b"NX");
                let ttl = (3..n)
                    .position(|i| arg(i) == b"EX")
                    .and_then(|p| std::str::from_utf8(arg(p + 4)).ok())
                    .and_then(|s| s.parse().ok())
                    .map(Duration::from_secs);
                if nx {
                    if store.insert(key, value, ttl) {
                        RespValue::ok()
                    } else {
                        RespValue::Null
                    }
                } else {
                    store.put(key, value, ttl);
                    RespValue::ok()
                }
            }
            (b"BOOM", _) => RespValue::Error("ERR boom".into()),
            _ => RespValue::Error("ERR unknown command".into()),
        }
    }

    async fn spawn_server() -> (SocketAddr, Arc<MemoryStore>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let store = Arc::new(MemoryStore::new());
        let server_store = Arc::clone(&store);

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let store = Arc::clone(&server_store);
                tokio::spawn(async move {
                    let mut buffer = BytesMut::new();
                    let mut parser = RespParser::new();
                    loop {
                        while let Ok(Some((command, used))) = parser.parse(&buffer) {
                            buffer.advance(used);
                            let reply = execute(&store, command);
                            if stream.write_all(&reply.serialize()).await.is_err() {
                                return;
                            }
                        }
                        match stream.read_buf(&mut buffer).await {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                    }
                });
            }
        });

        (addr, store)
    }

    #[test]
    fn test_set_command_shape() {
        let cmd = set_command("k", Bytes::from("v"), 30, true);
        assert_eq!(cmd, RespValue::command(["SET", "k", "v", "NX", "EX", "30"]));

        let cmd = set_command("k", Bytes::from("v"), 0, false);
        assert_eq!(cmd, RespValue::command(["SET", "k", "v"]));
    }

    #[tokio::test]
    async fn test_insert_and_get_round_trip() {
        let (addr, store) = spawn_server().await;
        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();

        backend.insert("doc-1", Bytes::from("payload"), 0).await.unwrap();
        assert_eq!(store.len(), 1);

        let mut out = BytesMut::new();
        backend.get("doc-1", &mut out).await.unwrap();
        assert_eq!(&out[..], b"payload");
    }

    #[tokio::test]
    async fn test_insert_existing_key_fails() {
        let (addr, _) = spawn_server().await;
        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();

        backend.insert("dup", Bytes::from("a"), 0).await.unwrap();
        let err = backend.insert("dup", Bytes::from("b"), 0).await.unwrap_err();
        assert!(matches!(err, BackendError::KeyExists(_)));
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let (addr, _) = spawn_server().await;
        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();

        let mut out = BytesMut::new();
        let err = backend.get("ghost", &mut out).await.unwrap_err();
        assert!(matches!(err, BackendError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_overwrites_with_expiry() {
        let (addr, store) = spawn_server().await;
        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();

        backend.insert("k", Bytes::from("v0"), 0).await.unwrap();
        backend.update("k", Bytes::from("v1"), 60).await.unwrap();

        assert_eq!(store.get(b"k"), Some(Bytes::from("v1")));
    }

    #[tokio::test]
    async fn test_server_error_reply() {
        let (addr, _) = spawn_server().await;
        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();

        let reply = backend.call(RespValue::command(["BOOM"])).await.unwrap();
        assert_eq!(
            expect_ok("k", reply).unwrap_err().to_string(),
            "server error: ERR boom"
        );
    }

    #[tokio::test]
    async fn test_garbled_reply_breaks_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buffer = BytesMut::new();
            stream.read_buf(&mut buffer).await.unwrap();

            // An unparseable reply, then the tail of it arriving late
            stream.write_all(b"%bad\r\n").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            stream.write_all(b"$6\r\nstale!\r\n").await.unwrap();

            loop {
                buffer.clear();
                match stream.read_buf(&mut buffer).await {
                    Ok(0) | Err(_) => return,
                    Ok(_) => {}
                }
                if stream.write_all(b"$5\r\nfresh\r\n").await.is_err() {
                    return;
                }
            }
        });

        let backend = RespBackend::connect(&addr.to_string()).await.unwrap();
        let mut out = BytesMut::new();

        let err = backend.get("first", &mut out).await.unwrap_err();
        assert!(matches!(err, BackendError::Protocol(_)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        for key in ["second", "third"] {
            let err = backend.get(key, &mut out).await.unwrap_err();
            assert!(matches!(err, BackendError::Disconnected));
        }
        assert!(out.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_connection() {
        let (addr, store) = spawn_server().await;
        let backend = Arc::new(RespBackend::connect(&addr.to_string()).await.unwrap());

        let tasks: Vec<_> = (0..16)
            .map(|i| {
                let backend = Arc::clone(&backend);
                tokio::spawn(async move {
                    let key = format!("key-{}", i);
                    backend.insert(&key, Bytes::from(key.clone()), 0).await.unwrap();
                    let mut out = BytesMut::new();
                    backend.get(&key, &mut out).await.unwrap();
                    assert_eq!(&out[..], key.as_bytes());
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.len(), 16);
    }
}
