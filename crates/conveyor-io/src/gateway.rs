//! One connection per device transaction.
//!
//! Nothing is kept open between calls: each transaction connects, exchanges
//! one command, and the stream is shut down before the call returns. Connect,
//! write and read share one deadline set from the address timeout, so a
//! transaction never blocks longer than that timeout once the host name has
//! been resolved. Name resolution itself is not bounded; use literal IPs for
//! panels where that matters.

use conveyor_spine::{CellError, Result};
use std::fmt;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

/// Gap between successive commands in one output sequence.
pub const COMMAND_GAP: Duration = Duration::from_millis(10);

const READ_CHUNK: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceAddress {
    host: String,
    port: u16,
    timeout: Duration,
}

impl DeviceAddress {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    /// Parses `host:port`. The host is not resolved until the first
    /// transaction.
    pub fn parse(addr: &str, timeout: Duration) -> Result<Self> {
        let invalid = || CellError::InvalidAddress(addr.to_string());
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() || timeout.is_zero() {
            return Err(invalid());
        }
        let port: u16 = port.parse().map_err(|_| invalid())?;
        if port == 0 {
            return Err(invalid());
        }
        Ok(Self::new(host, port, timeout))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn resolve(&self) -> Result<SocketAddr> {
        let mut addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| self.connect_failure(e))?;
        addrs.next().ok_or_else(|| {
            self.connect_failure(io::Error::new(
                ErrorKind::NotFound,
                "host resolved to no addresses",
            ))
        })
    }

    fn connect_failure(&self, source: io::Error) -> CellError {
        CellError::ConnectFailure {
            addr: self.to_string(),
            source,
        }
    }

    /// Maps an I/O error on an established stream.
    fn transport_error(&self, e: io::Error) -> CellError {
        match e.kind() {
            ErrorKind::WouldBlock | ErrorKind::TimedOut => CellError::Timeout {
                addr: self.to_string(),
                timeout_ms: self.timeout.as_millis() as u64,
            },
            _ => self.connect_failure(e),
        }
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

fn deadline_passed() -> io::Error {
    io::Error::new(ErrorKind::TimedOut, "transaction deadline passed")
}

/// An open device stream bounded by the transaction deadline. Every read
/// and write waits at most for the time left; the stream is shut down when
/// the connection is dropped, whichever way the transaction ends.
pub struct Connection {
    stream: TcpStream,
    deadline: Instant,
}

impl Connection {
    fn open(socket: &SocketAddr, timeout: Duration) -> io::Result<Self> {
        let deadline = Instant::now() + timeout;
        let stream = TcpStream::connect_timeout(socket, timeout)?;
        stream.set_nodelay(true)?;
        Ok(Self { stream, deadline })
    }

    fn remaining(&self) -> io::Result<Duration> {
        let left = self.deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            Err(deadline_passed())
        } else {
            Ok(left)
        }
    }

    /// Reads until `expected` bytes have arrived or the peer closes. A
    /// response split across segments is reassembled; a longer response is
    /// returned whole so the caller can reject it.
    pub fn read_frame(&mut self, expected: usize) -> io::Result<Vec<u8>> {
        let mut frame = Vec::with_capacity(expected);
        let mut chunk = [0u8; READ_CHUNK];
        while frame.len() < expected {
            match self.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => frame.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(frame)
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.stream.set_read_timeout(Some(left))?;
        self.stream.read(buf)
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let left = self.remaining()?;
        self.stream.set_write_timeout(Some(left))?;
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Opens a connection bounded by the address timeout, hands it to
/// `exchange`, and releases it on every exit path.
pub fn with_connection<R>(
    address: &DeviceAddress,
    exchange: impl FnOnce(&mut Connection) -> io::Result<R>,
) -> Result<R> {
    let socket = address.resolve()?;
    let mut conn =
        Connection::open(&socket, address.timeout).map_err(|e| address.connect_failure(e))?;
    exchange(&mut conn).map_err(|e| address.transport_error(e))
}

/// Sends `command` and collects the response frame of `expected_len` bytes.
pub fn request_response(
    address: &DeviceAddress,
    command: &[u8],
    expected_len: usize,
) -> Result<Vec<u8>> {
    let response = with_connection(address, |conn| {
        conn.write_all(command)?;
        conn.flush()?;
        conn.read_frame(expected_len)
    })?;

    if response.is_empty() {
        return Err(CellError::EmptyResponse {
            addr: address.to_string(),
        });
    }
    trace!(
        device = %address,
        command = %String::from_utf8_lossy(command).trim_end(),
        response = %String::from_utf8_lossy(&response).trim_end(),
        "device transaction"
    );
    Ok(response)
}

/// Sends `command` without waiting for a response.
pub fn send_command(address: &DeviceAddress, command: &[u8]) -> Result<()> {
    with_connection(address, |conn| {
        conn.write_all(command)?;
        conn.flush()
    })?;
    trace!(
        device = %address,
        command = %String::from_utf8_lossy(command).trim_end(),
        "device command"
    );
    Ok(())
}

/// Sends each command on its own connection with `gap` between them.
/// Stops at the first failure so later commands never land out of order.
pub fn send_sequence(address: &DeviceAddress, commands: &[Vec<u8>], gap: Duration) -> Result<()> {
    for (i, command) in commands.iter().enumerate() {
        if i > 0 {
            thread::sleep(gap);
        }
        send_command(address, command)?;
    }
    Ok(())
}
