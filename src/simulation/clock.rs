//! Time-advance sources for the tick loop
//!
//! The engine asks its clock for the next time boundary at the end of every
//! tick. [`LocalClock`] grants exactly what was proposed. [`CoordinatorClock`]
//! defers to an external coordinating process over a JSON-lines stream and
//! blocks until a grant arrives.

use log::debug;
use serde::{Deserialize, Serialize};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;
use thiserror::Error;

/// Failures talking to a time coordinator. Never fatal for a run.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error("coordinator transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("coordinator protocol error: {0}")]
    Protocol(String),

    #[error("coordinator closed the connection")]
    Disconnected,

    #[error("coordinator granted {granted}s which does not advance past {current}s")]
    NoProgress { current: f64, granted: f64 },
}

pub trait TimeAdvance {
    /// Blocks until the next time boundary is granted.
    fn request_next_boundary(&mut self, proposed: f64) -> Result<f64, ClockError>;

    /// True when pacing is delegated to an outside process
    fn is_synchronized(&self) -> bool {
        false
    }
}

/// Free-running clock: every proposal is granted as is
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl TimeAdvance for LocalClock {
    fn request_next_boundary(&mut self, proposed: f64) -> Result<f64, ClockError> {
        Ok(proposed)
    }
}

#[derive(Debug, Serialize)]
struct TimeRequest {
    request: f64,
}

#[derive(Debug, Deserialize)]
struct TimeGrant {
    granted: f64,
}

/// Clock paced by a remote coordinator.
///
/// Sends `{"request": <secs>}` per tick and waits for `{"granted": <secs>}`.
pub struct CoordinatorClock<R: Read, W: Write> {
    reader: BufReader<R>,
    writer: W,
    line: String,
}

impl<R: Read, W: Write> CoordinatorClock<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            line: String::new(),
        }
    }
}

impl CoordinatorClock<TcpStream, TcpStream> {
    /// Connects to a coordinator listening on `addr`.
    ///
    /// `timeout` bounds the connection attempt only. Waiting for a grant
    /// blocks for as long as the coordinator takes.
    pub fn connect(addr: impl ToSocketAddrs, timeout: Duration) -> Result<Self, ClockError> {
        let addr = addr
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| ClockError::Protocol("coordinator address resolved to nothing".into()))?;
        let stream = TcpStream::connect_timeout(&addr, timeout)?;
        let reader = stream.try_clone()?;
        Ok(Self::new(reader, stream))
    }
}

impl<R: Read, W: Write> TimeAdvance for CoordinatorClock<R, W> {
    fn request_next_boundary(&mut self, proposed: f64) -> Result<f64, ClockError> {
        let request = serde_json::to_string(&TimeRequest { request: proposed })
            .map_err(|e| ClockError::Protocol(e.to_string()))?;
        writeln!(self.writer, "{request}")?;
        self.writer.flush()?;

        self.line.clear();
        if self.reader.read_line(&mut self.line)? == 0 {
            return Err(ClockError::Disconnected);
        }

        let grant: TimeGrant = serde_json::from_str(self.line.trim())
            .map_err(|e| ClockError::Protocol(format!("bad grant {:?}: {e}", self.line.trim())))?;
        debug!("Coordinator granted {}s for proposal {}s", grant.granted, proposed);
        Ok(grant.granted)
    }

    fn is_synchronized(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn local_clock_grants_proposal() {
        let mut clock = LocalClock;
        assert_eq!(clock.request_next_boundary(12.5).unwrap(), 12.5);
        assert!(!clock.is_synchronized());
    }

    #[test]
    fn coordinator_round_trip() {
        let replies = Cursor::new(b"{\"granted\": 1.0}\n{\"granted\": 5.0}\n".to_vec());
        let mut sent = Vec::new();
        {
            let mut clock = CoordinatorClock::new(replies, &mut sent);
            assert!(clock.is_synchronized());
            assert_eq!(clock.request_next_boundary(1.0).unwrap(), 1.0);
            assert_eq!(clock.request_next_boundary(2.0).unwrap(), 5.0);
        }
        let sent = String::from_utf8(sent).unwrap();
        assert_eq!(sent, "{\"request\":1.0}\n{\"request\":2.0}\n");
    }

    #[test]
    fn slow_grant_over_tcp_still_arrives() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let coordinator = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            // slower than the connect timeout below
            thread::sleep(Duration::from_millis(1500));
            stream.write_all(b"{\"granted\": 3.0}\n").unwrap();
            line
        });

        let mut clock =
            CoordinatorClock::<TcpStream, TcpStream>::connect(addr, Duration::from_secs(1)).unwrap();
        assert_eq!(clock.request_next_boundary(1.0).unwrap(), 3.0);

        let request = coordinator.join().unwrap();
        assert_eq!(request.trim(), "{\"request\":1.0}");
    }

    #[test]
    fn coordinator_eof_is_disconnect() {
        let mut clock = CoordinatorClock::new(Cursor::new(Vec::new()), Vec::new());
        assert!(matches!(
            clock.request_next_boundary(1.0),
            Err(ClockError::Disconnected)
        ));
    }

    #[test]
    fn coordinator_garbage_is_protocol_error() {
        let mut clock = CoordinatorClock::new(Cursor::new(b"hello\n".to_vec()), Vec::new());
        assert!(matches!(
            clock.request_next_boundary(1.0),
            Err(ClockError::Protocol(_))
        ));
    }
}
