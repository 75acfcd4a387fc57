//! # TCP Transport
//!
//! One blocking TCP connection per exchange, bound to the configured local
//! address before connecting. Replies are read in non-blocking mode and
//! polled at a fixed interval until the budget is spent.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, SocketAddrV4, TcpStream};
use std::thread;
use std::time::{Duration, Instant};

use socket2::{Domain, Protocol, Socket, Type};
use tracing::trace;

use crate::ports::{Connection, NetworkError, Transport};

fn network_error(err: io::Error) -> NetworkError {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => NetworkError::ConnectionRefused,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => NetworkError::Timeout,
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => NetworkError::Closed,
        _ => NetworkError::Io(err.to_string()),
    }
}

/// Production [`Transport`] over TCP.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

impl TcpTransport {
    /// Create a TCP transport.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Transport for TcpTransport {
    fn connect(
        &self,
        local: SocketAddr,
        remote: SocketAddrV4,
        timeout: Duration,
    ) -> Result<Box<dyn Connection>, NetworkError> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP)).map_err(network_error)?;
        if local.port() != 0 {
            socket.set_reuse_address(true).map_err(network_error)?;
        }
        socket
            .bind(&local.into())
            .map_err(|e| NetworkError::Bind(format!("{local}: {e}")))?;
        socket
            .connect_timeout(&SocketAddr::V4(remote).into(), timeout)
            .map_err(network_error)?;
        trace!(%local, %remote, "tcp connected");

        Ok(Box::new(TcpConnection {
            stream: socket.into(),
        }))
    }
}

/// An open agent connection.
#[derive(Debug)]
pub struct TcpConnection {
    stream: TcpStream,
}

impl Connection for TcpConnection {
    fn send(&mut self, frame: &[u8]) -> Result<(), NetworkError> {
        self.stream.set_nonblocking(false).map_err(network_error)?;
        self.stream.write_all(frame).map_err(network_error)?;
        self.stream.flush().map_err(network_error)
    }

    fn receive(
        &mut self,
        len: usize,
        budget: Duration,
        poll_interval: Duration,
    ) -> Result<Vec<u8>, NetworkError> {
        self.stream.set_nonblocking(true).map_err(network_error)?;
        let deadline = Instant::now() + budget;
        let mut buf = vec![0u8; len];
        let mut filled = 0;

        loop {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(NetworkError::Closed),
                Ok(n) => {
                    filled += n;
                    if filled == len {
                        return Ok(buf);
                    }
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(network_error(e)),
            }
            if Instant::now() >= deadline {
                return Err(NetworkError::Timeout);
            }
            thread::sleep(poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    fn any_local() -> SocketAddr {
        SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
    }

    fn listener() -> (TcpListener, SocketAddrV4) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = match listener.local_addr().unwrap() {
            SocketAddr::V4(v4) => v4,
            SocketAddr::V6(_) => unreachable!(),
        };
        (listener, addr)
    }

    #[test]
    fn test_send_and_receive() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&[buf[3], buf[2], buf[1], buf[0]]).unwrap();
        });

        let mut conn = TcpTransport::new()
            .connect(any_local(), addr, Duration::from_secs(2))
            .unwrap();
        conn.send(&[1, 2, 3, 4]).unwrap();
        let reply = conn
            .receive(4, Duration::from_secs(2), Duration::from_millis(1))
            .unwrap();
        assert_eq!(reply, vec![4, 3, 2, 1]);
        server.join().unwrap();
    }

    #[test]
    fn test_receive_times_out() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            thread::sleep(Duration::from_millis(200));
            drop(stream);
        });

        let mut conn = TcpTransport::new()
            .connect(any_local(), addr, Duration::from_secs(2))
            .unwrap();
        let result = conn.receive(4, Duration::from_millis(50), Duration::from_millis(5));
        assert_eq!(result, Err(NetworkError::Timeout));
        server.join().unwrap();
    }

    #[test]
    fn test_peer_close_detected() {
        let (listener, addr) = listener();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            drop(stream);
        });

        let mut conn = TcpTransport::new()
            .connect(any_local(), addr, Duration::from_secs(2))
            .unwrap();
        server.join().unwrap();
        let result = conn.receive(4, Duration::from_secs(1), Duration::from_millis(5));
        assert_eq!(result, Err(NetworkError::Closed));
    }

    #[test]
    fn test_connect_refused() {
        let (listener, addr) = listener();
        drop(listener);
        let result = TcpTransport::new().connect(any_local(), addr, Duration::from_millis(500));
        assert!(result.is_err());
    }
}
