//! Byte-stream transport abstraction.
//!
//! The driver talks to the adapter through any duplex byte stream: a serial
//! port for USB cables, or a socket for WiFi/Bluetooth dongles that expose
//! the same AT dialect over TCP. Only blocking reads with an adjustable
//! inactivity timeout are required; a read that times out reports `Ok(0)`.

use std::io;
use std::net::TcpStream;
use std::time::Duration;

/// A duplex byte stream connected to an ELM327-family adapter.
pub trait Transport: Send {
    /// Write bytes to the adapter; best-effort, returns the count accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Blocking read, up to the configured timeout. Returns `Ok(0)` on
    /// timeout or end of stream.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Adjust the inactivity timeout used by subsequent reads.
    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()>;
}

impl Transport for Box<dyn serialport::SerialPort> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(self, buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        serialport::SerialPort::set_timeout(self.as_mut(), timeout).map_err(io::Error::from)
    }
}

impl Transport for TcpStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(self, buf)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(self, buf) {
            Ok(n) => Ok(n),
            // WouldBlock is what a socket read timeout surfaces as on Unix.
            Err(e)
                if e.kind() == io::ErrorKind::TimedOut
                    || e.kind() == io::ErrorKind::WouldBlock =>
            {
                Ok(0)
            }
            Err(e) => Err(e),
        }
    }

    fn set_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        self.set_read_timeout(Some(timeout))
    }
}
