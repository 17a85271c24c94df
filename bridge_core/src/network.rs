use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DriverLaunch;
use crate::error::TransportError;

/// Largest payload accepted in either direction.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// What the receive thread hands to its callback.
#[derive(Debug)]
pub enum Inbound {
    Frame(Vec<u8>),
    Closed,
    Failed(TransportError),
}

/// Local endpoint the driver dials back to.
pub struct DriverListener {
    listener: TcpListener,
    addr: SocketAddr,
}

impl DriverListener {
    /// Bind an ephemeral port on `host`.
    pub fn open(host: &str) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            host: host.to_string(),
            source,
        };
        let listener = TcpListener::bind((host, 0)).map_err(bind_err)?;
        let addr = listener.local_addr().map_err(bind_err)?;
        info!(target: "bridge::transport", %addr, "endpoint.bound");
        Ok(Self { listener, addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Wait for the driver to connect. Expiry of `timeout` is fatal.
    pub fn accept(self, timeout: Duration) -> Result<DriverConnection, TransportError> {
        self.listener
            .set_nonblocking(true)
            .map_err(TransportError::Accept)?;
        let deadline = Instant::now() + timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!(target: "bridge::transport", %peer, "driver.connected");
                    return DriverConnection::from_stream(stream, peer);
                }
                Err(ref err) if err.kind() == io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        warn!(
                            target: "bridge::transport",
                            addr = %self.addr,
                            ?timeout,
                            "driver.accept_timeout"
                        );
                        return Err(TransportError::AcceptTimeout(timeout));
                    }
                    thread::sleep(ACCEPT_POLL);
                }
                Err(err) => return Err(TransportError::Accept(err)),
            }
        }
    }
}

/// Start the driver process with `addr` appended as its final argument.
pub fn spawn_driver(launch: &DriverLaunch, addr: SocketAddr) -> Result<Child, TransportError> {
    let child = Command::new(&launch.program)
        .args(&launch.args)
        .arg(addr.to_string())
        .stdin(Stdio::null())
        .spawn()
        .map_err(|source| TransportError::Spawn {
            program: launch.program.display().to_string(),
            source,
        })?;
    info!(
        target: "bridge::transport",
        program = %launch.program.display(),
        pid = child.id(),
        %addr,
        "driver.spawned"
    );
    Ok(child)
}

/// An established, framed connection.
pub struct DriverConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl DriverConnection {
    /// Dial a bridge endpoint. Used by drivers written against this crate.
    pub fn connect(addr: impl ToSocketAddrs + ToString) -> Result<Self, TransportError> {
        let stream = TcpStream::connect(&addr).map_err(|source| TransportError::Connect {
            addr: addr.to_string(),
            source,
        })?;
        let peer = stream.peer_addr().map_err(TransportError::Receive)?;
        Self::from_stream(stream, peer)
    }

    fn from_stream(stream: TcpStream, peer: SocketAddr) -> Result<Self, TransportError> {
        stream
            .set_nonblocking(false)
            .map_err(TransportError::Accept)?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(target: "bridge::transport", %peer, error = %err, "nodelay.failed");
        }
        Ok(Self { stream, peer })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// A second handle for sending while the original is moved into the receive thread.
    pub fn writer(&self) -> Result<FrameWriter, TransportError> {
        let stream = self.stream.try_clone().map_err(TransportError::Send)?;
        Ok(FrameWriter { stream })
    }

    pub fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.stream, frame)
    }

    /// Block for the next frame. `Ok(None)` means the peer closed cleanly.
    pub fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        read_frame(&mut self.stream)
    }

    /// Deliver every inbound frame to `on_inbound` on a dedicated thread.
    ///
    /// The thread exits after `Closed` or `Failed`, or when the callback returns `false`.
    pub fn spawn_reader<F>(mut self, mut on_inbound: F) -> io::Result<JoinHandle<()>>
    where
        F: FnMut(Inbound) -> bool + Send + 'static,
    {
        let peer = self.peer;
        thread::Builder::new()
            .name("bridge-receive".into())
            .spawn(move || loop {
                let inbound = match read_frame(&mut self.stream) {
                    Ok(Some(frame)) => Inbound::Frame(frame),
                    Ok(None) => Inbound::Closed,
                    Err(err) => Inbound::Failed(err),
                };
                let terminal = !matches!(inbound, Inbound::Frame(_));
                if !on_inbound(inbound) || terminal {
                    debug!(target: "bridge::transport", %peer, "receive.stopped");
                    break;
                }
            })
    }
}

/// Sending half of a driver connection.
pub struct FrameWriter {
    stream: TcpStream,
}

impl FrameWriter {
    pub fn send(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        write_frame(&mut self.stream, frame)
    }

    /// Close both directions, which also unblocks the receive thread.
    pub fn close(&self) {
        if let Err(err) = self.stream.shutdown(Shutdown::Both) {
            debug!(target: "bridge::transport", error = %err, "connection.shutdown_failed");
        }
    }
}

/// Write one length-prefixed frame. Frames over [`MAX_FRAME_LEN`] are refused unwritten.
fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> Result<(), TransportError> {
    if frame.len() > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(frame.len()));
    }
    let len = frame.len() as u32;
    let mut buffer = Vec::with_capacity(4 + frame.len());
    buffer.extend_from_slice(&len.to_le_bytes());
    buffer.extend_from_slice(frame);
    writer
        .write_all(&buffer)
        .and_then(|()| writer.flush())
        .map_err(TransportError::Send)
}

/// Read one length-prefixed frame. EOF before a header is a clean close.
fn read_frame<R: Read>(reader: &mut R) -> Result<Option<Vec<u8>>, TransportError> {
    let mut header = [0u8; 4];
    let mut filled = 0;
    while filled < header.len() {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(TransportError::Closed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Receive(err)),
        }
    }

    let len = u32::from_le_bytes(header) as usize;
    if len > MAX_FRAME_LEN {
        return Err(TransportError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).map_err(|err| {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            TransportError::Closed
        } else {
            TransportError::Receive(err)
        }
    })?;
    Ok(Some(payload))
}
