//! JSONL channel over a connected client socket.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use kiln_config::Config;
use kiln_protocol::{Message, decode_line, encode_line};
use tracing::{debug, warn};

use super::{CHANNEL_TARGET, Channel, ChannelError};

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Socket types a client may connect over.
#[derive(Debug)]
pub enum ConnectionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Creates an independently owned handle to the same socket.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the socket cannot be duplicated.
    pub fn try_clone(&self) -> io::Result<Self> {
        match self {
            Self::Tcp(stream) => stream.try_clone().map(Self::Tcp),
            #[cfg(unix)]
            Self::Unix(stream) => stream.try_clone().map(Self::Unix),
        }
    }

    /// Shuts down the read half, write half, or both halves of the socket.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the shutdown fails.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(how),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(how),
        }
    }
}

impl From<TcpStream> for ConnectionStream {
    fn from(stream: TcpStream) -> Self {
        Self::Tcp(stream)
    }
}

#[cfg(unix)]
impl From<UnixStream> for ConnectionStream {
    fn from(stream: UnixStream) -> Self {
        Self::Unix(stream)
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// [`Channel`] exchanging one JSON message per line over a client socket.
///
/// Outbound messages are encoded on the caller's thread and written by a
/// dedicated writer thread, so [`Channel::dispatch`] never waits on the
/// network. Stopping the channel gives queued messages up to the configured
/// flush timeout to drain before the socket is shut down.
#[derive(Debug)]
pub struct StreamChannel {
    reader: Mutex<BufReader<ConnectionStream>>,
    control: ConnectionStream,
    outbound: Mutex<Option<mpsc::Sender<Vec<u8>>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
    // Disconnects once the writer thread exits; nothing is ever sent.
    writer_exited: Mutex<mpsc::Receiver<()>>,
    stopped: AtomicBool,
    max_message_bytes: usize,
    flush_timeout: Duration,
}

impl StreamChannel {
    /// Wraps a connected client socket and starts its writer thread.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the socket cannot be duplicated and
    /// [`ChannelError::Spawn`] if the writer thread cannot be started.
    pub fn new(stream: ConnectionStream, config: &Config) -> Result<Self, ChannelError> {
        let control = stream.try_clone()?;
        let write_half = stream.try_clone()?;
        let (sender, receiver) = mpsc::channel();
        let (exit_guard, writer_exited) = mpsc::channel();
        let name = config.writer_thread_name();
        let writer = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let _exit_guard: mpsc::Sender<()> = exit_guard;
                run_writer(write_half, &receiver);
            })
            .map_err(|source| ChannelError::Spawn { name, source })?;

        Ok(Self {
            reader: Mutex::new(BufReader::new(stream)),
            control,
            outbound: Mutex::new(Some(sender)),
            writer: Mutex::new(Some(writer)),
            writer_exited: Mutex::new(writer_exited),
            stopped: AtomicBool::new(false),
            max_message_bytes: config.max_message_bytes,
            flush_timeout: config.flush_timeout(),
        })
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Waits up to the flush timeout for the writer thread to exit.
    fn wait_for_writer(&self) -> bool {
        let exited = self
            .writer_exited
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        match exited.recv_timeout(self.flush_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
        }
    }
}

impl Channel for StreamChannel {
    fn receive(&self) -> Result<Option<Message>, ChannelError> {
        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let line = match read_line(&mut *reader, self.max_message_bytes) {
            Ok(line) => line,
            Err(ChannelError::Io(error)) if self.is_stopped() => {
                debug!(
                    target: CHANNEL_TARGET,
                    error = %error,
                    "read interrupted by channel stop"
                );
                return Ok(None);
            }
            Err(error) => return Err(error),
        };
        match line {
            Some(bytes) => Ok(Some(decode_line(&bytes)?)),
            None => Ok(None),
        }
    }

    fn dispatch(&self, message: Message) -> Result<(), ChannelError> {
        let line = encode_line(&message).map_err(|source| ChannelError::Encode {
            kind: message.kind(),
            source,
        })?;
        let outbound = self.outbound.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = outbound.as_ref().ok_or(ChannelError::Closed)?;
        sender.send(line).map_err(|_| ChannelError::Closed)
    }

    fn stop(&self) -> Result<(), ChannelError> {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Dropping the sender lets the writer drain its queue and exit.
        drop(
            self.outbound
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let drained = self.wait_for_writer();
        if !drained {
            warn!(
                target: CHANNEL_TARGET,
                timeout = ?self.flush_timeout,
                "client stopped reading; abandoning queued messages"
            );
        }

        // Shutting the socket down also fails any write still blocked on a
        // client that is not reading.
        if let Err(error) = self.control.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            warn!(
                target: CHANNEL_TARGET,
                error = %error,
                "failed to shut down client socket"
            );
        }

        let writer = self
            .writer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        writer.map_or(Ok(()), |handle| {
            handle.join().map_err(|_| ChannelError::WriterPanic)
        })?;
        if drained {
            Ok(())
        } else {
            Err(ChannelError::FlushTimedOut {
                timeout: self.flush_timeout,
            })
        }
    }
}

fn run_writer(mut stream: ConnectionStream, outbound: &mpsc::Receiver<Vec<u8>>) {
    for line in outbound {
        if let Err(error) = stream.write_all(&line).and_then(|()| stream.flush()) {
            warn!(
                target: CHANNEL_TARGET,
                error = %error,
                "could not send message to client"
            );
            return;
        }
    }
}

/// Reads the next non-blank line, without its size exceeding `limit`.
///
/// A final line without a trailing newline is returned as-is. Returns
/// `Ok(None)` at end of stream. An oversized line is consumed up to and
/// including its newline before [`ChannelError::MessageTooLarge`] is
/// returned, so the next call starts on the following line.
pub(super) fn read_line<R: BufRead>(
    reader: &mut R,
    limit: usize,
) -> Result<Option<Vec<u8>>, ChannelError> {
    let cap = u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1);
    loop {
        let mut line = Vec::new();
        let read = reader.by_ref().take(cap).read_until(b'\n', &mut line)?;
        if read == 0 {
            return Ok(None);
        }
        let content_len = line.strip_suffix(b"\n").map_or(line.len(), <[u8]>::len);
        if content_len > limit {
            if !line.ends_with(b"\n") {
                discard_rest_of_line(reader)?;
            }
            return Err(ChannelError::MessageTooLarge { limit });
        }
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        return Ok(Some(line));
    }
}

fn discard_rest_of_line<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        let buffer = match reader.fill_buf() {
            Ok(buffer) => buffer,
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        };
        if buffer.is_empty() {
            return Ok(());
        }
        let (consumed, found) = match buffer.iter().position(|byte| *byte == b'\n') {
            Some(newline) => (newline + 1, true),
            None => (buffer.len(), false),
        };
        reader.consume(consumed);
        if found {
            return Ok(());
        }
    }
}
