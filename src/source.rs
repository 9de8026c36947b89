//! Byte sources feeding the container deframers
//!
//! A `ByteSource` wraps a file, an accepted TCP connection or a serial
//! port behind one polling discipline: streaming reads poll with a
//! 100 ms timeout, and a source that stays silent for 300 s is declared
//! dead. Files end with a clean EOF instead.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::net::TcpListener;
use std::time::{Duration, Instant};

use log::{info, warn};

const POLL_TIMEOUT: Duration = Duration::from_millis(100);
const STARVATION_TIMEOUT: Duration = Duration::from_secs(300);
const CHUNK: usize = 1024;

/// Stream-level conditions that end a pipeline run
#[derive(Debug)]
pub enum StreamError {
    /// End of file, or the peer closed the connection
    Eof,
    /// A streaming source produced no data for the starvation window
    Starved,
    Io(io::Error),
}

impl From<io::Error> for StreamError {
    fn from(e: io::Error) -> StreamError {
        StreamError::Io(e)
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StreamError::Eof => write!(f, "end of stream"),
            StreamError::Starved => write!(f, "no data received within the starvation window"),
            StreamError::Io(e) => write!(f, "stream I/O error: {}", e),
        }
    }
}

/// A byte stream with the pipeline's polling discipline
pub struct ByteSource {
    inner: Box<dyn Read>,
}

impl ByteSource {
    /// Open a file source, optionally discarding an initial fraction of
    /// it (the `--skip` option)
    pub fn file(path: &str, skip: f64) -> io::Result<ByteSource> {
        let mut file = File::open(path)?;
        if skip > 0.0 {
            let len = file.metadata()?.len();
            let offset = (len as f64 * skip.min(1.0)) as u64;
            file.seek(SeekFrom::Start(offset))?;
            info!("skipping first {} of {} bytes of {}", offset, len, path);
        }
        Ok(ByteSource {
            inner: Box::new(io::BufReader::new(file)),
        })
    }

    /// Bind `host:port` and wait for the receiver to connect to us
    pub fn tcp_listen(addr: &str) -> io::Result<ByteSource> {
        let listener = TcpListener::bind(addr)?;
        info!("waiting for connection on {}", addr);
        let (stream, peer) = listener.accept()?;
        info!("connection established with {}", peer);
        stream.set_read_timeout(Some(POLL_TIMEOUT))?;
        Ok(ByteSource {
            inner: Box::new(stream),
        })
    }

    /// Open a serial port at the given baud rate
    pub fn serial(path: &str, baud: u32) -> Result<ByteSource, serialport::Error> {
        let port = serialport::new(path, baud)
            .timeout(POLL_TIMEOUT)
            .open()?;
        info!("opened serial port {} at {} baud", path, baud);
        Ok(ByteSource {
            inner: Box::new(port),
        })
    }

    /// Wrap any reader; used by tests and by in-memory replays
    pub fn from_reader(reader: Box<dyn Read>) -> ByteSource {
        ByteSource { inner: reader }
    }

    /// Read one chunk into `buf`. Never returns zero bytes: EOF and
    /// starvation surface as errors.
    pub fn fill(&mut self, buf: &mut Vec<u8>) -> Result<usize, StreamError> {
        let mut chunk = [0u8; CHUNK];
        let mut warned = false;
        let mut deadline: Option<Instant> = None;
        loop {
            match self.inner.read(&mut chunk) {
                Ok(0) => return Err(StreamError::Eof),
                Ok(n) => {
                    buf.extend_from_slice(&chunk[..n]);
                    return Ok(n);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    // no data yet; keep polling until the starvation
                    // window runs out
                    let deadline =
                        *deadline.get_or_insert_with(|| Instant::now() + STARVATION_TIMEOUT);
                    if !warned {
                        warn!("source idle, shutting down in 300 s unless data arrives");
                        warned = true;
                    }
                    if Instant::now() >= deadline {
                        return Err(StreamError::Starved);
                    }
                }
                Err(e) => return Err(StreamError::Io(e)),
            }
        }
    }
}
