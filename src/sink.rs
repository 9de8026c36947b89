//! Output sinks for converted SSR messages
//!
//! Plain sinks take bytes; the PPP-Wiz variant wraps every 50-byte chunk
//! in a text line `"<n> <fmt> <epoch> <HEX>"` and is also fed the raw
//! container stream when forwarding is enabled.

use std::fs::File;
use std::io::{self, Write};
use std::net::{TcpListener, TcpStream};

use log::{info, warn};

/// PPP-Wiz format tag for raw SBF container bytes
pub const PPPWIZ_RAW_SBF: u32 = 12;
/// PPP-Wiz format tag for raw BINEX container bytes
pub const PPPWIZ_RAW_BINEX: u32 = 10;

/// A byte-oriented output
pub trait Sink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub struct FileSink {
    file: File,
}

impl FileSink {
    pub fn create(path: &str) -> io::Result<FileSink> {
        Ok(FileSink {
            file: File::create(path)?,
        })
    }
}

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes)
    }

    fn close(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// TCP server sink: binds at construction and blocks until a client
/// connects. A broken pipe puts it back into listening state and the
/// write is retried against the next client.
pub struct TcpSink {
    listener: TcpListener,
    client: TcpStream,
}

impl TcpSink {
    pub fn bind(addr: &str, port: u16) -> io::Result<TcpSink> {
        let listener = TcpListener::bind((addr, port))?;
        info!("waiting for connection on {}:{}", addr, port);
        let (client, peer) = listener.accept()?;
        info!("connection established with {}", peer);
        Ok(TcpSink { listener, client })
    }

    fn reconnect(&mut self) -> io::Result<()> {
        info!("client gone, waiting for a new connection");
        let (client, peer) = self.listener.accept()?;
        info!("connection established with {}", peer);
        self.client = client;
        Ok(())
    }
}

impl Sink for TcpSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self.client.write_all(bytes) {
            Ok(()) => Ok(()),
            Err(e)
                if e.kind() == io::ErrorKind::BrokenPipe
                    || e.kind() == io::ErrorKind::ConnectionReset
                    || e.kind() == io::ErrorKind::ConnectionAborted =>
            {
                warn!("connection lost: {}", e);
                self.reconnect()?;
                self.client.write_all(bytes)
            }
            Err(e) => Err(e),
        }
    }
}

/// Where PPP-Wiz lines go
enum PppWizTarget {
    File(File),
    Stdout,
}

/// Formats records as PPP-Wiz text lines
pub struct PppWizSink {
    target: PppWizTarget,
    epoch: i64,
}

impl PppWizSink {
    pub fn file(path: &str) -> io::Result<PppWizSink> {
        Ok(PppWizSink {
            target: PppWizTarget::File(File::create(path)?),
            epoch: 0,
        })
    }

    pub fn stdout() -> PppWizSink {
        PppWizSink {
            target: PppWizTarget::Stdout,
            epoch: 0,
        }
    }

    /// Write one record as 50-byte hex chunks. `epoch` updates the
    /// sticky timestamp when given.
    pub fn write_tagged(
        &mut self,
        bytes: &[u8],
        n: u32,
        fmt: u32,
        epoch: Option<i64>,
    ) -> io::Result<()> {
        if let Some(e) = epoch {
            if e != 0 {
                self.epoch = e;
            }
        }
        for chunk in bytes.chunks(50) {
            let mut hex = String::with_capacity(chunk.len() * 2);
            for b in chunk {
                hex.push_str(&format!("{:02X}", b));
            }
            let line = format!("{} {} {} {}\n", n, fmt, self.epoch, hex);
            match &mut self.target {
                PppWizTarget::File(f) => f.write_all(line.as_bytes())?,
                PppWizTarget::Stdout => io::stdout().write_all(line.as_bytes())?,
            }
        }
        Ok(())
    }

    pub fn close(&mut self) -> io::Result<()> {
        if let PppWizTarget::File(f) = &mut self.target {
            f.flush()?;
        }
        Ok(())
    }
}

/// The converter's output: either a plain byte sink or the PPP-Wiz
/// formatter
pub enum Output {
    Plain(Box<dyn Sink>),
    PppWiz(PppWizSink),
}

impl Output {
    /// Whether raw container bytes should be forwarded alongside the
    /// converted messages
    pub fn wants_raw(&self) -> bool {
        matches!(self, Output::PppWiz(_))
    }

    /// One converted SSR message
    pub fn write_ssr(&mut self, bytes: &[u8], epoch: i64) -> io::Result<()> {
        match self {
            Output::Plain(sink) => sink.write(bytes),
            Output::PppWiz(sink) => sink.write_tagged(bytes, 2, 1, Some(epoch)),
        }
    }

    /// Raw container bytes (PPP-Wiz forwarding); dropped by plain sinks
    pub fn write_raw(&mut self, bytes: &[u8], fmt: u32) -> io::Result<()> {
        match self {
            Output::Plain(_) => Ok(()),
            Output::PppWiz(sink) => sink.write_tagged(bytes, 1, fmt, None),
        }
    }

    pub fn close(&mut self) -> io::Result<()> {
        match self {
            Output::Plain(sink) => sink.close(),
            Output::PppWiz(sink) => sink.close(),
        }
    }
}
