//! Framed TCP transport for Diameter messages.
//!
//! Messages are framed by the 3-byte length field at offset 1 of the
//! message header (RFC 6733 section 2.1).

use bytes::BytesMut;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{DiameterError, DiameterResult};
use crate::message::{DiameterMessage, HEADER_LEN};

/// Upper bound on accepted message size. RFC 6733 allows up to 16MB; the Cx
/// traffic this crate handles never comes close.
const MAX_MESSAGE_LEN: usize = 1 << 16;

/// Reading half of a Diameter connection
pub struct TransportReader {
    half: OwnedReadHalf,
    buf: BytesMut,
}

/// Writing half of a Diameter connection
pub struct TransportWriter {
    half: OwnedWriteHalf,
}

/// A connected Diameter transport
pub struct Transport {
    reader: TransportReader,
    writer: TransportWriter,
    peer_addr: SocketAddr,
}

impl Transport {
    /// Connect to a remote peer
    pub async fn connect(addr: SocketAddr) -> DiameterResult<Self> {
        let stream = TcpStream::connect(addr).await?;
        Self::from_stream(stream)
    }

    /// Wrap an already-established stream
    pub fn from_stream(stream: TcpStream) -> DiameterResult<Self> {
        let peer_addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: TransportReader {
                half: read_half,
                buf: BytesMut::with_capacity(4096),
            },
            writer: TransportWriter { half: write_half },
            peer_addr,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        self.writer.send(msg).await
    }

    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        self.reader.recv().await
    }

    /// Split into independently owned halves so reads and writes can be
    /// driven from different tasks
    pub fn into_split(self) -> (TransportReader, TransportWriter) {
        (self.reader, self.writer)
    }
}

impl TransportWriter {
    pub async fn send(&mut self, msg: &DiameterMessage) -> DiameterResult<()> {
        let frame = msg.encode();
        self.half.write_all(&frame).await?;
        self.half.flush().await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) -> DiameterResult<()> {
        self.half.shutdown().await?;
        Ok(())
    }
}

impl TransportReader {
    pub async fn recv(&mut self) -> DiameterResult<DiameterMessage> {
        loop {
            if let Some(msg) = self.take_frame()? {
                return Ok(msg);
            }
            let n = self.half.read_buf(&mut self.buf).await?;
            if n == 0 {
                return Err(DiameterError::PeerClosed);
            }
        }
    }

    fn take_frame(&mut self) -> DiameterResult<Option<DiameterMessage>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }

        let frame_len = ((self.buf[1] as usize) << 16)
            | ((self.buf[2] as usize) << 8)
            | self.buf[3] as usize;

        if frame_len < HEADER_LEN || frame_len > MAX_MESSAGE_LEN {
            return Err(DiameterError::Malformed(format!(
                "framed length {frame_len} out of range"
            )));
        }
        if self.buf.len() < frame_len {
            return Ok(None);
        }

        let mut frame = self.buf.split_to(frame_len).freeze();
        DiameterMessage::decode(&mut frame).map(Some)
    }
}
