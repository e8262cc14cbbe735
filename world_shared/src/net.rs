//! Relay wire protocol.
//!
//! Goals:
//! - One reliable (TCP) stream per participant, split into read/write halves.
//! - Length-prefixed JSON frames so messages stay readable and versionable.
//! - Keep the message set small: the relay only stores and fans out.

use std::{collections::BTreeMap, net::SocketAddr};

use anyhow::Context;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpListener, TcpStream,
    },
};

use crate::{
    avatar::{AvatarState, ParticipantId},
    chat::ChatMessage,
    clock::Millis,
    minigame::{SharedPatch, SharedState, WriteConflict},
    room::RoomCode,
};

/// Protocol version for compatibility checks.
pub const PROTOCOL_VERSION: u32 = 1;

/// Frames larger than this are treated as a broken stream.
pub const MAX_FRAME_LEN: usize = 1 << 20;

/// High-level message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum NetMsg {
    // ─── Handshake ───
    Hello {
        protocol: u32,
        room: RoomCode,
        participant: ParticipantId,
    },
    Welcome {
        server_time_ms: Millis,
    },
    Reject {
        reason: String,
    },

    // ─── Client -> relay ───
    /// Presence update. The relay re-stamps liveness with its own clock.
    Publish(AvatarState),
    /// Removes the sender's presence entry.
    Retract,
    Chat {
        author: String,
        text: String,
    },
    WriteShared(SharedPatch),
    /// Orderly departure.
    Leave,

    // ─── Relay -> client ───
    /// Full snapshot of every other participant in the room.
    Peers {
        peers: BTreeMap<ParticipantId, AvatarState>,
    },
    /// Most recent chat messages, oldest first.
    ChatLog(Vec<ChatMessage>),
    Shared(SharedState),
    WriteConflict(WriteConflict),
    Disconnect {
        reason: String,
    },
}

/// Encodes one length-prefixed frame.
pub fn encode_frame(msg: &NetMsg) -> anyhow::Result<Bytes> {
    let payload = serde_json::to_vec(msg).context("serialize msg")?;
    let len = u32::try_from(payload.len()).context("frame too large")?;
    let mut buf = BytesMut::with_capacity(4 + payload.len());
    buf.put_u32(len);
    buf.extend_from_slice(&payload);
    Ok(buf.freeze())
}

pub async fn write_frame<W>(w: &mut W, msg: &NetMsg) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode_frame(msg)?;
    w.write_all(&frame).await.context("tcp write")?;
    Ok(())
}

pub async fn read_frame<R>(r: &mut R) -> anyhow::Result<NetMsg>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf).await.context("tcp read len")?;
    let len = u32::from_be_bytes(len_buf) as usize;
    anyhow::ensure!(len <= MAX_FRAME_LEN, "frame of {len} bytes exceeds limit");
    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)
        .await
        .context("tcp read payload")?;
    let msg = serde_json::from_slice(&payload).context("deserialize msg")?;
    Ok(msg)
}

/// Reliable connection over TCP with length-prefixed frames.
#[derive(Debug)]
pub struct ReliableConn {
    stream: TcpStream,
}

impl ReliableConn {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub async fn connect(addr: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("tcp connect {addr}"))?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok(Self::new(stream))
    }

    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.stream, msg).await
    }

    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.stream).await
    }

    pub fn peer_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    /// Splits into independently owned halves for a reader and a writer task.
    pub fn into_split(self) -> (ConnReader, ConnWriter) {
        let (r, w) = self.stream.into_split();
        (ConnReader { half: r }, ConnWriter { half: w })
    }
}

#[derive(Debug)]
pub struct ConnReader {
    half: OwnedReadHalf,
}

impl ConnReader {
    pub async fn recv(&mut self) -> anyhow::Result<NetMsg> {
        read_frame(&mut self.half).await
    }
}

#[derive(Debug)]
pub struct ConnWriter {
    half: OwnedWriteHalf,
}

impl ConnWriter {
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        write_frame(&mut self.half, msg).await
    }

    pub async fn shutdown(&mut self) -> anyhow::Result<()> {
        self.half.shutdown().await.context("tcp shutdown")
    }
}

/// TCP server listener.
pub struct ReliableListener {
    listener: TcpListener,
}

impl ReliableListener {
    pub async fn bind(addr: SocketAddr) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        Ok(Self { listener })
    }

    pub async fn accept(&self) -> anyhow::Result<(ReliableConn, SocketAddr)> {
        let (stream, addr) = self.listener.accept().await.context("tcp accept")?;
        stream.set_nodelay(true).context("set nodelay")?;
        Ok((ReliableConn::new(stream), addr))
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{avatar::CharacterSkin, math::Vec3};

    #[test]
    fn frame_has_big_endian_length_prefix() {
        let msg = NetMsg::Retract;
        let frame = encode_frame(&msg).unwrap();
        let len = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        assert_eq!(len, frame.len() - 4);
    }

    #[tokio::test]
    async fn peers_frame_survives_a_stream() {
        let mut peers = BTreeMap::new();
        peers.insert(
            ParticipantId::from("p1"),
            AvatarState::new(CharacterSkin::Coral, Vec3::new(1.0, 0.0, 2.0), 0.5),
        );
        let msg = NetMsg::Peers { peers };

        let (mut a, mut b) = tokio::io::duplex(4096);
        write_frame(&mut a, &msg).await.unwrap();
        let back = read_frame(&mut b).await.unwrap();
        assert_eq!(back, msg);
    }

    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let (mut a, mut b) = tokio::io::duplex(64);
        a.write_all(&((MAX_FRAME_LEN as u32) + 1).to_be_bytes())
            .await
            .unwrap();
        assert!(read_frame(&mut b).await.is_err());
    }

    #[test]
    fn hello_rejects_malformed_room_code() {
        let json = r#"{"Hello":{"protocol":1,"room":"bad room","participant":"x"}}"#;
        assert!(serde_json::from_str::<NetMsg>(json).is_err());
    }
}
