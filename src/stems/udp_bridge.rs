//! UDP link to the local inference process.
//!
//! Handshake: one JSON `hello` datagram answered by `{"type":"ready"}`.
//! Per block: `u32 seq` + interleaved stereo f32 out, `u32 seq` + interleaved
//! 8-stem f32 back, all little endian.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use super::{STEM_CHANNELS, StemSeparator};
use crate::audio::AudioBlock;
use crate::error::PrismError;

const MAX_DATAGRAM: usize = 65_536;

#[derive(Serialize)]
struct Hello<'a> {
    #[serde(rename = "type")]
    msg_type: &'static str,
    model: &'a str,
    frames: usize,
    input_channels: usize,
    output_channels: usize,
    sample_rate: u32,
}

#[derive(Deserialize)]
struct Reply {
    #[serde(rename = "type")]
    msg_type: String,
    error: Option<String>,
}

pub struct UdpStemBridge {
    socket: UdpSocket,
    block_timeout: Duration,
    seq: u32,
    tx_buf: BytesMut,
    rx_buf: Vec<u8>,
}

impl UdpStemBridge {
    /// Bind `local` and fix `remote` as the only peer.
    pub fn connect(local: SocketAddr, remote: SocketAddr, block_timeout: Duration) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(local)?;
        socket.connect(remote)?;
        Ok(Self {
            socket,
            block_timeout,
            seq: 0,
            tx_buf: BytesMut::with_capacity(MAX_DATAGRAM),
            rx_buf: vec![0u8; MAX_DATAGRAM],
        })
    }

    /// Announce the stream shape and wait for the model to report ready.
    pub fn handshake(
        &mut self,
        model: &str,
        frames: usize,
        input_channels: usize,
        output_channels: usize,
        sample_rate: u32,
        timeout: Duration,
    ) -> Result<(), PrismError> {
        let hello = Hello {
            msg_type: "hello",
            model,
            frames,
            input_channels,
            output_channels,
            sample_rate,
        };
        let payload = serde_json::to_vec(&hello)
            .map_err(|e| PrismError::BackendUnavailable(format!("encode hello: {}", e)))?;
        self.socket
            .send(&payload)
            .map_err(|e| PrismError::BackendUnavailable(format!("send hello: {}", e)))?;

        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))
            .map_err(|e| PrismError::BackendUnavailable(e.to_string()))?;
        let len = self
            .socket
            .recv(&mut self.rx_buf)
            .map_err(|e| PrismError::BackendUnavailable(format!("no reply from bridge: {}", e)))?;

        let reply: Reply = serde_json::from_slice(&self.rx_buf[..len])
            .map_err(|e| PrismError::BackendUnavailable(format!("bad reply: {}", e)))?;
        if reply.msg_type != "ready" {
            return Err(PrismError::BackendUnavailable(
                reply.error.unwrap_or_else(|| format!("unexpected reply '{}'", reply.msg_type)),
            ));
        }
        Ok(())
    }

    fn recv_matching(&mut self, seq: u32) -> Result<usize, PrismError> {
        let deadline = Instant::now() + self.block_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PrismError::Inference("timed out waiting for stems".into()));
            }
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(|e| PrismError::Inference(e.to_string()))?;
            let len = match self.socket.recv(&mut self.rx_buf) {
                Ok(len) => len,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Err(PrismError::Inference("timed out waiting for stems".into()));
                }
                Err(e) => return Err(PrismError::Inference(e.to_string())),
            };
            if len < 4 {
                continue;
            }
            let got = (&self.rx_buf[..4]).get_u32_le();
            if got == seq {
                return Ok(len);
            }
            // Late answer for an earlier block
            log::debug!("Dropping stale stem response seq={} (want {})", got, seq);
        }
    }
}

impl StemSeparator for UdpStemBridge {
    fn separate(&mut self, input: &AudioBlock, output: &mut AudioBlock) -> Result<(), PrismError> {
        self.seq = self.seq.wrapping_add(1);
        let seq = self.seq;

        self.tx_buf.clear();
        self.tx_buf.put_u32_le(seq);
        for &s in input.as_slice() {
            self.tx_buf.put_f32_le(s);
        }
        self.socket
            .send(&self.tx_buf)
            .map_err(|e| PrismError::Inference(e.to_string()))?;

        let len = self.recv_matching(seq)?;
        let mut payload = &self.rx_buf[4..len];
        let expected = input.frames() * STEM_CHANNELS * 4;
        if payload.remaining() != expected {
            return Err(PrismError::Inference(format!(
                "stem payload is {} bytes, expected {}",
                payload.remaining(),
                expected
            )));
        }

        if output.frames() != input.frames() || output.channels() != STEM_CHANNELS {
            *output = AudioBlock::silent(input.frames(), STEM_CHANNELS);
        }
        for s in output.as_mut_slice() {
            *s = payload.get_f32_le();
        }
        Ok(())
    }
}
