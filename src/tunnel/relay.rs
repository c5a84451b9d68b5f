//! Relay loops moving bytes in one direction of a connection
//!
//! Every loop reads a unit from its source, transforms it and writes it to
//! its destination until either side fails or the source ends. [`Relay::run`]
//! then shuts down both sockets so the opposite direction, blocked in its own
//! read or write, terminates as well.

use super::frame::{encode_frame, FrameReader};
use super::TunnelError;
use crate::crypto::{Decryptor, Encryptor};
use crate::obfuscation::{Keystream, XorReader, XorWriter};
use crate::transport;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, error, trace};

/// Copy bytes unchanged, `buffer_size` at a time. Returns the bytes relayed.
pub async fn relay_plain<R, W>(
    reader: &mut R,
    writer: &mut W,
    buffer_size: usize,
) -> Result<u64, TunnelError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        writer.write_all(&buf[..n]).await?;
        writer.flush().await?;
        total += n as u64;
    }
}

/// Read plaintext chunks and write each one as an encrypted frame.
/// Returns the plaintext bytes relayed.
pub async fn relay_encrypt<R, W, E>(
    reader: &mut R,
    writer: &mut W,
    encryptor: &E,
    buffer_size: usize,
) -> Result<u64, TunnelError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    E: Encryptor + ?Sized,
{
    let mut buf = vec![0u8; buffer_size];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(total);
        }
        let frame = encode_frame(encryptor, &buf[..n])?;
        trace!("Sealed {} bytes into a {} byte frame", n, frame.len());
        writer.write_all(&frame).await?;
        writer.flush().await?;
        total += n as u64;
    }
}

/// Read encrypted frames and write their plaintext. Returns the plaintext
/// bytes relayed.
pub async fn relay_decrypt<R, W, D>(
    reader: &mut R,
    writer: &mut W,
    decryptor: &D,
    frames: &mut FrameReader,
) -> Result<u64, TunnelError>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
    D: Decryptor + ?Sized,
{
    let mut total = 0u64;
    while let Some(plaintext) = frames.read_plaintext(reader, decryptor).await? {
        writer.write_all(&plaintext).await?;
        writer.flush().await?;
        total += plaintext.len() as u64;
    }
    Ok(total)
}

/// What a relay does to the bytes it moves
#[derive(Clone)]
enum Shape {
    Plain,
    Encrypt(Arc<dyn Encryptor>),
    Decrypt(Arc<dyn Decryptor>),
}

impl Shape {
    fn name(&self) -> &'static str {
        match self {
            Shape::Plain => "plain",
            Shape::Encrypt(_) => "encrypt",
            Shape::Decrypt(_) => "decrypt",
        }
    }
}

/// One relay direction of a TCP connection
#[derive(Clone)]
pub struct Relay {
    shape: Shape,
    /// XOR the written stream (plain, encrypt) or the read stream (decrypt)
    seed: Option<i64>,
    buffer_size: usize,
}

impl Relay {
    pub fn plain(seed: Option<i64>, buffer_size: usize) -> Self {
        Self {
            shape: Shape::Plain,
            seed,
            buffer_size,
        }
    }

    pub fn encrypt(encryptor: Arc<dyn Encryptor>, seed: Option<i64>, buffer_size: usize) -> Self {
        Self {
            shape: Shape::Encrypt(encryptor),
            seed,
            buffer_size,
        }
    }

    pub fn decrypt(decryptor: Arc<dyn Decryptor>, seed: Option<i64>, buffer_size: usize) -> Self {
        Self {
            shape: Shape::Decrypt(decryptor),
            seed,
            buffer_size,
        }
    }

    /// Relay from `reader` to `writer` until either fails or the reader ends,
    /// then shut down both underlying sockets. Returns the bytes relayed, or 0
    /// if the relay failed.
    ///
    /// Failures end the connection and are logged here; they never reach the
    /// tunnel. A fresh keystream is started on every call, so each connection
    /// replays the seed's sequence from the beginning.
    pub async fn run(self, mut reader: OwnedReadHalf, mut writer: OwnedWriteHalf) -> u64 {
        let name = self.shape.name();
        let keystream = self.seed.map(Keystream::new);

        let result = match (&self.shape, keystream) {
            (Shape::Plain, None) => relay_plain(&mut reader, &mut writer, self.buffer_size).await,
            (Shape::Plain, Some(ks)) => {
                let mut writer = XorWriter::new(&mut writer, ks);
                relay_plain(&mut reader, &mut writer, self.buffer_size).await
            }
            (Shape::Encrypt(enc), None) => {
                relay_encrypt(&mut reader, &mut writer, enc.as_ref(), self.buffer_size).await
            }
            (Shape::Encrypt(enc), Some(ks)) => {
                let mut writer = XorWriter::new(&mut writer, ks);
                relay_encrypt(&mut reader, &mut writer, enc.as_ref(), self.buffer_size).await
            }
            (Shape::Decrypt(dec), ks) => {
                let mut frames = FrameReader::for_chunk_size(dec.as_ref(), self.buffer_size);
                match ks {
                    None => relay_decrypt(&mut reader, &mut writer, dec.as_ref(), &mut frames).await,
                    Some(ks) => {
                        let mut reader = XorReader::new(&mut reader, ks);
                        relay_decrypt(&mut reader, &mut writer, dec.as_ref(), &mut frames).await
                    }
                }
            }
        };

        transport::shutdown(reader.as_ref());
        transport::shutdown(writer.as_ref());

        match result {
            Ok(total) => {
                debug!("{} relay finished after {} bytes", name, total);
                total
            }
            Err(e) => {
                log_failure(name, &e);
                0
            }
        }
    }
}

fn log_failure(name: &str, e: &TunnelError) {
    match e {
        TunnelError::Crypto(crypto) if crypto.is_authentication() => {
            error!("{} relay rejected data from peer: {}", name, crypto)
        }
        e if e.is_disconnect() => debug!("{} relay closed: {}", name, e),
        e => error!("{} relay aborted: {}", name, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcm;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};

    /// Connected loopback pair: (client side, server side)
    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_run_counts_bytes_and_closes() {
        let (mut upstream, relay_in) = socket_pair().await;
        let (relay_out, mut downstream) = socket_pair().await;
        let (read_half, _) = relay_in.into_split();
        let (_, write_half) = relay_out.into_split();

        let task = tokio::spawn(Relay::plain(Some(4), 16).run(read_half, write_half));

        upstream.write_all(&[0xaa; 100]).await.unwrap();
        upstream.shutdown().await.unwrap();

        let mut wire = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), downstream.read_to_end(&mut wire))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(task.await.unwrap(), 100);

        let mut expected = vec![0xaa; 100];
        Keystream::new(4).apply(&mut expected);
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn test_run_rejects_forged_frame() {
        let cipher = Arc::new(AesGcm::new(&[8u8; 16]).unwrap());
        let forger = AesGcm::new(&[9u8; 16]).unwrap();

        let (mut upstream, relay_in) = socket_pair().await;
        let (relay_out, mut downstream) = socket_pair().await;
        let (read_half, _) = relay_in.into_split();
        let (_, write_half) = relay_out.into_split();

        let task = tokio::spawn(Relay::decrypt(cipher, None, 64).run(read_half, write_half));

        upstream
            .write_all(&encode_frame(&forger, b"forged").unwrap())
            .await
            .unwrap();

        assert_eq!(task.await.unwrap(), 0);

        let mut buf = [0u8; 8];
        let n = tokio::time::timeout(Duration::from_secs(5), downstream.read(&mut buf))
            .await
            .expect("destination left open after a forged frame");
        assert!(matches!(n, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_plain_copies_everything() {
        let data: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        let mut out = Vec::new();
        let total = relay_plain(&mut &data[..], &mut out, 1024).await.unwrap();
        assert_eq!(total, data.len() as u64);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_encrypt_then_decrypt() {
        let cipher = AesGcm::new(&[3u8; 16]).unwrap();
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 7) as u8).collect();

        let mut wire = Vec::new();
        let sent = relay_encrypt(&mut &data[..], &mut wire, &cipher, 512)
            .await
            .unwrap();
        assert_eq!(sent, data.len() as u64);
        // 5000 bytes in 512 byte chunks: 10 frames
        assert_eq!(wire.len(), data.len() + 10 * (4 + AesGcm::overhead()));

        let mut out = Vec::new();
        let mut frames = FrameReader::for_chunk_size(&cipher, 512);
        let received = relay_decrypt(&mut &wire[..], &mut out, &cipher, &mut frames)
            .await
            .unwrap();
        assert_eq!(received, data.len() as u64);
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_obfuscated_frames_roundtrip() {
        let cipher = AesGcm::new(&[5u8; 32]).unwrap();
        let data = vec![0x55u8; 3000];

        let mut wire = XorWriter::new(Vec::new(), Keystream::new(11));
        relay_encrypt(&mut &data[..], &mut wire, &cipher, 1024)
            .await
            .unwrap();
        let wire = wire.into_inner();

        let mut reader = XorReader::new(&wire[..], Keystream::new(11));
        let mut out = Vec::new();
        let mut frames = FrameReader::for_chunk_size(&cipher, 1024);
        relay_decrypt(&mut reader, &mut out, &cipher, &mut frames)
            .await
            .unwrap();
        assert_eq!(out, data);
    }

    #[tokio::test]
    async fn test_decrypt_stops_on_bad_frame() {
        let cipher = AesGcm::new(&[5u8; 32]).unwrap();
        let other = AesGcm::new(&[6u8; 32]).unwrap();

        let mut wire = encode_frame(&cipher, b"good").unwrap().to_vec();
        wire.extend_from_slice(&encode_frame(&other, b"forged").unwrap());
        wire.extend_from_slice(&encode_frame(&cipher, b"never reached").unwrap());

        let mut out = Vec::new();
        let mut frames = FrameReader::for_chunk_size(&cipher, 64);
        let result = relay_decrypt(&mut &wire[..], &mut out, &cipher, &mut frames).await;

        assert!(matches!(result, Err(TunnelError::Crypto(_))));
        assert_eq!(out, b"good");
    }
}
