//! Frame encoding/decoding for encrypted streams
//!
//! Frame format:
//! ```text
//! +--------+--------+--------+--------+
//! |        Length (4B, big endian)    |
//! +--------+--------+--------+--------+
//! |   Ciphertext (nonce + data + tag) |
//! +--------+--------+--------+--------+
//! ```
//!
//! There is no magic or version field; both ends must agree on the key and
//! on roughly the same read chunk size.

use super::TunnelError;
use crate::crypto::{Decryptor, Encryptor};
use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_LEN: usize = 4;

/// Encrypt `plaintext` and prepend its length, ready to be written as one unit
pub fn encode_frame<E: Encryptor + ?Sized>(
    encryptor: &E,
    plaintext: &[u8],
) -> Result<BytesMut, TunnelError> {
    let crypted = encryptor.encrypt(plaintext)?;
    let len = u32::try_from(crypted.len())
        .map_err(|_| TunnelError::FrameTooLarge(crypted.len(), u32::MAX as usize))?;

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_LEN + crypted.len());
    buf.put_u32(len);
    buf.extend_from_slice(&crypted);
    Ok(buf)
}

/// Largest frame accepted from a peer reading `chunk_size` plaintext bytes.
///
/// Twice the local chunk size leaves room for a peer configured with a larger
/// buffer; the cipher's own overhead is added on top so the bound is exact for
/// the chunk sizes it admits.
pub fn max_frame_len<D: Decryptor + ?Sized>(decryptor: &D, chunk_size: usize) -> usize {
    decryptor.max_ciphertext_len(chunk_size.saturating_mul(2))
}

/// Reads frames into a buffer allocated once per relay direction
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    /// Reader rejecting frames longer than `max_frame_len`
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            buf: vec![0u8; max_frame_len],
        }
    }

    /// Reader sized for a peer producing frames from `chunk_size` reads
    pub fn for_chunk_size<D: Decryptor + ?Sized>(decryptor: &D, chunk_size: usize) -> Self {
        Self::new(max_frame_len(decryptor, chunk_size))
    }

    pub fn max_frame_len(&self) -> usize {
        self.buf.len()
    }

    /// Read the next frame's ciphertext.
    ///
    /// Returns `Ok(None)` if the stream ends cleanly before a frame starts.
    /// A stream ending inside a frame is an `UnexpectedEof` error.
    pub async fn read_frame<R>(&mut self, reader: &mut R) -> Result<Option<&[u8]>, TunnelError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut len_buf = [0u8; LENGTH_PREFIX_LEN];
        let mut filled = 0;
        while filled < LENGTH_PREFIX_LEN {
            let n = reader.read(&mut len_buf[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            filled += n;
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > self.buf.len() {
            return Err(TunnelError::FrameTooLarge(len, self.buf.len()));
        }

        reader.read_exact(&mut self.buf[..len]).await?;
        Ok(Some(&self.buf[..len]))
    }

    /// Read the next frame and decrypt it
    pub async fn read_plaintext<R, D>(
        &mut self,
        reader: &mut R,
        decryptor: &D,
    ) -> Result<Option<Vec<u8>>, TunnelError>
    where
        R: AsyncRead + Unpin + ?Sized,
        D: Decryptor + ?Sized,
    {
        match self.read_frame(reader).await? {
            Some(crypted) => Ok(Some(decryptor.decrypt(crypted)?)),
            None => Ok(None),
        }
    }
}
