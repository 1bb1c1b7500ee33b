//! AEAD frame codec (§4.1).
//!
//! Wraps an arbitrary byte stream in length-delimited, authenticated
//! frames: `nonce(12) || len(4 BE) || ciphertext+tag(len+16)`, with the
//! header bytes as associated data. Grounded in the reference
//! implementation's `chacha.go`, with one deliberate fix: a frame body is
//! always read with a read-full loop, never a single `read()` call, since
//! the latter can silently under-read on a streaming transport.
//!
//! `FramedStream` implements `AsyncRead`/`AsyncWrite` directly (rather than
//! exposing its own `read`/`write` methods) so it composes with
//! `onionmesh_bridge::bridge` and the rest of the stream plumbing without
//! a separate adapter.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Maximum plaintext bytes per frame, matching the reference
/// implementation's `streamMaxMessage`.
pub const MAX_FRAGMENT: usize = 256;
const NONCE_LEN: usize = 12;
const LEN_LEN: usize = 4;
const HEADER_LEN: usize = NONCE_LEN + LEN_LEN;
const TAG_LEN: usize = 16;

enum ReadState {
    Header {
        buf: [u8; HEADER_LEN],
        filled: usize,
    },
    Body {
        header: [u8; HEADER_LEN],
        buf: Vec<u8>,
        filled: usize,
    },
}

enum WriteState {
    Idle,
    Writing {
        buf: Vec<u8>,
        pos: usize,
        plain_len: usize,
    },
}

/// An AEAD-framed stream over any `AsyncRead + AsyncWrite` transport.
pub struct FramedStream<S> {
    inner: S,
    cipher: ChaCha20Poly1305,
    /// Decrypted bytes from the most recent frame not yet handed to the
    /// caller via `poll_read`.
    pending: Vec<u8>,
    pending_pos: usize,
    read_state: ReadState,
    write_state: WriteState,
}

impl<S> FramedStream<S> {
    pub fn new(inner: S, key: &[u8; 32]) -> Self {
        Self {
            inner,
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
            pending: Vec::new(),
            pending_pos: 0,
            read_state: ReadState::Header {
                buf: [0u8; HEADER_LEN],
                filled: 0,
            },
            write_state: WriteState::Idle,
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> FramedStream<S> {
    /// Drives the read state machine until a decrypted frame lands in
    /// `pending`, or the inner stream hits a clean EOF before a new frame
    /// starts (in which case `pending` stays empty and `Ok(())` is still
    /// returned — the caller's `poll_read` sees zero bytes filled).
    fn poll_fill_frame(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        loop {
            let this = self.as_mut().get_mut();
            match &mut this.read_state {
                ReadState::Header { buf, filled } => {
                    if *filled < HEADER_LEN {
                        let mut read_buf = ReadBuf::new(&mut buf[*filled..]);
                        match Pin::new(&mut this.inner).poll_read(cx, &mut read_buf) {
                            Poll::Ready(Ok(())) => {
                                let n = read_buf.filled().len();
                                if n == 0 {
                                    if *filled == 0 {
                                        return Poll::Ready(Ok(()));
                                    }
                                    return Poll::Ready(Err(io::Error::new(
                                        io::ErrorKind::UnexpectedEof,
                                        "eof mid frame header",
                                    )));
                                }
                                *filled += n;
                            }
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Pending => return Poll::Pending,
                        }
                    } else {
                        let header = *buf;
                        let len =
                            u32::from_be_bytes(header[NONCE_LEN..].try_into().unwrap()) as usize;
                        if len > MAX_FRAGMENT {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::InvalidData,
                                "frame exceeds max fragment size",
                            )));
                        }
                        this.read_state = ReadState::Body {
                            header,
                            buf: vec![0u8; len + TAG_LEN],
                            filled: 0,
                        };
                    }
                }
                ReadState::Body { header, buf, filled } => {
                    if *filled < buf.len() {
                        let mut read_buf = ReadBuf::new(&mut buf[*filled..]);
                        match Pin::new(&mut this.inner).poll_read(cx, &mut read_buf) {
                            Poll::Ready(Ok(())) => {
                                let n = read_buf.filled().len();
                                if n == 0 {
                                    return Poll::Ready(Err(io::Error::new(
                                        io::ErrorKind::UnexpectedEof,
                                        "eof mid frame body",
                                    )));
                                }
                                *filled += n;
                            }
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Pending => return Poll::Pending,
                        }
                    } else {
                        let nonce = Nonce::from_slice(&header[..NONCE_LEN]);
                        let plaintext = this.cipher.decrypt(
                            nonce,
                            chacha20poly1305::aead::Payload {
                                msg: buf,
                                aad: header,
                            },
                        );
                        let header = *header;
                        this.read_state = ReadState::Header {
                            buf: [0u8; HEADER_LEN],
                            filled: 0,
                        };
                        let _ = header;
                        match plaintext {
                            Ok(p) => {
                                this.pending = p;
                                this.pending_pos = 0;
                                return Poll::Ready(Ok(()));
                            }
                            Err(_) => {
                                return Poll::Ready(Err(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "frame auth check failed",
                                )))
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for FramedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            if self.pending_pos < self.pending.len() {
                let available = &self.pending[self.pending_pos..];
                let n = available.len().min(buf.remaining());
                buf.put_slice(&available[..n]);
                self.pending_pos += n;
                return Poll::Ready(Ok(()));
            }
            match self.as_mut().poll_fill_frame(cx) {
                Poll::Ready(Ok(())) => {
                    if self.pending.is_empty() {
                        // Clean EOF on the inner stream before a new frame.
                        return Poll::Ready(Ok(()));
                    }
                    continue;
                }
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for FramedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let this = self.as_mut().get_mut();
            match &mut this.write_state {
                WriteState::Idle => {
                    let plain_len = data.len().min(MAX_FRAGMENT);
                    let fragment = &data[..plain_len];

                    let mut nonce_bytes = [0u8; NONCE_LEN];
                    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
                    let mut header = [0u8; HEADER_LEN];
                    header[..NONCE_LEN].copy_from_slice(&nonce_bytes);
                    header[NONCE_LEN..].copy_from_slice(&(plain_len as u32).to_be_bytes());

                    let nonce = Nonce::from_slice(&nonce_bytes);
                    let ciphertext = match this.cipher.encrypt(
                        nonce,
                        chacha20poly1305::aead::Payload {
                            msg: fragment,
                            aad: &header,
                        },
                    ) {
                        Ok(c) => c,
                        Err(_) => {
                            return Poll::Ready(Err(io::Error::new(
                                io::ErrorKind::Other,
                                "frame encryption failed",
                            )))
                        }
                    };

                    let mut buf = Vec::with_capacity(HEADER_LEN + ciphertext.len());
                    buf.extend_from_slice(&header);
                    buf.extend_from_slice(&ciphertext);
                    this.write_state = WriteState::Writing {
                        buf,
                        pos: 0,
                        plain_len,
                    };
                }
                WriteState::Writing { buf, pos, plain_len } => {
                    while *pos < buf.len() {
                        match Pin::new(&mut this.inner).poll_write(cx, &buf[*pos..]) {
                            Poll::Ready(Ok(n)) => *pos += n,
                            Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                            Poll::Pending => return Poll::Pending,
                        }
                    }
                    let plain_len = *plain_len;
                    this.write_state = WriteState::Idle;
                    return Poll::Ready(Ok(plain_len));
                }
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
