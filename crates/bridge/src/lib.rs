//! Stream bridge (§4.2): bidirectional byte copying between two live
//! streams, used both to splice a relay's inbound and outbound legs and
//! to connect an originator's local pipe endpoint to the first hop.
//!
//! Grounded in the reference implementation's `copy_deadline.go`: two
//! concurrent copy loops sharing a close-once latch — the first loop to
//! finish (EOF or error) force-closes both streams so a stalled peer on
//! one leg can't hang the other side forever.

use onionmesh_core::{OnionMeshError, Result};
use tokio::io::{split, AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

/// Matches the reference implementation's `CopyBufSize`.
pub const COPY_BUF_SIZE: usize = 4096;

/// Bridge two streams until either side closes or errors, then close both.
/// Returns `Ok(())` on a clean finish; otherwise a single `TransportError`
/// enumerating every non-benign failure across the two copy loops and the
/// two close calls they trigger.
pub async fn bridge<A, B>(a: A, b: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut a_read, mut a_write) = split(a);
    let (mut b_read, mut b_write) = split(b);

    let (cancel_tx, cancel_rx) = watch::channel(false);

    let tx_ab = cancel_tx.clone();
    let rx_ab = cancel_rx.clone();
    let a_to_b = tokio::spawn(async move {
        let copy_result = copy_loop(&mut a_read, &mut b_write, rx_ab).await;
        let _ = tx_ab.send(true);
        let close_result = b_write.shutdown().await.map_err(OnionMeshError::from);
        (copy_result, close_result)
    });

    let tx_ba = cancel_tx;
    let rx_ba = cancel_rx;
    let b_to_a = tokio::spawn(async move {
        let copy_result = copy_loop(&mut b_read, &mut a_write, rx_ba).await;
        let _ = tx_ba.send(true);
        let close_result = a_write.shutdown().await.map_err(OnionMeshError::from);
        (copy_result, close_result)
    });

    let (ab, ba) = tokio::join!(a_to_b, b_to_a);
    let (copy_a_to_b, close_b) =
        ab.map_err(|e| OnionMeshError::TransportError(e.to_string()))?;
    let (copy_b_to_a, close_a) =
        ba.map_err(|e| OnionMeshError::TransportError(e.to_string()))?;

    let mut failures = Vec::new();
    if let Err(e) = copy_a_to_b {
        failures.push(format!("copyA: {e}"));
    }
    if let Err(e) = copy_b_to_a {
        failures.push(format!("copyB: {e}"));
    }
    if let Err(e) = close_a {
        failures.push(format!("closeA: {e}"));
    }
    if let Err(e) = close_b {
        failures.push(format!("closeB: {e}"));
    }

    if failures.is_empty() {
        tracing::debug!("bridge closed, both legs reached EOF");
        Ok(())
    } else {
        Err(OnionMeshError::TransportError(failures.join("; ")))
    }
}

/// Copies `reader` into `writer` until EOF, a read/write error, or the
/// sibling loop signals cancellation via `cancel`. Cancellation ends the
/// loop cleanly (`Ok(())`) since it reflects a deliberate close on the
/// other leg, not a failure of this one.
async fn copy_loop<R, W>(reader: &mut R, writer: &mut W, mut cancel: watch::Receiver<bool>) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    use tokio::io::AsyncReadExt;

    let mut buf = vec![0u8; COPY_BUF_SIZE];
    loop {
        let n = tokio::select! {
            res = reader.read(&mut buf) => res.map_err(OnionMeshError::from)?,
            _ = cancel.changed() => return Ok(()),
        };
        if n == 0 {
            return Ok(());
        }
        writer
            .write_all(&buf[..n])
            .await
            .map_err(OnionMeshError::from)?;
    }
}
