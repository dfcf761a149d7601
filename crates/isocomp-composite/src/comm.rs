//! Collective exchanges between ranks.
//!
//! [`Communicator`] is the transport the redistributor runs on. Both operations are
//! blocking collectives: every rank of the group must call them in the same order.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::mpsc::{channel, Receiver, Sender};

use isocomp_core::{IsocompError, Result};

/// A group of ranks able to perform all-to-all exchanges.
pub trait Communicator {
    /// Index of this rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// Sends `send[r]` to rank `r` and returns the value every rank sent here, by rank.
    fn all_to_all(&self, send: &[usize]) -> Result<Vec<usize>>;

    /// Variable-sized exchange.
    ///
    /// Rank `r` receives `send[send_displs[r]..][..send_counts[r]]`. What rank `r` sent here
    /// is written to `recv[recv_displs[r]..][..recv_counts[r]]`.
    fn all_to_all_v(
        &self,
        send: &[u8],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [u8],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<()>;
}

fn check_len(expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(IsocompError::SizeMismatch { expected, actual })
    }
}

fn segment(buf: &[u8], displ: usize, count: usize) -> Result<&[u8]> {
    buf.get(displ..displ + count)
        .ok_or(IsocompError::SizeMismatch {
            expected: displ + count,
            actual: buf.len(),
        })
}

/// Copies `payload` into its receive slot.
fn place(recv: &mut [u8], displ: usize, count: usize, payload: &[u8]) -> Result<()> {
    check_len(count, payload.len())?;
    let len = recv.len();
    let slot = recv
        .get_mut(displ..displ + count)
        .ok_or(IsocompError::SizeMismatch {
            expected: displ + count,
            actual: len,
        })?;
    slot.copy_from_slice(payload);
    Ok(())
}

/// The trivial group of one rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfComm;

impl Communicator for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_to_all(&self, send: &[usize]) -> Result<Vec<usize>> {
        check_len(1, send.len())?;
        Ok(send.to_vec())
    }

    fn all_to_all_v(
        &self,
        send: &[u8],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [u8],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<()> {
        for len in [send_counts.len(), send_displs.len(), recv_counts.len(), recv_displs.len()] {
            check_len(1, len)?;
        }
        let payload = segment(send, send_displs[0], send_counts[0])?;
        place(recv, recv_displs[0], recv_counts[0], payload)
    }
}

/// One message between two ranks of a [`ThreadComm`] group.
#[derive(Debug)]
struct Envelope {
    source: usize,
    /// Index of the collective call that produced it.
    seq: u64,
    payload: Vec<u8>,
}

/// A rank of an in-process group whose members run on separate threads.
///
/// Created with [`ThreadComm::group`]; move each member onto its own thread.
#[derive(Debug)]
pub struct ThreadComm {
    rank: usize,
    peers: Vec<Sender<Envelope>>,
    inbox: Receiver<Envelope>,
    /// Messages from a later collective that arrived early.
    pending: RefCell<HashMap<(usize, u64), Vec<u8>>>,
    seq: Cell<u64>,
}

impl ThreadComm {
    /// Creates a group of `size` connected ranks, ordered by rank.
    pub fn group(size: usize) -> Vec<ThreadComm> {
        let (senders, inboxes): (Vec<_>, Vec<_>) = (0..size).map(|_| channel()).unzip();
        inboxes
            .into_iter()
            .enumerate()
            .map(|(rank, inbox)| ThreadComm {
                rank,
                peers: senders.clone(),
                inbox,
                pending: RefCell::new(HashMap::new()),
                seq: Cell::new(0),
            })
            .collect()
    }

    /// Sends one payload to every rank, `payloads[r]` to rank `r`, then collects the payload
    /// each rank sent here in the same collective.
    fn exchange(&self, mut payloads: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
        let seq = self.seq.get();
        self.seq.set(seq + 1);

        let own = std::mem::take(&mut payloads[self.rank]);
        for (dest, payload) in payloads.into_iter().enumerate() {
            if dest == self.rank {
                continue;
            }
            self.peers[dest]
                .send(Envelope {
                    source: self.rank,
                    seq,
                    payload,
                })
                .map_err(|_| {
                    IsocompError::Transport(format!("rank {dest} left the group"))
                })?;
        }

        let size = self.size();
        let mut received: Vec<Option<Vec<u8>>> = (0..size).map(|_| None).collect();
        received[self.rank] = Some(own);
        {
            let mut pending = self.pending.borrow_mut();
            for (source, slot) in received.iter_mut().enumerate() {
                if slot.is_none() {
                    *slot = pending.remove(&(source, seq));
                }
            }
        }
        while received.iter().any(Option::is_none) {
            let envelope = self.inbox.recv().map_err(|_| {
                IsocompError::Transport(format!("rank {}: group disconnected", self.rank))
            })?;
            if envelope.seq == seq {
                received[envelope.source] = Some(envelope.payload);
            } else {
                self.pending
                    .borrow_mut()
                    .insert((envelope.source, envelope.seq), envelope.payload);
            }
        }
        Ok(received.into_iter().flatten().collect())
    }
}

impl Communicator for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.peers.len()
    }

    fn all_to_all(&self, send: &[usize]) -> Result<Vec<usize>> {
        check_len(self.size(), send.len())?;
        let payloads = send
            .iter()
            .map(|&v| (v as u64).to_le_bytes().to_vec())
            .collect();
        self.exchange(payloads)?
            .into_iter()
            .map(|bytes| {
                let raw: [u8; 8] = bytes.as_slice().try_into().map_err(|_| {
                    IsocompError::Transport(format!("expected 8 bytes, got {}", bytes.len()))
                })?;
                usize::try_from(u64::from_le_bytes(raw))
                    .map_err(|e| IsocompError::Transport(e.to_string()))
            })
            .collect()
    }

    fn all_to_all_v(
        &self,
        send: &[u8],
        send_counts: &[usize],
        send_displs: &[usize],
        recv: &mut [u8],
        recv_counts: &[usize],
        recv_displs: &[usize],
    ) -> Result<()> {
        let size = self.size();
        for len in [send_counts.len(), send_displs.len(), recv_counts.len(), recv_displs.len()] {
            check_len(size, len)?;
        }
        let payloads = (0..size)
            .map(|r| segment(send, send_displs[r], send_counts[r]).map(<[u8]>::to_vec))
            .collect::<Result<Vec<_>>>()?;
        for (source, payload) in self.exchange(payloads)?.iter().enumerate() {
            place(recv, recv_displs[source], recv_counts[source], payload)?;
        }
        Ok(())
    }
}
