use super::packet::TSPacket;
use super::reader::TSReader;
use crate::error::{Result, TsError};
use std::collections::HashSet;
use std::io::Read;

/// Iterator over the packets remaining in a [`TSReader`].
///
/// Ends at the first clean end of stream. Format errors are yielded in
/// place and iteration may continue past them. An I/O error or a closed
/// reader is yielded once and ends the iteration; the reader itself can
/// still be asked to [`read`](TSReader::read) again.
pub struct Packets<'a, S> {
    reader: &'a mut TSReader<S>,
    done: bool,
}

impl<'a, S: Read> Packets<'a, S> {
    pub(crate) fn new(reader: &'a mut TSReader<S>) -> Self {
        Self {
            reader,
            done: false,
        }
    }
}

impl<'a, S: Read> Iterator for Packets<'a, S> {
    type Item = Result<TSPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.reader.read() {
            Ok(Some(packet)) => Some(Ok(packet)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                // Format errors consume their slot and the stream goes on.
                // A closed reader or a failing source ends the sequence.
                if self.reader.is_closed() || matches!(err, TsError::Io(_)) {
                    self.done = true;
                }
                Some(Err(err))
            }
        }
    }
}

/// Packets whose PID is in a given set, in stream order.
///
/// Filtering never renumbers: each packet keeps the index and offset it had
/// in the full stream. Errors from the underlying reader are passed through.
pub struct PidFilter<'a, S> {
    packets: Packets<'a, S>,
    pids: HashSet<u16>,
}

impl<'a, S: Read> PidFilter<'a, S> {
    /// Filters `packets` down to those whose PID is in `pids`.
    pub fn new<I>(packets: Packets<'a, S>, pids: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        let pids: HashSet<u16> = pids.into_iter().collect();
        log::debug!("filtering for PIDs {:?}", pids);
        Self { packets, pids }
    }

    /// The PIDs let through.
    pub fn pids(&self) -> &HashSet<u16> {
        &self.pids
    }
}

impl<'a, S: Read> Iterator for PidFilter<'a, S> {
    type Item = Result<TSPacket>;

    fn next(&mut self) -> Option<Self::Item> {
        for item in self.packets.by_ref() {
            match item {
                Ok(packet) if !self.pids.contains(&packet.pid()) => continue,
                other => return Some(other),
            }
        }
        None
    }
}
