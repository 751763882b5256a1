use super::filter::{Packets, PidFilter};
use super::packet::TSPacket;
use super::types::*;
use crate::config::ReaderConfig;
use crate::error::{Result, TsError};
use std::fmt;
use std::io::{self, Read, Write};

/// Reads TS packets from, and writes them to, a byte stream.
///
/// Reading needs the source to implement [`Read`] and writing needs
/// [`Write`]; a value without the capability is rejected when the reader is
/// built. Paths are not streams: open files with
/// [`TSFileReader`](super::file::TSFileReader).
///
/// ```compile_fail
/// use tsreader::format::ts::TSReader;
///
/// let reader = TSReader::new("capture.ts");
/// ```
///
/// The reader counts the packets that pass through it and stamps each
/// packet read with its index and byte offset. The counts are only accurate
/// if nothing else moves the stream position.
///
/// ```
/// use std::io::Cursor;
/// use tsreader::format::ts::TSReader;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut data = vec![0x47, 0x1f, 0xff, 0x10];
/// data.extend_from_slice(&[0xff; 184]);
///
/// let mut reader = TSReader::new(Cursor::new(data));
/// let packet = reader.read()?.expect("one packet");
/// assert_eq!(packet.index(), Some(0));
/// assert_eq!(packet.offset(), Some(0));
/// assert!(reader.read()?.is_none());
/// # Ok(())
/// # }
/// ```
pub struct TSReader<S> {
    source: Option<S>,
    config: ReaderConfig,
    label: String,
    packet_count: u64,
    /// Start of a packet whose read was cut short by an I/O error
    pending: Vec<u8>,
}

/// A byte stream TS packets can be read from.
///
/// Implemented for every [`Read`] type. File paths are not sources.
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a byte stream TS packets can be read from",
    label = "not a readable stream",
    note = "to read a file by path, open it with `TSFileReader::open(path, \"r\")`"
)]
pub trait PacketSource: Read {}

impl<R: Read + ?Sized> PacketSource for R {}

impl<S: PacketSource> TSReader<S> {
    /// Creates a reader over `source` with the default configuration.
    pub fn new(source: S) -> Self {
        Self::with_config(source, ReaderConfig::default())
    }

    /// Reads the next packet.
    ///
    /// Returns `Ok(None)` at a clean end of stream. A stream that ends part
    /// way through a packet gives [`TsError::ShortRead`]. A buffer that is
    /// not a TS packet gives [`TsError::Format`]; its 188 bytes have been
    /// consumed and counted, so the next call reads the following slot.
    ///
    /// An I/O error part way through a packet gives [`TsError::Io`]. The
    /// bytes already read are kept and the next call completes the same
    /// packet, so numbering stays aligned with the stream.
    pub fn read(&mut self) -> Result<Option<TSPacket>> {
        let mut buf = std::mem::take(&mut self.pending);
        let mut n = buf.len();
        buf.resize(TS_PACKET_SIZE, 0);
        let result = match self.source.as_mut() {
            Some(source) => read_full(source, &mut buf, &mut n),
            None => return Err(TsError::Closed(self.to_string())),
        };
        if let Err(err) = result {
            if n > 0 {
                buf.truncate(n);
                self.pending = buf;
                log::warn!(
                    "{}: read failed with {} bytes of packet {} pending: {}",
                    self,
                    n,
                    self.packet_count,
                    err
                );
            }
            return Err(err.into());
        }

        if n == 0 {
            log::debug!("{}: end of stream after {} packets", self, self.packet_count);
            return Ok(None);
        }
        if n < TS_PACKET_SIZE {
            log::warn!("{}: stream ends with a {} byte partial packet", self, n);
            return Err(TsError::ShortRead {
                stream: self.to_string(),
                read: n,
            });
        }

        let index = self.packet_count;
        let offset = self.offset_of(index);
        self.packet_count += 1;

        let packet = TSPacket::with_mode(buf, self.config.validating)?.with_position(index, offset);
        log::trace!("{}: packet {} PID {:#06x} at {}", self, index, packet.pid(), offset);
        Ok(Some(packet))
    }

    /// Iterates over the remaining packets.
    ///
    /// The iterator is lazy and forward only; dropping it early leaves the
    /// reader positioned after the last packet it yielded.
    pub fn packets(&mut self) -> Packets<'_, S> {
        Packets::new(self)
    }

    /// Iterates over the remaining packets whose PID is in `pids`.
    ///
    /// Index and offset are those of the unfiltered stream.
    pub fn pid_filter<I>(&mut self, pids: I) -> PidFilter<'_, S>
    where
        I: IntoIterator<Item = u16>,
    {
        PidFilter::new(self.packets(), pids)
    }
}

impl<S: Write> TSReader<S> {
    /// Creates a reader that will only be written to.
    pub fn writer(sink: S) -> Self {
        Self::with_config(sink, ReaderConfig::default())
    }

    /// Writes one packet and counts it.
    pub fn write(&mut self, packet: &TSPacket) -> Result<()> {
        match self.source.as_mut() {
            Some(sink) => sink.write_all(packet.data())?,
            None => return Err(TsError::Closed(self.to_string())),
        }
        log::trace!(
            "{}: wrote packet {} PID {:#06x}",
            self,
            self.packet_count,
            packet.pid()
        );
        self.packet_count += 1;
        Ok(())
    }

    /// Flushes the underlying sink.
    pub fn flush(&mut self) -> Result<()> {
        match self.source.as_mut() {
            Some(sink) => Ok(sink.flush()?),
            None => Err(TsError::Closed(self.to_string())),
        }
    }
}

impl<S> TSReader<S> {
    /// Creates a reader with an explicit configuration.
    ///
    /// No capability is required here; which of `read` and `write` are
    /// available follows from what `S` implements.
    pub fn with_config(source: S, config: ReaderConfig) -> Self {
        let label = config
            .label
            .clone()
            .unwrap_or_else(|| std::any::type_name::<S>().to_string());
        log::debug!("TS reader for {} opened", label);
        Self {
            source: Some(source),
            packet_count: config.initial_count,
            config,
            label,
            pending: Vec::new(),
        }
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = label;
    }

    /// The configuration the reader was built with.
    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    /// Sets the mode of packets read from now on.
    pub fn set_validating(&mut self, validating: bool) {
        self.config.validating = validating;
    }

    /// Index the next packet will get.
    pub fn packet_count(&self) -> u64 {
        self.packet_count
    }

    /// Byte offset the next packet will get.
    pub fn position(&self) -> u64 {
        self.offset_of(self.packet_count)
    }

    fn offset_of(&self, index: u64) -> u64 {
        self.config.initial_offset
            + (index.saturating_sub(self.config.initial_count)) * TS_PACKET_SIZE as u64
    }

    /// Bytes of a partially read packet waiting for the next [`read`].
    ///
    /// [`read`]: TSReader::read
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    /// True once [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Closes the reader, dropping the source. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.pending.clear();
        if self.source.take().is_some() {
            log::debug!("TS reader for {} closed after {} packets", self.label, self.packet_count);
        }
    }

    /// Replaces the source of a closed reader and restarts counting.
    pub(crate) fn reopen(&mut self, source: S) {
        self.source = Some(source);
        self.pending.clear();
        self.packet_count = self.config.initial_count;
        log::debug!("TS reader for {} reopened", self.label);
    }

    /// The source, unless the reader is closed.
    pub fn get_ref(&self) -> Option<&S> {
        self.source.as_ref()
    }

    /// Consumes the reader, returning the source if still open.
    pub fn into_inner(self) -> Option<S> {
        self.source
    }
}

impl<S> fmt::Display for TSReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TS reader for {}", self.label)?;
        if self.is_closed() {
            write!(f, ", closed")?;
        }
        Ok(())
    }
}

impl<S> fmt::Debug for TSReader<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TSReader")
            .field("label", &self.label)
            .field("closed", &self.is_closed())
            .field("packet_count", &self.packet_count)
            .field("pending", &self.pending.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Reads until `buf` is full or the source is exhausted, starting at
/// `filled` and leaving it at the number of bytes in `buf`, even on error.
fn read_full<R: Read + ?Sized>(
    source: &mut R,
    buf: &mut [u8],
    filled: &mut usize,
) -> io::Result<()> {
    while *filled < buf.len() {
        match source.read(&mut buf[*filled..]) {
            Ok(0) => break,
            Ok(n) => *filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FormatError;
    use crate::format::ts::types::PacketFields;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn stream(pids: &[u16]) -> Vec<u8> {
        let mut data = Vec::new();
        for (i, &pid) in pids.iter().enumerate() {
            let fields = PacketFields::new(pid, vec![i as u8; 184])
                .with_continuity_counter((i % 16) as u8);
            data.extend_from_slice(TSPacket::from_fields(&fields).unwrap().data());
        }
        data
    }

    /// Hands out at most `chunk` bytes per read and interrupts every other call.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        interrupt: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.interrupt = !self.interrupt;
            if self.interrupt {
                return Err(io::Error::new(io::ErrorKind::Interrupted, "again"));
            }
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_sequential_indices() {
        let mut reader = TSReader::new(Cursor::new(stream(&[0x100, 0x101, 0x102])));
        for expected in 0..3u64 {
            let packet = reader.read().unwrap().unwrap();
            assert_eq!(packet.index(), Some(expected));
            assert_eq!(packet.offset(), Some(expected * 188));
        }
        assert!(reader.read().unwrap().is_none());
        assert!(reader.read().unwrap().is_none());
        assert_eq!(reader.packet_count(), 3);
    }

    #[test]
    fn test_partial_reads_are_reassembled() {
        let source = Trickle {
            data: Cursor::new(stream(&[0x100, 0x200])),
            chunk: 50,
            interrupt: false,
        };
        let mut reader = TSReader::new(source);
        assert_eq!(reader.read().unwrap().unwrap().pid(), 0x100);
        assert_eq!(reader.read().unwrap().unwrap().pid(), 0x200);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_short_read() {
        let mut data = stream(&[0x100]);
        data.extend_from_slice(&[0x47, 0x00]);
        let config = ReaderConfig::new().with_label("truncated.ts");
        let mut reader = TSReader::with_config(Cursor::new(data), config);

        reader.read().unwrap().unwrap();
        match reader.read() {
            Err(TsError::ShortRead { stream, read }) => {
                assert_eq!(stream, "TS reader for truncated.ts");
                assert_eq!(read, 2);
            }
            other => panic!("expected short read, got {:?}", other),
        }
    }

    #[test]
    fn test_bad_sync_consumes_slot() {
        let mut data = stream(&[0x100, 0x101]);
        data[0] = 0x00;
        let mut reader = TSReader::new(Cursor::new(data));

        match reader.read() {
            Err(TsError::Format(FormatError::WrongSyncByte { actual })) => assert_eq!(actual, 0),
            other => panic!("expected sync error, got {:?}", other),
        }
        let packet = reader.read().unwrap().unwrap();
        assert_eq!(packet.pid(), 0x101);
        assert_eq!(packet.index(), Some(1));
    }

    #[test]
    fn test_validating_config_reaches_packets() {
        let config = ReaderConfig::new().with_validating(true);
        let mut reader = TSReader::with_config(Cursor::new(stream(&[0x100])), config);
        assert!(reader.read().unwrap().unwrap().is_validating());
    }

    #[test]
    fn test_initial_offset_and_count() {
        let config = ReaderConfig::new()
            .with_initial_offset(1880)
            .with_initial_count(10);
        let mut reader = TSReader::with_config(Cursor::new(stream(&[1, 2])), config);
        assert_eq!(reader.position(), 1880);

        let first = reader.read().unwrap().unwrap();
        let second = reader.read().unwrap().unwrap();
        assert_eq!((first.index(), first.offset()), (Some(10), Some(1880)));
        assert_eq!((second.index(), second.offset()), (Some(11), Some(2068)));
    }

    #[test]
    fn test_close() {
        let config = ReaderConfig::new().with_label("memory");
        let mut reader = TSReader::with_config(Cursor::new(stream(&[0x100])), config);
        assert_eq!(reader.to_string(), "TS reader for memory");

        reader.close();
        reader.close();
        assert!(reader.is_closed());
        assert_eq!(reader.to_string(), "TS reader for memory, closed");
        match reader.read() {
            Err(TsError::Closed(description)) => {
                assert_eq!(description, "TS reader for memory, closed")
            }
            other => panic!("expected closed error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_label_is_type_name() {
        let reader = TSReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.to_string().contains("Cursor"));
    }

    #[test]
    fn test_write_then_read_back() {
        let packets: Vec<TSPacket> = TSReader::new(Cursor::new(stream(&[0x30, 0x31])))
            .packets()
            .collect::<Result<_>>()
            .unwrap();

        let mut writer = TSReader::writer(Vec::<u8>::new());
        for packet in &packets {
            writer.write(packet).unwrap();
        }
        writer.flush().unwrap();
        assert_eq!(writer.packet_count(), 2);

        let written = writer.into_inner().unwrap();
        assert_eq!(written, stream(&[0x30, 0x31]));
    }

    #[test]
    fn test_write_after_close() {
        let packet = TSPacket::from_fields(&PacketFields::default()).unwrap();
        let mut writer = TSReader::writer(Vec::<u8>::new());
        writer.close();
        assert!(matches!(writer.write(&packet), Err(TsError::Closed(_))));
    }

    /// Hands out at most `chunk` bytes per read and fails once, on call
    /// number `fail_on`.
    struct Flaky {
        data: Cursor<Vec<u8>>,
        chunk: usize,
        calls: usize,
        fail_on: usize,
    }

    impl Flaky {
        fn new(pids: &[u16], chunk: usize, fail_on: usize) -> Self {
            Self {
                data: Cursor::new(stream(pids)),
                chunk,
                calls: 0,
                fail_on,
            }
        }
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.calls += 1;
            if self.calls == self.fail_on {
                return Err(io::Error::new(io::ErrorKind::Other, "blip"));
            }
            let n = buf.len().min(self.chunk);
            self.data.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_io_error_mid_packet_keeps_alignment() {
        // 100 + 88 bytes for the first packet, then the error after 100
        // bytes of the second
        let mut reader = TSReader::new(Flaky::new(&[0x100, 0x101, 0x102], 100, 4));

        let first = reader.read().unwrap().unwrap();
        assert_eq!((first.pid(), first.index()), (0x100, Some(0)));

        match reader.read() {
            Err(TsError::Io(err)) => assert_eq!(err.to_string(), "blip"),
            other => panic!("expected io error, got {:?}", other),
        }
        assert_eq!(reader.pending_bytes(), 100);
        assert_eq!(reader.packet_count(), 1);

        let second = reader.read().unwrap().unwrap();
        assert_eq!(
            (second.pid(), second.index(), second.offset()),
            (0x101, Some(1), Some(188))
        );
        assert_eq!(reader.pending_bytes(), 0);

        let third = reader.read().unwrap().unwrap();
        assert_eq!((third.pid(), third.index()), (0x102, Some(2)));
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_io_error_between_packets() {
        let mut reader = TSReader::new(Flaky::new(&[0x100, 0x101], 100, 3));
        assert_eq!(reader.read().unwrap().unwrap().pid(), 0x100);
        assert!(matches!(reader.read(), Err(TsError::Io(_))));
        assert_eq!(reader.pending_bytes(), 0);

        let next = reader.read().unwrap().unwrap();
        assert_eq!((next.pid(), next.index()), (0x101, Some(1)));
    }

    #[test]
    fn test_close_drops_pending_bytes() {
        let mut reader = TSReader::new(Flaky::new(&[0x100], 100, 2));
        assert!(reader.read().is_err());
        assert_eq!(reader.pending_bytes(), 100);

        reader.close();
        assert_eq!(reader.pending_bytes(), 0);
    }
}
