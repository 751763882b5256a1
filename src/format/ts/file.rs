use super::filter::{Packets, PidFilter};
use super::packet::TSPacket;
use super::reader::TSReader;
use crate::config::ReaderConfig;
use crate::error::{Result, TsError};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How a [`TSFileReader`] opens its file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileMode {
    /// `"r"`: read only, the file must exist
    Read,
    /// `"w"`: read and write, created if missing and truncated if not
    Write,
    /// `"x"`: read and write, the file must not exist yet
    Create,
}

impl FileMode {
    /// The mode string this mode is parsed from.
    pub fn as_str(&self) -> &'static str {
        match self {
            FileMode::Read => "r",
            FileMode::Write => "w",
            FileMode::Create => "x",
        }
    }

    /// What the mode allows, as shown in reader descriptions.
    pub fn explanation(&self) -> &'static str {
        match self {
            FileMode::Read => "read only",
            FileMode::Write => "read and write",
            FileMode::Create => "read and write (new file)",
        }
    }

    /// True for the modes that allow writing packets.
    pub fn is_writable(&self) -> bool {
        *self != FileMode::Read
    }

    fn open_options(&self) -> OpenOptions {
        let mut options = OpenOptions::new();
        match self {
            FileMode::Read => {
                options.read(true);
            }
            FileMode::Write => {
                options.read(true).write(true).create(true).truncate(true);
            }
            FileMode::Create => {
                options.read(true).write(true).create_new(true);
            }
        }
        options
    }
}

impl FromStr for FileMode {
    type Err = TsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "r" => Ok(FileMode::Read),
            "w" => Ok(FileMode::Write),
            "x" => Ok(FileMode::Create),
            other => Err(TsError::Usage(format!(
                "mode {:?} is not 'r', 'w' or 'x'",
                other
            ))),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A [`TSReader`] over a file it opens and owns.
///
/// The file is closed by [`close`](Self::close) or when the reader is
/// dropped. [`TSFileReader::with_file`] and [`scoped`](Self::scoped) bound
/// the file's lifetime to a closure.
///
/// ```no_run
/// use tsreader::format::ts::TSFileReader;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let video_packets = TSFileReader::with_file("capture.ts", "r", |reader| {
///     let mut count = 0;
///     for packet in reader.pid_filter([0x100]) {
///         packet?;
///         count += 1;
///     }
///     Ok(count)
/// })?;
/// println!("{} video packets", video_packets);
/// # Ok(())
/// # }
/// ```
pub struct TSFileReader {
    path: PathBuf,
    mode: FileMode,
    reader: TSReader<File>,
}

impl TSFileReader {
    /// Opens `path` in `mode` (`"r"`, `"w"` or `"x"`).
    pub fn open<P: AsRef<Path>>(path: P, mode: &str) -> Result<Self> {
        Self::open_with_config(path, mode.parse()?, ReaderConfig::default())
    }

    /// Opens `path` in `mode` with an explicit reader configuration.
    pub fn open_with_config<P: AsRef<Path>>(
        path: P,
        mode: FileMode,
        config: ReaderConfig,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = mode.open_options().open(&path)?;
        log::debug!("opened {:?} for {}", path, mode.explanation());

        let mut reader = TSReader::with_config(file, config);
        reader.set_label(format!("{:?}", path));
        Ok(Self { path, mode, reader })
    }

    /// Opens `path`, runs `f` and closes the file however `f` exits.
    pub fn with_file<P, T, F>(path: P, mode: &str, f: F) -> Result<T>
    where
        P: AsRef<Path>,
        F: FnOnce(&mut TSFileReader) -> Result<T>,
    {
        let mut reader = Self::open(path, mode)?;
        reader.scoped(f)
    }

    /// Runs `f` with the file open, reopening it first if it was closed,
    /// and closes it afterwards whether `f` succeeds, fails or panics.
    ///
    /// Reopening restarts packet counting. For mode `"w"` it truncates the
    /// file again, and for mode `"x"` it fails because the file now exists.
    pub fn scoped<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut TSFileReader) -> Result<T>,
    {
        if self.reader.is_closed() {
            let file = self.mode.open_options().open(&self.path)?;
            self.reader.reopen(file);
        }

        let guard = CloseGuard { reader: self };
        f(&mut *guard.reader)
    }

    /// The path the reader was opened with.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mode the file was opened in.
    pub fn mode(&self) -> FileMode {
        self.mode
    }

    /// Reads the next packet. See [`TSReader::read`].
    pub fn read(&mut self) -> Result<Option<TSPacket>> {
        self.reader.read()
    }

    /// Writes a packet. Fails with a usage error for mode `"r"`.
    pub fn write(&mut self, packet: &TSPacket) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(TsError::Usage(format!("{} cannot be written to", self)));
        }
        self.reader.write(packet)
    }

    /// Flushes written packets to the file.
    pub fn flush(&mut self) -> Result<()> {
        self.reader.flush()
    }

    /// Iterates over the remaining packets.
    pub fn packets(&mut self) -> Packets<'_, File> {
        self.reader.packets()
    }

    /// Iterates over the remaining packets whose PID is in `pids`.
    pub fn pid_filter<I>(&mut self, pids: I) -> PidFilter<'_, File>
    where
        I: IntoIterator<Item = u16>,
    {
        self.reader.pid_filter(pids)
    }

    /// Index the next packet will get.
    pub fn packet_count(&self) -> u64 {
        self.reader.packet_count()
    }

    /// Sets the mode of packets read from now on.
    pub fn set_validating(&mut self, validating: bool) {
        self.reader.set_validating(validating);
    }

    /// True once the file has been closed.
    pub fn is_closed(&self) -> bool {
        self.reader.is_closed()
    }

    /// Closes the file. Closing twice is a no-op.
    pub fn close(&mut self) {
        self.reader.close();
    }
}

impl fmt::Display for TSFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reader.is_closed() {
            write!(f, "TS reader for {:?}, closed", self.path)
        } else {
            write!(
                f,
                "TS reader for {:?}, open for {}",
                self.path,
                self.mode.explanation()
            )
        }
    }
}

impl fmt::Debug for TSFileReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TSFileReader")
            .field("path", &self.path)
            .field("mode", &self.mode)
            .field("reader", &self.reader)
            .finish()
    }
}

/// Closes the reader when dropped, including during unwinding.
struct CloseGuard<'a> {
    reader: &'a mut TSFileReader,
}

impl Drop for CloseGuard<'_> {
    fn drop(&mut self) {
        self.reader.close();
    }
}
