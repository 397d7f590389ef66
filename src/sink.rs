use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

use crate::error::AppError;

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Append-only destination for trigger blocks.
pub trait LogSink: Send + Sync {
    /// Writes `lines` as one contiguous block; no other write through the same
    /// sink lands between the first and the last line.
    fn write_block(&self, lines: &[String]) -> io::Result<()>;
}

struct SinkInner {
    console: Box<dyn Write + Send>,
    file: File,
}

impl SinkInner {
    // both destinations are always attempted; the first error wins
    fn write_both(&mut self, buf: &[u8]) -> io::Result<()> {
        let console = self.console.write_all(buf);
        let file = self.file.write_all(buf);
        console.and(file)
    }

    fn flush_both(&mut self) -> io::Result<()> {
        let console = self.console.flush();
        let file = self.file.flush();
        console.and(file)
    }
}

/// Console plus log file behind one lock. Clones share the same destinations;
/// the file is closed when the last clone is dropped.
#[derive(Clone)]
pub struct DualSink {
    inner: Arc<Mutex<SinkInner>>,
    path: Arc<PathBuf>,
}

impl DualSink {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, AppError> {
        Self::with_console(io::stdout(), path)
    }

    pub fn with_console<W, P>(console: W, path: P) -> Result<Self, AppError>
    where
        W: Write + Send + 'static,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| AppError::Config(format!("open log file {}: {e}", path.display())))?;

        Ok(Self {
            inner: Arc::new(Mutex::new(SinkInner {
                console: Box::new(console),
                file,
            })),
            path: Arc::new(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for DualSink {
    fn write_block(&self, lines: &[String]) -> io::Result<()> {
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        let mut text = String::new();
        for line in lines {
            text.push_str(&stamp);
            text.push(' ');
            text.push_str(line);
            text.push('\n');
        }

        let mut inner = self.inner.lock();
        inner.write_both(text.as_bytes())?;
        inner.flush_both()
    }
}

// lets env_logger pipe records through the same lock as trigger blocks
impl Write for DualSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_both(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush_both()
    }
}

/// Routes the `log` facade into `sink`. Level comes from `RUST_LOG`, `info`
/// when unset.
pub fn init_logging(sink: &DualSink) -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(Box::new(sink.clone())))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}",
                Local::now().format(TIMESTAMP_FORMAT),
                record.level(),
                record.args()
            )
        })
        .try_init()
        .map_err(|e| AppError::Config(format!("logger init: {e}")))
}

/// Keeps blocks in memory, for tests and dry runs.
#[derive(Clone, Default)]
pub struct MemorySink {
    blocks: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MemorySink {
    pub fn blocks(&self) -> Vec<Vec<String>> {
        self.blocks.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn write_block(&self, lines: &[String]) -> io::Result<()> {
        self.blocks.lock().push(lines.to_vec());
        Ok(())
    }
}
