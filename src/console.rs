use std::{
    io::{self, Write},
    sync::{Arc, Mutex, MutexGuard},
};

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Human-facing output. Lines from the reader task and from the probe steps
/// share one writer so blocks never interleave.
#[derive(Clone)]
pub struct Console {
    writer: SharedWriter,
}

impl Console {
    pub fn stdout() -> Self {
        Self::from_writer(io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// A console whose output is kept in memory.
    pub fn captured() -> (Self, CapturedOutput) {
        let output = CapturedOutput::default();
        (Self::from_writer(output.clone()), output)
    }

    pub fn line(&self, text: impl AsRef<str>) {
        self.block(std::iter::once(text.as_ref()));
    }

    pub fn block<'a>(&self, lines: impl IntoIterator<Item = &'a str>) {
        let mut writer = self.lock_writer();
        for line in lines {
            if let Err(err) = writeln!(writer, "{line}") {
                tracing::debug!(target: "console", error = %err, "console_write_failed");
                return;
            }
        }
        let _ = writer.flush();
    }

    fn lock_writer(&self) -> MutexGuard<'_, Box<dyn Write + Send>> {
        self.writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Clone, Default)]
pub struct CapturedOutput {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl CapturedOutput {
    pub fn contents(&self) -> String {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Write for CapturedOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
