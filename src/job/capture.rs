//! Reader side of command substitution.

use std::io::{PipeWriter, Read};
use std::thread::JoinHandle;

/// Drains a pipe into memory on its own thread while the job runs, so a
/// producer never blocks on a full pipe buffer.
#[derive(Debug)]
pub struct Capture {
    reader: JoinHandle<std::io::Result<Vec<u8>>>,
}

impl Capture {
    /// Start the reader; the returned writer becomes the last stage's stdout.
    pub fn start() -> std::io::Result<(Capture, PipeWriter)> {
        let (mut read, write) = std::io::pipe()?;
        let reader = std::thread::Builder::new()
            .name("capture".into())
            .spawn(move || {
                let mut buf = Vec::new();
                read.read_to_end(&mut buf)?;
                Ok(buf)
            })?;
        Ok((Capture { reader }, write))
    }

    /// Wait for every writer to close and return what was read.
    pub fn finish(self) -> String {
        match self.reader.join() {
            Ok(Ok(buf)) => String::from_utf8_lossy(&buf).into_owned(),
            Ok(Err(e)) => {
                log::warn!("capture read failed: {e}");
                String::new()
            }
            Err(_) => {
                log::warn!("capture reader panicked");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn collects_everything_written() {
        let (capture, mut writer) = Capture::start().unwrap();
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world\n").unwrap();
        drop(writer);
        assert_eq!(capture.finish(), "hello world\n");
    }

    #[test]
    fn larger_than_pipe_buffer() {
        let (capture, mut writer) = Capture::start().unwrap();
        let chunk = vec![b'x'; 1 << 20];
        writer.write_all(&chunk).unwrap();
        drop(writer);
        assert_eq!(capture.finish().len(), 1 << 20);
    }
}
