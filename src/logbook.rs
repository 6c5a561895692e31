/// Hourly append-only sighting log.
///
/// `LogWriter` turns a sighting into an NDJSON line and hands it to a
/// `LogSink` together with the hour-bucket file name derived from the gating
/// time sample. Every append opens, writes and closes the file; nothing is
/// buffered and nothing is retried. A failed append drops the record.
use crate::error::LogError;
use crate::filter::ExposurePayload;
use crate::gps::{PositionSample, TimeSample};
use crate::record::{log_file_name, serialize_record, LogRecord, RecordBuffer};

/// Storage the records go to.
pub trait LogSink {
    /// Append `line` (newline included) to `file`, creating it if needed.
    /// Must not return before the data is durable.
    fn append(&mut self, file: &str, line: &[u8]) -> Result<(), LogError>;
}

impl<S: LogSink + ?Sized> LogSink for &mut S {
    fn append(&mut self, file: &str, line: &[u8]) -> Result<(), LogError> {
        (**self).append(file, line)
    }
}

/// Serializes sightings and appends them to the right hourly file.
pub struct LogWriter<S> {
    sink: S,
    written: u32,
    dropped: u32,
}

impl<S: LogSink> LogWriter<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            written: 0,
            dropped: 0,
        }
    }

    /// Persist one sighting. `time` must already have passed the freshness
    /// gate. Returns the line that was written.
    pub fn write(
        &mut self,
        payload: &ExposurePayload,
        time: &TimeSample,
        position: Option<&PositionSample>,
    ) -> Result<RecordBuffer, LogError> {
        let result = self.try_write(payload, time, position);
        match result {
            Ok(_) => self.written += 1,
            Err(_) => self.dropped += 1,
        }
        result
    }

    fn try_write(
        &mut self,
        payload: &ExposurePayload,
        time: &TimeSample,
        position: Option<&PositionSample>,
    ) -> Result<RecordBuffer, LogError> {
        let file = log_file_name(time).ok_or(LogError::InvalidTime)?;
        let record = LogRecord::new(payload, time, position);
        let line = serialize_record(&record).ok_or(LogError::Serialize)?;
        self.sink.append(&file, &line)?;
        Ok(line)
    }

    /// Records appended successfully since boot.
    pub fn written(&self) -> u32 {
        self.written
    }

    /// Records dropped since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }
}

#[cfg(feature = "std")]
pub use fs::FsSink;

#[cfg(feature = "std")]
mod fs {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::path::PathBuf;
    use std::string::ToString;

    use super::LogSink;
    use crate::error::LogError;

    /// Appends to files under a directory (the SD card mount on the device).
    pub struct FsSink {
        root: PathBuf,
    }

    impl FsSink {
        pub fn new(root: impl Into<PathBuf>) -> Self {
            Self { root: root.into() }
        }
    }

    impl LogSink for FsSink {
        fn append(&mut self, file: &str, line: &[u8]) -> Result<(), LogError> {
            let path = self.root.join(file.trim_start_matches('/'));
            let name = || heapless::String::try_from(file).unwrap_or_default();

            let mut f = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| LogError::Open {
                    file: name(),
                    reason: e.to_string(),
                })?;
            f.write_all(line)
                .and_then(|_| f.sync_all())
                .map_err(|e| LogError::Write {
                    file: name(),
                    reason: e.to_string(),
                })
        }
    }
}
