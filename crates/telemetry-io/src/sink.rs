use chrono::{DateTime, Local};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Destination for delimited log lines.
pub trait RecordSink: Send {
    fn write(&mut self, at: DateTime<Local>, line: &str) -> io::Result<()>;

    /// Flush and release the underlying resource. Writing again reopens it.
    fn close(&mut self) -> io::Result<()>;
}

impl RecordSink for Vec<String> {
    fn write(&mut self, _at: DateTime<Local>, line: &str) -> io::Result<()> {
        self.push(line.to_string());
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Append-only log with one file per local day under `<base>/<device>/`,
/// keeping the newest `keep_days` files.
#[derive(Debug)]
pub struct DailyFileWriter {
    dir: PathBuf,
    header: String,
    keep_days: usize,
    current: Option<(String, File)>,
}

impl DailyFileWriter {
    pub fn new(base_dir: impl AsRef<Path>, device: &str, header: &str, keep_days: usize) -> Self {
        Self {
            dir: base_dir.as_ref().join(device),
            header: header.to_string(),
            keep_days: keep_days.max(1),
            current: None,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, at: &DateTime<Local>) -> PathBuf {
        self.dir.join(format!("{}.log", at.format("%Y%m%d")))
    }

    fn file_for(&mut self, at: &DateTime<Local>) -> io::Result<&mut File> {
        let day = at.format("%Y%m%d").to_string();
        let stale = !matches!(&self.current, Some((d, _)) if *d == day);
        if stale {
            self.close()?;
            fs::create_dir_all(&self.dir)?;
            let path = self.path_for(at);
            let file = open_with_header(&path, &self.header)?;
            self.current = Some((day, file));
            self.prune();
        }
        match &mut self.current {
            Some((_, file)) => Ok(file),
            None => Err(io::Error::new(io::ErrorKind::Other, "log file not open")),
        }
    }

    fn prune(&self) {
        let mut logs: Vec<PathBuf> = match fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.extension().map_or(false, |ext| ext == "log"))
                .collect(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot list log directory");
                return;
            }
        };
        if logs.len() <= self.keep_days {
            return;
        }
        logs.sort();
        let excess = logs.len() - self.keep_days;
        for path in &logs[..excess] {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "cannot prune old log");
            }
        }
    }
}

impl RecordSink for DailyFileWriter {
    fn write(&mut self, at: DateTime<Local>, line: &str) -> io::Result<()> {
        let file = self.file_for(&at)?;
        writeln!(file, "{line}")?;
        file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some((_, mut file)) = self.current.take() {
            file.flush()?;
        }
        Ok(())
    }
}

/// One file, truncated and given its header when the sink is created.
#[derive(Debug)]
pub struct SingleFileSink {
    path: PathBuf,
    file: Option<File>,
}

impl SingleFileSink {
    pub fn create(path: impl Into<PathBuf>, header: &str) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut file = File::create(&path)?;
        writeln!(file, "{header}")?;
        file.flush()?;
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSink for SingleFileSink {
    fn write(&mut self, _at: DateTime<Local>, line: &str) -> io::Result<()> {
        let file = match &mut self.file {
            Some(file) => file,
            slot => slot.insert(OpenOptions::new().append(true).open(&self.path)?),
        };
        writeln!(file, "{line}")?;
        file.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        Ok(())
    }
}

fn open_with_header(path: &Path, header: &str) -> io::Result<File> {
    let fresh = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if fresh {
        writeln!(file, "{header}")?;
        file.flush()?;
    }
    Ok(file)
}
