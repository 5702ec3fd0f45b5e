//! Built-in filesystem tasks.
//!
//! The directory and file operations finish in a single step; the line
//! reader is a multi-step task that yields one line per scheduler turn.

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

use anyhow::{Result, bail};
use serde_json::{Map, Value};

use super::{Step, Task};

/// Extract a required string argument by position.
pub(crate) fn string_arg(args: &[Value], index: usize, name: &str) -> Result<String> {
    match args.get(index) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => bail!("argument {index} ({name}) must be a string, got {other}"),
        None => bail!("missing argument {index} ({name})"),
    }
}

// ---------------------------------------------------------------------------
// Directory operations
// ---------------------------------------------------------------------------

/// Creates a directory (and missing parents). Tolerates an existing one.
pub struct CreateDirectory {
    path: PathBuf,
}

impl CreateDirectory {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        Ok(Box::new(Self { path: path.into() }))
    }
}

impl Task for CreateDirectory {
    fn step(&mut self) -> Result<Step> {
        if self.path.is_dir() {
            return Ok(Step::Done(Some(format!(
                "directory exists at {}",
                self.path.display()
            ))));
        }
        fs::create_dir_all(&self.path)?;
        Ok(Step::Done(Some(format!(
            "directory created at {}",
            self.path.display()
        ))))
    }

    fn close(&mut self) {}
}

/// Deletes a directory tree. Tolerates a missing one.
pub struct DeleteDirectory {
    path: PathBuf,
}

impl DeleteDirectory {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        Ok(Box::new(Self { path: path.into() }))
    }
}

impl Task for DeleteDirectory {
    fn step(&mut self) -> Result<Step> {
        match fs::remove_dir_all(&self.path) {
            Ok(()) => Ok(Step::Done(Some(format!(
                "directory deleted at {}",
                self.path.display()
            )))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Step::Done(Some("directory not found".to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {}
}

// ---------------------------------------------------------------------------
// File operations
// ---------------------------------------------------------------------------

/// Creates (or truncates) an empty file.
pub struct CreateFile {
    path: PathBuf,
}

impl CreateFile {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        Ok(Box::new(Self { path: path.into() }))
    }
}

impl Task for CreateFile {
    fn step(&mut self) -> Result<Step> {
        File::create(&self.path)?;
        Ok(Step::Done(Some(format!(
            "file created at {}",
            self.path.display()
        ))))
    }

    fn close(&mut self) {}
}

/// Deletes a file. Tolerates a missing one.
pub struct DeleteFile {
    path: PathBuf,
}

impl DeleteFile {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        Ok(Box::new(Self { path: path.into() }))
    }
}

impl Task for DeleteFile {
    fn step(&mut self) -> Result<Step> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(Step::Done(Some(format!(
                "file deleted at {}",
                self.path.display()
            )))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Step::Done(Some("file not found".to_string())))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {}
}

/// Writes a string to a file in one step. I/O errors fail the attempt.
pub struct WriteToFile {
    path: PathBuf,
    content: String,
}

impl WriteToFile {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        let content = string_arg(args, 1, "content")?;
        Ok(Box::new(Self {
            path: path.into(),
            content,
        }))
    }
}

impl Task for WriteToFile {
    fn step(&mut self) -> Result<Step> {
        fs::write(&self.path, &self.content)?;
        Ok(Step::Done(Some(format!(
            "content written to {}",
            self.path.display()
        ))))
    }

    fn close(&mut self) {}
}

/// Reads a file line by line, yielding one line per step.
///
/// The file is opened lazily on the first step so a retry reopens it from
/// the start.
pub struct ReadFromFile {
    path: PathBuf,
    reader: Option<BufReader<File>>,
}

impl ReadFromFile {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let path = string_arg(args, 0, "path")?;
        Ok(Box::new(Self {
            path: path.into(),
            reader: None,
        }))
    }
}

impl Task for ReadFromFile {
    fn step(&mut self) -> Result<Step> {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => BufReader::new(File::open(&self.path)?),
        };

        let mut line = String::new();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            return Ok(Step::Done(None));
        }
        self.reader = Some(reader);
        Ok(Step::Yielded(Some(
            line.trim_end_matches(['\n', '\r']).to_string(),
        )))
    }

    fn close(&mut self) {
        self.reader = None;
    }
}
