//! HTTP-to-text pipeline task: streaming fetch -> HTML strip -> file write.
//!
//! The pipeline is internal to the task: each step pulls one chunk from the
//! response body, pushes it through the HTML stripper, and appends the
//! extracted text to the output file. The scheduler only ever sees the
//! outer step interface.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Map, Value};

use super::fs_ops::string_arg;
use super::{Step, Task};

const CHUNK_SIZE: usize = 8192;

/// Fetches a URL and writes its visible text content to a file, one body
/// chunk per step.
pub struct FetchToTextFile {
    url: String,
    path: PathBuf,
    transfer: Option<Transfer>,
}

/// Resources held between steps while a transfer is in flight.
struct Transfer {
    response: reqwest::blocking::Response,
    stripper: HtmlStripper,
    out: BufWriter<File>,
}

impl FetchToTextFile {
    pub fn build(args: &[Value], _kwargs: &Map<String, Value>) -> Result<Box<dyn Task>> {
        let url = string_arg(args, 0, "url")?;
        let path = string_arg(args, 1, "path")?;
        Ok(Box::new(Self {
            url,
            path: path.into(),
            transfer: None,
        }))
    }
}

impl Task for FetchToTextFile {
    fn step(&mut self) -> Result<Step> {
        // First step: open the connection and the output file.
        let Some(transfer) = self.transfer.as_mut() else {
            let response = reqwest::blocking::get(&self.url)
                .and_then(|r| r.error_for_status())
                .with_context(|| format!("failed to fetch {}", self.url))?;
            let file = File::create(&self.path)
                .with_context(|| format!("failed to create {}", self.path.display()))?;
            self.transfer = Some(Transfer {
                response,
                stripper: HtmlStripper::new(),
                out: BufWriter::new(file),
            });
            return Ok(Step::Yielded(Some(format!("fetching {}", self.url))));
        };

        // Subsequent steps: one chunk through the pipeline.
        let mut buf = [0u8; CHUNK_SIZE];
        let read = transfer
            .response
            .read(&mut buf)
            .with_context(|| format!("failed to read body of {}", self.url))?;

        if read == 0 {
            transfer.out.flush()?;
            self.transfer = None;
            return Ok(Step::Done(Some(format!(
                "wrote text content of {} to {}",
                self.url,
                self.path.display()
            ))));
        }

        // A chunk boundary can split a multi-byte sequence; decode lossily.
        let chunk = String::from_utf8_lossy(&buf[..read]);
        let text = transfer.stripper.feed(&chunk);
        if !text.is_empty() {
            transfer.out.write_all(text.as_bytes())?;
        }
        Ok(Step::Yielded(None))
    }

    fn close(&mut self) {
        if let Some(mut transfer) = self.transfer.take() {
            tracing::debug!(url = %self.url, "closing in-flight transfer");
            let _ = transfer.out.flush();
        }
    }
}

// ---------------------------------------------------------------------------
// HTML stripping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StripState {
    Text,
    Tag,
    Entity,
}

/// Incremental HTML-to-text converter.
///
/// Feed it arbitrary chunk boundaries; it carries tag, entity, and
/// script/style state across calls. Tag markup is dropped, the contents of
/// `<script>` and `<style>` elements are skipped, common entities are
/// decoded, and runs of whitespace collapse to a single space.
pub struct HtmlStripper {
    state: StripState,
    tag: String,
    entity: String,
    skipping: Option<&'static str>,
    last_was_space: bool,
}

impl HtmlStripper {
    pub fn new() -> Self {
        Self {
            state: StripState::Text,
            tag: String::new(),
            entity: String::new(),
            skipping: None,
            last_was_space: true,
        }
    }

    /// Process one chunk and return the text it contributed.
    pub fn feed(&mut self, chunk: &str) -> String {
        let mut out = String::new();
        for c in chunk.chars() {
            match self.state {
                StripState::Text => match c {
                    '<' => {
                        self.tag.clear();
                        self.state = StripState::Tag;
                    }
                    '&' if self.skipping.is_none() => {
                        self.entity.clear();
                        self.state = StripState::Entity;
                    }
                    _ if self.skipping.is_some() => {}
                    _ => self.emit(c, &mut out),
                },
                StripState::Tag => {
                    if c == '>' {
                        self.finish_tag();
                        self.state = StripState::Text;
                    } else {
                        self.tag.push(c);
                    }
                }
                StripState::Entity => {
                    if c == ';' {
                        if let Some(decoded) = decode_entity(&self.entity) {
                            self.emit(decoded, &mut out);
                        }
                        self.state = StripState::Text;
                    } else if (c.is_ascii_alphanumeric() || c == '#') && self.entity.len() <= 8 {
                        self.entity.push(c);
                    } else {
                        // Not an entity after all; emit what we swallowed
                        // and reprocess the current character.
                        self.emit('&', &mut out);
                        for e in std::mem::take(&mut self.entity).chars() {
                            self.emit(e, &mut out);
                        }
                        match c {
                            '<' => {
                                self.tag.clear();
                                self.state = StripState::Tag;
                            }
                            '&' => {
                                self.entity.clear();
                            }
                            _ => {
                                self.state = StripState::Text;
                                self.emit(c, &mut out);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    fn emit(&mut self, c: char, out: &mut String) {
        if c.is_whitespace() {
            if !self.last_was_space {
                out.push(' ');
                self.last_was_space = true;
            }
        } else {
            out.push(c);
            self.last_was_space = false;
        }
    }

    /// Update the script/style skip state from a completed tag.
    fn finish_tag(&mut self) {
        let tag = std::mem::take(&mut self.tag);
        let body = tag.trim();
        let (closing, name_part) = match body.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let name: String = name_part
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();

        match self.skipping {
            None if !closing && (name == "script" || name == "style") => {
                self.skipping = Some(if name == "script" { "script" } else { "style" });
            }
            Some(current) if closing && name == current => {
                self.skipping = None;
            }
            _ => {}
        }
    }
}

impl Default for HtmlStripper {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a named or numeric character reference (without `&`/`;`).
fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = entity.strip_prefix('#')?;
            let value = match code.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => code.parse().ok()?,
            };
            char::from_u32(value)
        }
    }
}
