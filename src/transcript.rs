use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;

/// Receives the record of completed exchanges and session events.
///
/// Called from the gateway worker only, so calls never overlap in practice,
/// but implementations must still be shareable across threads.
pub trait TranscriptSink: Send + Sync {
    fn log_conversation(&self, user_text: &str, assistant_text: &str, model: &str, tokens: u64) -> io::Result<()>;

    fn log_event(&self, message: &str) -> io::Result<()>;
}

/// Appends a human-readable transcript to a single file
pub struct ChatLogger {
    path: PathBuf,
    file: Mutex<File>,
}

pub const SESSION_SEPARATOR: &str = "---------------------------------------";

impl ChatLogger {
    /// 打开（或创建）日志文件并写入会话标题
    ///
    /// 标题格式：`********************* New Session dd.MM.yyyy hh:mm:ss *********************`
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;

        let stamp = Local::now().format("%d.%m.%Y %H:%M:%S");
        writeln!(file, "********************* New Session {} *********************", stamp)?;
        file.flush()?;

        tracing::debug!(path = %path.display(), "Transcript opened");
        Ok(Self { path, file: Mutex::new(file) })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, text: &str) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("transcript lock poisoned"))?;
        file.write_all(text.as_bytes())?;
        file.flush()
    }
}

impl TranscriptSink for ChatLogger {
    fn log_conversation(&self, user_text: &str, assistant_text: &str, model: &str, tokens: u64) -> io::Result<()> {
        self.append(&format!(
            "* User:\n{}\n\n* Advisor ({}):\n{}\n\n* Total used tokens:\n{}\n{}\n",
            user_text, model, assistant_text, tokens, SESSION_SEPARATOR
        ))
    }

    fn log_event(&self, message: &str) -> io::Result<()> {
        self.append(&format!("\n{}\n\n", message))
    }
}

/// Sink that drops everything, for front-ends that keep no transcript
pub struct NullTranscript;

impl TranscriptSink for NullTranscript {
    fn log_conversation(&self, _: &str, _: &str, _: &str, _: u64) -> io::Result<()> {
        Ok(())
    }

    fn log_event(&self, _: &str) -> io::Result<()> {
        Ok(())
    }
}
