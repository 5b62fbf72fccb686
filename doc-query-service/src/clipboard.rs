use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClipboardError {
    #[error("no clipboard program available (tried pbcopy, wl-copy, xclip, xsel)")]
    Unavailable,

    #[error("clipboard program `{program}` failed: {message}")]
    Failed { program: String, message: String },
}

pub trait Clipboard: Send + Sync {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// Writes through whichever platform clipboard program is installed.
#[derive(Debug, Default)]
pub struct SystemClipboard;

const CANDIDATES: &[(&str, &[&str])] = &[
    ("pbcopy", &[]),
    ("wl-copy", &[]),
    ("xclip", &["-selection", "clipboard"]),
    ("xsel", &["--clipboard", "--input"]),
];

impl Clipboard for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut last_failure = None;

        for (program, args) in CANDIDATES {
            let mut child = match Command::new(program)
                .args(*args)
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .spawn()
            {
                Ok(child) => child,
                Err(_) => continue,
            };

            if let Some(stdin) = child.stdin.as_mut() {
                if let Err(e) = stdin.write_all(text.as_bytes()) {
                    last_failure = Some(ClipboardError::Failed {
                        program: program.to_string(),
                        message: e.to_string(),
                    });
                    let _ = child.wait();
                    continue;
                }
            }
            // close stdin so the program sees EOF
            drop(child.stdin.take());

            match child.wait() {
                Ok(status) if status.success() => return Ok(()),
                Ok(status) => {
                    last_failure = Some(ClipboardError::Failed {
                        program: program.to_string(),
                        message: status.to_string(),
                    })
                }
                Err(e) => {
                    last_failure = Some(ClipboardError::Failed {
                        program: program.to_string(),
                        message: e.to_string(),
                    })
                }
            }
        }

        Err(last_failure.unwrap_or(ClipboardError::Unavailable))
    }
}

/// In-process clipboard holding the last written text.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().ok().and_then(|g| g.clone())
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut guard = self.contents.lock().map_err(|e| ClipboardError::Failed {
            program: "memory".to_string(),
            message: e.to_string(),
        })?;
        *guard = Some(text.to_string());
        Ok(())
    }
}
