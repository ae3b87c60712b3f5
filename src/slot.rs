//! Input slot state machine.
//!
//! A slot is one form field that holds either pasted text or an uploaded
//! file. Uploading a file returns a [`PendingRead`] effect; the caller awaits
//! it and feeds the [`CompletedRead`] back through [`InputSlot::complete_read`].
//! Every upload or removal bumps the slot's generation, so a read that
//! finishes after a newer action is dropped.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;

/// Validator applied to slot text: returns an empty string on success,
/// otherwise the message to show.
pub type Validator = fn(&str) -> String;

/// Outcome of running a validator over slot text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotStatus {
    Valid,
    Invalid(String),
}

impl SlotStatus {
    /// Interpret a validator's return value.
    pub fn from_message(message: String) -> Self {
        if message.is_empty() {
            SlotStatus::Valid
        } else {
            SlotStatus::Invalid(message)
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            SlotStatus::Valid => None,
            SlotStatus::Invalid(message) => Some(message),
        }
    }
}

/// Byte source behind an uploaded file.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn read(&self) -> io::Result<Vec<u8>>;
}

/// A file on the local filesystem.
#[derive(Debug, Clone)]
pub struct PathSource(pub PathBuf);

#[async_trait]
impl FileSource for PathSource {
    async fn read(&self) -> io::Result<Vec<u8>> {
        tokio::fs::read(&self.0).await
    }
}

/// File contents already held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource(pub Vec<u8>);

#[async_trait]
impl FileSource for MemorySource {
    async fn read(&self) -> io::Result<Vec<u8>> {
        Ok(self.0.clone())
    }
}

/// A selected file: its display name and a lazy reader.
#[derive(Clone)]
pub struct FileRef {
    name: String,
    source: Arc<dyn FileSource>,
}

impl FileRef {
    pub fn new(name: impl Into<String>, source: Arc<dyn FileSource>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, Arc::new(PathSource(path.to_path_buf())))
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(name, Arc::new(MemorySource(bytes.into())))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn read_bytes(&self) -> io::Result<Vec<u8>> {
        self.source.read().await
    }

    pub async fn read_text(&self) -> io::Result<String> {
        let bytes = self.read_bytes().await?;
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

impl fmt::Debug for FileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRef").field("name", &self.name).finish()
    }
}

impl PartialEq for FileRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && Arc::ptr_eq(&self.source, &other.source)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPhase {
    Loading,
    Done,
}

/// State of a single input slot. Exactly one shape is active.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotState {
    Text {
        content: String,
        status: Option<SlotStatus>,
    },
    File {
        file: FileRef,
        phase: ReadPhase,
        content: String,
        status: Option<SlotStatus>,
    },
}

impl Default for SlotState {
    fn default() -> Self {
        SlotState::Text {
            content: String::new(),
            status: None,
        }
    }
}

#[derive(Clone)]
pub enum SlotAction {
    ChangeText {
        content: String,
        validator: Option<Validator>,
    },
    UploadFile(FileRef),
    RemoveFile,
}

impl fmt::Debug for SlotAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotAction::ChangeText { content, validator } => f
                .debug_struct("ChangeText")
                .field("content", content)
                .field("validated", &validator.is_some())
                .finish(),
            SlotAction::UploadFile(file) => f.debug_tuple("UploadFile").field(file).finish(),
            SlotAction::RemoveFile => f.write_str("RemoveFile"),
        }
    }
}

impl SlotAction {
    /// Action for a file picker selection: the first file, or removal when
    /// nothing was selected.
    pub fn from_selection(files: impl IntoIterator<Item = FileRef>) -> Self {
        match files.into_iter().next() {
            Some(file) => SlotAction::UploadFile(file),
            None => SlotAction::RemoveFile,
        }
    }
}

impl SlotState {
    /// Pure transition function.
    pub fn reduce(self, action: SlotAction) -> SlotState {
        match (self, action) {
            (SlotState::Text { .. }, SlotAction::ChangeText { content, validator }) => {
                let status = validator.map(|v| SlotStatus::from_message(v(&content)));
                SlotState::Text { content, status }
            }
            (SlotState::File { file, .. }, SlotAction::ChangeText { content, validator }) => {
                let status = validator.map(|v| SlotStatus::from_message(v(&content)));
                SlotState::File {
                    file,
                    phase: ReadPhase::Done,
                    content,
                    status,
                }
            }
            (_, SlotAction::UploadFile(file)) => SlotState::File {
                file,
                phase: ReadPhase::Loading,
                content: String::new(),
                status: None,
            },
            (SlotState::File { .. }, SlotAction::RemoveFile) => SlotState::default(),
            (state @ SlotState::Text { .. }, SlotAction::RemoveFile) => state,
        }
    }

    pub fn content(&self) -> &str {
        match self {
            SlotState::Text { content, .. } | SlotState::File { content, .. } => content,
        }
    }

    pub fn status(&self) -> Option<&SlotStatus> {
        match self {
            SlotState::Text { status, .. } | SlotState::File { status, .. } => status.as_ref(),
        }
    }

    pub fn file(&self) -> Option<&FileRef> {
        match self {
            SlotState::File { file, .. } => Some(file),
            SlotState::Text { .. } => None,
        }
    }
}

/// Read to perform after entering the loading phase.
#[derive(Debug)]
pub struct PendingRead {
    generation: u64,
    file: FileRef,
}

impl PendingRead {
    pub fn file(&self) -> &FileRef {
        &self.file
    }

    pub async fn run(self) -> CompletedRead {
        let result = self.file.read_text().await.map_err(|e| e.to_string());
        CompletedRead {
            generation: self.generation,
            result,
        }
    }
}

/// Result of a [`PendingRead`], tagged with the generation it was issued at.
#[derive(Debug, Clone)]
pub struct CompletedRead {
    generation: u64,
    result: Result<String, String>,
}

/// Prefix of the status shown when a file can't be read.
pub const FILE_READ_ERROR: &str = "Failed to read file";

/// A slot with its configured validator and read generation.
#[derive(Clone, Default)]
pub struct InputSlot {
    state: SlotState,
    validator: Option<Validator>,
    generation: u64,
}

impl fmt::Debug for InputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputSlot")
            .field("state", &self.state)
            .field("validated", &self.validator.is_some())
            .field("generation", &self.generation)
            .finish()
    }
}

impl InputSlot {
    pub fn new(validator: Option<Validator>) -> Self {
        Self {
            state: SlotState::default(),
            validator,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SlotState {
        &self.state
    }

    pub fn validator(&self) -> Option<Validator> {
        self.validator
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply an action. Returns the file read to schedule, if any.
    pub fn dispatch(&mut self, action: SlotAction) -> Option<PendingRead> {
        let upload = match &action {
            SlotAction::UploadFile(file) => Some(file.clone()),
            _ => None,
        };
        if matches!(action, SlotAction::UploadFile(_) | SlotAction::RemoveFile) {
            self.generation += 1;
        }

        self.state = std::mem::take(&mut self.state).reduce(action);

        upload.map(|file| PendingRead {
            generation: self.generation,
            file,
        })
    }

    /// Edit the text using the slot's configured validator.
    pub fn change_text(&mut self, content: impl Into<String>) {
        self.dispatch(SlotAction::ChangeText {
            content: content.into(),
            validator: self.validator,
        });
    }

    /// Apply a finished read. Returns false if the read was stale.
    pub fn complete_read(&mut self, read: CompletedRead) -> bool {
        let loading = matches!(
            self.state,
            SlotState::File {
                phase: ReadPhase::Loading,
                ..
            }
        );
        if read.generation != self.generation || !loading {
            tracing::warn!(
                read_generation = read.generation,
                current_generation = self.generation,
                "discarding stale file read"
            );
            return false;
        }

        match read.result {
            Ok(content) => {
                self.dispatch(SlotAction::ChangeText {
                    content,
                    validator: self.validator,
                });
            }
            Err(message) => {
                if let SlotState::File { file, .. } = std::mem::take(&mut self.state) {
                    self.state = SlotState::File {
                        file,
                        phase: ReadPhase::Done,
                        content: String::new(),
                        status: Some(SlotStatus::Invalid(format!(
                            "{}: {}",
                            FILE_READ_ERROR, message
                        ))),
                    };
                }
            }
        }
        true
    }

    /// Re-issue the read for a slot restored mid-load.
    pub fn resume_read(&mut self) -> Option<PendingRead> {
        match &self.state {
            SlotState::File {
                file,
                phase: ReadPhase::Loading,
                ..
            } => {
                self.generation += 1;
                Some(PendingRead {
                    generation: self.generation,
                    file: file.clone(),
                })
            }
            _ => None,
        }
    }

    /// Take over from `previous`, numbering reads after both slots' histories
    /// so nothing issued by either can complete against this one.
    pub fn supersede(&mut self, previous: &InputSlot) {
        self.generation = self.generation.max(previous.generation) + 1;
    }

    /// Return to the empty text state, invalidating any in-flight read.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.state = SlotState::default();
    }

    pub fn text(&self) -> &str {
        self.state.content()
    }

    pub fn status(&self) -> Option<&SlotStatus> {
        self.state.status()
    }

    pub fn error(&self) -> Option<&str> {
        self.status().and_then(SlotStatus::error)
    }

    pub fn is_loading(&self) -> bool {
        matches!(
            self.state,
            SlotState::File {
                phase: ReadPhase::Loading,
                ..
            }
        )
    }

    /// Label for the file picker: the selected file's name, else `default`.
    pub fn file_label<'a>(&'a self, default: &'a str) -> &'a str {
        self.state.file().map(FileRef::name).unwrap_or(default)
    }

    /// The paired text field is editable only without an uploaded file.
    pub fn text_field_enabled(&self) -> bool {
        matches!(self.state, SlotState::Text { .. })
    }

    /// True when the slot holds non-empty text its validator accepted.
    pub fn has_valid_text(&self) -> bool {
        !self.text().is_empty() && self.error().is_none()
    }
}
