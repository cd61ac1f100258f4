use crate::Error;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};

/// A file uploaded alongside a generation request.
#[derive(Debug, Clone)]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: None,
            bytes: bytes.into(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Lower-cased extension of the file name, if any.
    pub fn extension(&self) -> Option<String> {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
    }

    pub fn to_part(&self) -> Result<Part, Error> {
        let part = Part::stream_with_length(self.bytes.clone(), self.bytes.len() as u64)
            .file_name(self.file_name.clone());
        match &self.mime_type {
            Some(mime) => part
                .mime_str(mime)
                .map_err(|e| Error::validation(format!("invalid MIME type '{mime}': {e}"))),
            None => Ok(part),
        }
    }
}

/// Append a text field only when it has content.
pub(crate) fn text_if_present(form: Form, name: &'static str, value: &str) -> Form {
    let value = value.trim();
    if value.is_empty() {
        form
    } else {
        form.text(name, value.to_string())
    }
}

/// Fail with a validation error when a required text field is blank.
pub(crate) fn require(value: &str, message: &str) -> Result<(), Error> {
    if value.trim().is_empty() {
        Err(Error::validation(message))
    } else {
        Ok(())
    }
}
