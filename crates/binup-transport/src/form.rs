//! Multipart body assembly
//!
//! Turns the extra fields and the file of an [`UploadRequest`] into an ordered
//! list of parts, then into a `reqwest` multipart form. Keeping the part list
//! around before conversion lets callers (and tests) see exactly what goes on
//! the wire.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::types::{FieldValue, UploadRequest};

/// One part of the multipart body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormPart {
    /// `name=value` text part
    Text { name: String, value: String },
    /// Binary part without a filename
    Bytes { name: String, data: Bytes },
    /// Binary part with a filename
    File {
        name: String,
        filename: String,
        data: Bytes,
        content_type: Option<String>,
    },
}

impl FormPart {
    pub fn name(&self) -> &str {
        match self {
            Self::Text { name, .. } | Self::Bytes { name, .. } | Self::File { name, .. } => name,
        }
    }
}

/// Ordered multipart body for one upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    parts: Vec<FormPart>,
}

impl MultipartBody {
    /// Build the body for a request.
    ///
    /// Extra fields come first in their given order; fields of an unsupported
    /// shape are dropped. The file is always the last part.
    pub fn from_request(request: &UploadRequest) -> Self {
        let mut parts: Vec<FormPart> = request
            .data
            .iter()
            .filter_map(|(name, value)| field_part(name, value))
            .collect();

        parts.push(FormPart::File {
            name: request.file_field.clone(),
            filename: request.file.name.clone(),
            data: request.file.data.clone(),
            content_type: request.file.content_type.clone(),
        });

        Self { parts }
    }

    pub fn parts(&self) -> &[FormPart] {
        &self.parts
    }

    /// Total payload size, excluding multipart framing
    pub fn payload_len(&self) -> usize {
        self.parts
            .iter()
            .map(|part| match part {
                FormPart::Text { value, .. } => value.len(),
                FormPart::Bytes { data, .. } | FormPart::File { data, .. } => data.len(),
            })
            .sum()
    }

    /// Convert into a `reqwest` form. Fails only on an unparsable MIME type.
    pub fn into_form(self) -> reqwest::Result<Form> {
        let mut form = Form::new();
        for part in self.parts {
            form = match part {
                FormPart::Text { name, value } => form.text(name, value),
                FormPart::Bytes { name, data } => form.part(name, bytes_part(data)),
                FormPart::File {
                    name,
                    filename,
                    data,
                    content_type,
                } => {
                    let mut part = bytes_part(data).file_name(filename);
                    if let Some(mime) = content_type {
                        part = part.mime_str(&mime)?;
                    }
                    form.part(name, part)
                }
            };
        }
        Ok(form)
    }
}

fn bytes_part(data: Bytes) -> Part {
    let len = data.len() as u64;
    Part::stream_with_length(data, len)
}

fn field_part(name: &str, value: &FieldValue) -> Option<FormPart> {
    match value {
        FieldValue::Text(text) => Some(FormPart::Text {
            name: name.to_string(),
            value: text.clone(),
        }),
        FieldValue::Blob(data) => Some(FormPart::Bytes {
            name: name.to_string(),
            data: data.clone(),
        }),
        FieldValue::NamedBlob { data, filename } => Some(FormPart::File {
            name: name.to_string(),
            filename: filename.clone(),
            data: data.clone(),
            content_type: None,
        }),
        FieldValue::Unsupported(_) => None,
    }
}
