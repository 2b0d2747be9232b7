use bytes::{Bytes, BytesMut};
use common_multipart_rfc7578::client::multipart::{Body, Form};
use futures::TryStreamExt;
use std::io::Cursor;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
enum FileSource {
    Memory(Bytes),
    Disk(PathBuf),
}

#[derive(Debug, Clone)]
enum PartBody {
    Text(String),
    File {
        file_name: String,
        mime: mime::Mime,
        source: FileSource,
    },
}

#[derive(Debug, Clone)]
struct Part {
    name: String,
    body: PartBody,
}

/// A rendered form: the body and the `Content-Type` that names its boundary.
#[derive(Debug, Clone)]
pub struct EncodedForm {
    pub content_type: String,
    pub body: Bytes,
}

/// A `multipart/form-data` body under construction.
///
/// File parts are read when the form is encoded, right before the upload
/// starts, so building a form never touches the file system.
#[derive(Debug, Clone, Default)]
pub struct MultipartFormData {
    parts: Vec<Part>,
}

impl MultipartFormData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Plain text field.
    #[must_use]
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::Text(value.into()),
        });
        self
    }

    /// In-memory file part.
    #[must_use]
    pub fn bytes(
        mut self,
        name: impl Into<String>,
        data: impl Into<Bytes>,
        file_name: impl Into<String>,
        mime: mime::Mime,
    ) -> Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::File {
                file_name: file_name.into(),
                mime,
                source: FileSource::Memory(data.into()),
            },
        });
        self
    }

    /// File part read from disk; file name and MIME type come from the path.
    #[must_use]
    pub fn file(mut self, name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        let mime = mime_for_path(&path);
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::File {
                file_name,
                mime,
                source: FileSource::Disk(path),
            },
        });
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Render the full body, reading file parts from disk.
    ///
    /// # Errors
    /// Returns the I/O error of the first file part that cannot be read.
    pub async fn encode(&self) -> Result<EncodedForm, std::io::Error> {
        let mut form = Form::default();
        for part in &self.parts {
            let name = escape_quoted(&part.name);
            match &part.body {
                PartBody::Text(value) => form.add_text(name, value.clone()),
                PartBody::File {
                    file_name,
                    mime,
                    source,
                } => {
                    let data = match source {
                        FileSource::Memory(data) => data.clone(),
                        FileSource::Disk(path) => Bytes::from(tokio::fs::read(path).await?),
                    };
                    form.add_reader_file_with_mime(
                        name,
                        Cursor::new(data),
                        escape_quoted(file_name),
                        mime.clone(),
                    );
                }
            }
        }

        let content_type = form.content_type();
        let body = Body::from(form)
            .map_err(std::io::Error::other)
            .try_fold(BytesMut::new(), |mut body, chunk| async move {
                body.extend_from_slice(&chunk);
                Ok::<_, std::io::Error>(body)
            })
            .await?;
        Ok(EncodedForm {
            content_type,
            body: body.freeze(),
        })
    }
}

fn escape_quoted(value: &str) -> String {
    value
        .replace(['\r', '\n'], "")
        .replace('"', "%22")
}

fn mime_for_path(path: &Path) -> mime::Mime {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => mime::APPLICATION_JSON,
        Some("txt") => mime::TEXT_PLAIN,
        Some("html" | "htm") => mime::TEXT_HTML,
        Some("csv") => mime::TEXT_CSV,
        Some("xml") => mime::TEXT_XML,
        Some("png") => mime::IMAGE_PNG,
        Some("jpg" | "jpeg") => mime::IMAGE_JPEG,
        Some("gif") => mime::IMAGE_GIF,
        Some("pdf") => mime::APPLICATION_PDF,
        _ => mime::APPLICATION_OCTET_STREAM,
    }
}
