use std::fmt;

use bytes::{Bytes, BytesMut};
use futures_util::TryStreamExt;
use serde::de::DeserializeOwned;

use crate::stream::{self, PayloadStream};

const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const URLENCODED_FORM: &str = "application/x-www-form-urlencoded";

/// The content of an object, as returned from a read.
///
/// This carries the response as a stream, plus the content type reported for it. Every consuming
/// method reads the stream to its end; to read the content again, open a new reader.
pub struct Body {
    content_type: Option<String>,
    stream: PayloadStream,
}

impl Body {
    pub(crate) fn new(content_type: Option<String>, stream: PayloadStream) -> Self {
        Self {
            content_type,
            stream,
        }
    }

    pub(crate) fn from_response(response: reqwest::Response, content_type: Option<String>) -> Self {
        let content_type = content_type.or_else(|| {
            response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(String::from)
        });

        Self::new(content_type, stream::forward(response))
    }

    pub(crate) fn empty(content_type: Option<String>) -> Self {
        Self::new(content_type, stream::empty())
    }

    /// The MIME type of the content, if known.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// Returns the underlying stream of chunks.
    pub fn into_stream(self) -> PayloadStream {
        self.stream
    }

    /// Loads the content fully into memory.
    pub async fn bytes(self) -> crate::Result<Bytes> {
        let bytes: BytesMut = self.stream.try_collect().await?;
        Ok(bytes.freeze())
    }

    /// Loads the content fully into an owned buffer.
    pub async fn buffer(self) -> crate::Result<Vec<u8>> {
        Ok(self.bytes().await?.to_vec())
    }

    /// Loads the content fully into memory and interprets it as UTF-8 text.
    pub async fn text(self) -> crate::Result<String> {
        let bytes = self.bytes().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Loads the content fully into memory and deserializes it from JSON.
    pub async fn json<T: DeserializeOwned>(self) -> crate::Result<T> {
        let bytes = self.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Loads the content fully into a [`Blob`] that remembers its content type.
    pub async fn blob(self) -> crate::Result<Blob> {
        let content_type = self.content_type.clone();
        let data = self.bytes().await?;
        Ok(Blob { content_type, data })
    }

    /// Parses the content as form data.
    ///
    /// Both `multipart/form-data` and `application/x-www-form-urlencoded` content is supported.
    /// The content type decides which format is parsed.
    pub async fn form_data(self) -> crate::Result<FormData> {
        let content_type = self.content_type.clone().unwrap_or_default();
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if mime == MULTIPART_FORM_DATA {
            let boundary = multer::parse_boundary(&content_type)?;
            let mut multipart = multer::Multipart::new(self.stream, boundary);

            let mut fields = Vec::new();
            while let Some(field) = multipart.next_field().await? {
                let name = field.name().unwrap_or_default().to_owned();
                let file_name = field.file_name().map(String::from);
                let content_type = field.content_type().map(ToString::to_string);
                let value = field.bytes().await?;
                fields.push(FormField {
                    name,
                    file_name,
                    content_type,
                    value,
                });
            }
            return Ok(FormData { fields });
        }

        if mime == URLENCODED_FORM {
            let bytes = self.bytes().await?;
            let fields = url::form_urlencoded::parse(&bytes)
                .map(|(name, value)| FormField {
                    name: name.into_owned(),
                    file_name: None,
                    content_type: None,
                    value: Bytes::from(value.into_owned()),
                })
                .collect();
            return Ok(FormData { fields });
        }

        Err(crate::Error::Unsupported {
            message: format!("cannot read content of type {content_type:?} as form data"),
        })
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Body")
            .field("content_type", &self.content_type)
            .field("stream", &format_args!("[Stream]"))
            .finish()
    }
}

/// Content loaded into memory together with its content type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Blob {
    content_type: Option<String>,
    data: Bytes,
}

impl Blob {
    /// The MIME type of the content, if known.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The size of the content in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// The content.
    pub fn bytes(&self) -> &Bytes {
        &self.data
    }

    /// Consumes the blob, returning the content.
    pub fn into_bytes(self) -> Bytes {
        self.data
    }
}

/// A single field of [`FormData`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormField {
    /// The field name.
    pub name: String,
    /// The file name, for file uploads.
    pub file_name: Option<String>,
    /// The content type of the field, if declared.
    pub content_type: Option<String>,
    /// The raw field value.
    pub value: Bytes,
}

impl FormField {
    /// Returns the value as text if it is valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.value).ok()
    }
}

/// Fields parsed from form-encoded content, in their original order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FormData {
    fields: Vec<FormField>,
}

impl FormData {
    /// Returns the first field with the given name.
    pub fn get(&self, name: &str) -> Option<&FormField> {
        self.fields.iter().find(|field| field.name == name)
    }

    /// Returns all fields with the given name.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a FormField> + 'a {
        self.fields.iter().filter(move |field| field.name == name)
    }

    /// Iterates over all fields.
    pub fn iter(&self) -> impl Iterator<Item = &FormField> {
        self.fields.iter()
    }

    /// The number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if there are no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;

    use super::*;

    fn body(content_type: &str, contents: &'static [u8]) -> Body {
        let stream = tokio_stream::once(Ok(Bytes::from_static(contents))).boxed();
        Body::new(Some(content_type.to_owned()), stream)
    }

    #[tokio::test]
    async fn parses_urlencoded_form() {
        let form = body("application/x-www-form-urlencoded", b"a=1&b=hello+world")
            .form_data()
            .await
            .unwrap();

        assert_eq!(form.len(), 2);
        assert_eq!(form.get("a").and_then(FormField::as_str), Some("1"));
        assert_eq!(form.get("b").and_then(FormField::as_str), Some("hello world"));
    }

    #[tokio::test]
    async fn parses_multipart_form() {
        let content = b"--XYZ\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            report\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            contents\r\n\
            --XYZ--\r\n";

        let form = body("multipart/form-data; boundary=XYZ", content)
            .form_data()
            .await
            .unwrap();

        assert_eq!(form.get("title").and_then(FormField::as_str), Some("report"));
        let file = form.get("file").unwrap();
        assert_eq!(file.file_name.as_deref(), Some("a.txt"));
        assert_eq!(file.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.value, Bytes::from_static(b"contents"));
    }

    #[tokio::test]
    async fn rejects_other_content_as_form() {
        let result = body("text/plain", b"a=1").form_data().await;
        assert!(matches!(result, Err(crate::Error::Unsupported { .. })));
    }

    #[tokio::test]
    async fn blob_keeps_content_type() {
        let blob = body("image/png", b"\x89PNG").blob().await.unwrap();
        assert_eq!(blob.content_type(), Some("image/png"));
        assert_eq!(blob.size(), 4);
    }
}
