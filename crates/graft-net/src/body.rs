//! Request body encoding
//!
//! Form payloads encode as application/x-www-form-urlencoded, or as
//! multipart/form-data when any file attachment is present.

/// Form payload: ordered name/value entries
#[derive(Debug, Clone, Default)]
pub struct FormPayload {
    entries: Vec<(String, FormValue)>,
}

/// One form value
#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    File {
        filename: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

/// An encoded request body
#[derive(Debug, Clone)]
pub struct RequestBody {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a text entry
    pub fn append(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.to_string(), FormValue::Text(value.to_string())));
    }

    /// Append a file entry
    pub fn append_file(&mut self, name: &str, filename: &str, content_type: &str, bytes: Vec<u8>) {
        self.entries.push((
            name.to_string(),
            FormValue::File {
                filename: filename.to_string(),
                content_type: content_type.to_string(),
                bytes,
            },
        ));
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[(String, FormValue)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Any file entry forces multipart encoding
    pub fn needs_multipart(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, v)| matches!(v, FormValue::File { .. }))
    }

    /// Encode text entries as a query string (file entries are skipped)
    pub fn to_query_string(&self) -> String {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        for (name, value) in &self.entries {
            if let FormValue::Text(text) = value {
                serializer.append_pair(name, text);
            }
        }
        serializer.finish()
    }

    /// Encode as the appropriate body for a non-GET request
    pub fn to_body(&self) -> RequestBody {
        if self.needs_multipart() {
            let (content_type, bytes) = self.to_multipart();
            RequestBody { content_type, bytes }
        } else {
            RequestBody {
                content_type: "application/x-www-form-urlencoded".to_string(),
                bytes: self.to_query_string().into_bytes(),
            }
        }
    }

    /// Encode as multipart/form-data
    pub fn to_multipart(&self) -> (String, Vec<u8>) {
        let boundary = format!("----GraftFormBoundary{:x}", boundary_seed());
        let mut body = Vec::new();

        for (name, value) in &self.entries {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            match value {
                FormValue::Text(text) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(text.as_bytes());
                }
                FormValue::File {
                    filename,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                             Content-Type: {content_type}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        let content_type = format!("multipart/form-data; boundary={boundary}");
        (content_type, body)
    }
}

fn boundary_seed() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0x67726166)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_encoding() {
        let mut form = FormPayload::new();
        form.append("q", "a b&c");
        form.append("page", "2");
        assert_eq!(form.to_query_string(), "q=a+b%26c&page=2");
    }

    #[test]
    fn test_urlencoded_body() {
        let mut form = FormPayload::new();
        form.append("name", "value");
        let body = form.to_body();
        assert_eq!(body.content_type, "application/x-www-form-urlencoded");
        assert_eq!(body.bytes, b"name=value");
    }

    #[test]
    fn test_multipart_when_file_present() {
        let mut form = FormPayload::new();
        form.append("note", "hello");
        form.append_file("upload", "a.txt", "text/plain", b"data".to_vec());
        assert!(form.needs_multipart());

        let body = form.to_body();
        assert!(body.content_type.starts_with("multipart/form-data; boundary="));
        let text = String::from_utf8_lossy(&body.bytes);
        assert!(text.contains("name=\"note\""));
        assert!(text.contains("filename=\"a.txt\""));
        assert!(text.contains("Content-Type: text/plain"));
    }
}
