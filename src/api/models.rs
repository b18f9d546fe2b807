/// Header metadata of a portal download response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub content_length: u64,
    /// Media type without parameters, e.g. `application/x-tar`
    pub content_type: String,
    /// From `Content-Disposition`, when the server sent one.
    pub file_name: Option<String>,
}
