/// Type of a record's value, taken from the inner tag of the value octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// DER INTEGER.
    Integer,
    /// UTF8String.
    String,
    /// IA5String holding an RFC 3339 timestamp.
    Date,
    /// OCTET STRING, or value octets that are not a single TLV at all (the
    /// opaque value and SHA-1 hash are stored this way).
    Bytes,
    /// A nested container, used for in-app purchase entries.
    Set,
    /// A tag this decoder does not recognize. Kept for forward compatibility.
    Unknown(u8),
}

/// One decoded record of the receipt payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRecord {
    pub field_id: i64,
    pub version: i64,
    pub field_type: FieldType,
    /// The complete value octets as they appear in the container.
    pub raw_value: Vec<u8>,
    /// Byte offset of the record within the decoded payload.
    pub offset: usize,
    content_start: usize,
}

impl FieldRecord {
    pub(crate) fn new(
        field_id: i64,
        version: i64,
        field_type: FieldType,
        raw_value: Vec<u8>,
        offset: usize,
        content_start: usize,
    ) -> Self {
        Self {
            field_id,
            version,
            field_type,
            raw_value,
            offset,
            content_start,
        }
    }

    /// The typed content of the value, with the inner tag and length
    /// stripped. For opaque [`FieldType::Bytes`] values that were not
    /// wrapped in a TLV this is the whole value.
    pub fn content(&self) -> &[u8] {
        &self.raw_value[self.content_start..]
    }
}
