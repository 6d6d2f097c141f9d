use crate::errors::DecodeError;

pub(crate) const TAG_INTEGER: u8 = 0x02;
pub(crate) const TAG_OCTET_STRING: u8 = 0x04;
pub(crate) const TAG_OCTET_STRING_CONSTRUCTED: u8 = 0x24;
pub(crate) const TAG_OID: u8 = 0x06;
pub(crate) const TAG_UTF8_STRING: u8 = 0x0c;
pub(crate) const TAG_IA5_STRING: u8 = 0x16;
pub(crate) const TAG_SEQUENCE: u8 = 0x30;
pub(crate) const TAG_SET: u8 = 0x31;
pub(crate) const TAG_CONTEXT_0: u8 = 0xa0;

const CONSTRUCTED: u8 = 0x20;

/// Deepest nesting of indefinite-length elements [`DerReader::read_ber_tlv`]
/// follows. A receipt envelope uses five.
const MAX_INDEFINITE_DEPTH: usize = 16;

/// One tag-length-value element borrowed from the input.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tlv<'a> {
    pub(crate) tag: u8,
    /// Absolute offset of the tag byte.
    pub(crate) offset: usize,
    pub(crate) header_len: usize,
    /// Excludes the end-of-contents octets of an indefinite-length element.
    pub(crate) content: &'a [u8],
    pub(crate) indefinite: bool,
}

impl<'a> Tlv<'a> {
    pub(crate) fn content_offset(&self) -> usize {
        self.offset + self.header_len
    }

    /// Reader over this element's content. Overruns inside it are reported
    /// as [`DecodeError::BadLength`], since the element's own length already
    /// fit the input.
    pub(crate) fn reader(&self) -> DerReader<'a> {
        DerReader::nested(self.content, self.content_offset())
    }
}

/// Sequential DER reader. [`read_tlv`](Self::read_tlv) accepts definite
/// lengths only; [`read_ber_tlv`](Self::read_ber_tlv) also follows BER
/// indefinite lengths, which App Store receipts use for the PKCS#7 envelope.
///
/// The outermost reader (the whole input) reports overruns as
/// [`DecodeError::Truncated`]; readers over an element's content report them
/// as [`DecodeError::BadLength`].
pub(crate) struct DerReader<'a> {
    buf: &'a [u8],
    pos: usize,
    base: usize,
    outermost: bool,
}

impl<'a> DerReader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self {
            buf,
            pos: 0,
            base: 0,
            outermost: true,
        }
    }

    pub(crate) fn nested(buf: &'a [u8], base: usize) -> Self {
        Self {
            buf,
            pos: 0,
            base,
            outermost: false,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn offset(&self) -> usize {
        self.base + self.pos
    }

    fn remaining_from(&self, pos: usize) -> usize {
        self.buf.len().saturating_sub(pos)
    }

    fn overrun(&self, offset: usize, needed: usize, available: usize) -> DecodeError {
        if self.outermost {
            DecodeError::Truncated {
                offset,
                needed,
                available,
            }
        } else {
            DecodeError::BadLength {
                offset,
                reason: format!(
                    "{needed} bytes declared but the enclosing container has {available} left"
                ),
            }
        }
    }

    pub(crate) fn read_tlv(&mut self) -> Result<Tlv<'a>, DecodeError> {
        self.read(None)
    }

    /// Like [`read_tlv`](Self::read_tlv), but a constructed element may use
    /// an indefinite length terminated by `00 00`. Its children are read the
    /// same way.
    pub(crate) fn read_ber_tlv(&mut self) -> Result<Tlv<'a>, DecodeError> {
        self.read(Some(0))
    }

    /// `ber_depth` is `None` for strict DER, otherwise the number of
    /// indefinite-length elements already open around this one.
    fn read(&mut self, ber_depth: Option<usize>) -> Result<Tlv<'a>, DecodeError> {
        let start = self.pos;
        let offset = self.offset();

        let tag = match self.buf.get(start) {
            Some(tag) => *tag,
            None => return Err(self.overrun(offset, 1, 0)),
        };
        if tag & 0x1f == 0x1f {
            return Err(DecodeError::BadLength {
                offset,
                reason: "multi-byte tags are not supported".to_string(),
            });
        }

        let first = match self.buf.get(start + 1) {
            Some(first) => *first,
            None => return Err(self.overrun(offset, 2, self.remaining_from(start))),
        };

        let (len, header_len) = if first < 0x80 {
            (first as usize, 2)
        } else if first == 0x80 {
            return match ber_depth {
                None => Err(DecodeError::BadLength {
                    offset,
                    reason: "indefinite lengths are not supported here".to_string(),
                }),
                Some(_) if tag & CONSTRUCTED == 0 => Err(DecodeError::BadLength {
                    offset,
                    reason: format!("primitive element {tag:#04x} has an indefinite length"),
                }),
                Some(depth) if depth >= MAX_INDEFINITE_DEPTH => Err(DecodeError::BadLength {
                    offset,
                    reason: "indefinite lengths are nested too deeply".to_string(),
                }),
                Some(depth) => self.read_indefinite(start, tag, depth + 1),
            };
        } else {
            let count = (first & 0x7f) as usize;
            if count > std::mem::size_of::<usize>() || first == 0xff {
                return Err(DecodeError::BadLength {
                    offset,
                    reason: format!("length field of {count} bytes is too long"),
                });
            }
            let header_len = 2 + count;
            let bytes = match self.buf.get(start + 2..start + header_len) {
                Some(bytes) => bytes,
                None => {
                    return Err(self.overrun(offset, header_len, self.remaining_from(start)));
                }
            };
            let len = bytes
                .iter()
                .fold(0usize, |acc, b| (acc << 8) | *b as usize);
            (len, header_len)
        };

        let content_start = start + header_len;
        let available = self.remaining_from(content_start);
        if len > available {
            return Err(self.overrun(offset, len, available));
        }
        let content = &self.buf[content_start..content_start + len];
        self.pos = content_start + len;

        Ok(Tlv {
            tag,
            offset,
            header_len,
            content,
            indefinite: false,
        })
    }

    /// Reads children up to the end-of-contents marker. Running out of input
    /// before it is an overrun like any other.
    fn read_indefinite(
        &mut self,
        start: usize,
        tag: u8,
        depth: usize,
    ) -> Result<Tlv<'a>, DecodeError> {
        let content_start = start + 2;
        let mut children = DerReader {
            buf: &self.buf[content_start..],
            pos: 0,
            base: self.base + content_start,
            outermost: self.outermost,
        };
        while children.buf.get(children.pos..children.pos + 2) != Some(&[0, 0][..]) {
            children.read(Some(depth))?;
        }
        let len = children.pos;
        self.pos = content_start + len + 2;

        Ok(Tlv {
            tag,
            offset: self.base + start,
            header_len: 2,
            content: &self.buf[content_start..content_start + len],
            indefinite: true,
        })
    }

    /// Reads the next element and requires it to carry `tag`.
    pub(crate) fn expect(&mut self, tag: u8) -> Result<Tlv<'a>, DecodeError> {
        let tlv = self.read_tlv()?;
        if tlv.tag != tag {
            return Err(DecodeError::UnsupportedType {
                offset: tlv.offset,
                expected: tag,
                found: tlv.tag,
            });
        }
        Ok(tlv)
    }

    /// Fails if any bytes are left unread.
    pub(crate) fn finish(&self) -> Result<(), DecodeError> {
        if self.is_empty() {
            return Ok(());
        }
        Err(DecodeError::BadLength {
            offset: self.offset(),
            reason: format!(
                "{} trailing bytes after the declared length",
                self.remaining_from(self.pos)
            ),
        })
    }
}

/// Parses `buf` as exactly one element, or `None` if it is anything else.
pub(crate) fn single_tlv(buf: &[u8]) -> Option<Tlv<'_>> {
    let mut reader = DerReader::nested(buf, 0);
    let tlv = reader.read_tlv().ok()?;
    reader.is_empty().then_some(tlv)
}

/// Two's-complement big-endian integer of at most eight bytes.
pub(crate) fn decode_integer(content: &[u8]) -> Option<i64> {
    if content.is_empty() || content.len() > 8 {
        return None;
    }
    let seed: i64 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    Some(
        content
            .iter()
            .fold(seed, |acc, b| (acc << 8) | i64::from(*b)),
    )
}

pub(crate) fn read_integer(tlv: &Tlv<'_>) -> Result<i64, DecodeError> {
    decode_integer(tlv.content).ok_or_else(|| DecodeError::BadLength {
        offset: tlv.offset,
        reason: format!("integer of {} bytes is not representable", tlv.content.len()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_form_length() {
        let mut reader = DerReader::new(&[0x04, 0x02, 0xaa, 0xbb]);
        let tlv = reader.read_tlv().unwrap();
        assert_eq!(tlv.tag, TAG_OCTET_STRING);
        assert_eq!(tlv.header_len, 2);
        assert_eq!(tlv.content, &[0xaa, 0xbb]);
        assert!(reader.is_empty());
    }

    #[test]
    fn long_form_length() {
        let mut input = vec![0x04, 0x81, 0x80];
        input.extend(std::iter::repeat(0x55).take(0x80));
        let tlv = DerReader::new(&input).read_tlv().unwrap();
        assert_eq!(tlv.header_len, 3);
        assert_eq!(tlv.content.len(), 0x80);
    }

    #[test]
    fn outermost_overrun_is_truncated() {
        let err = DerReader::new(&[0x04, 0x05, 0x01]).read_tlv().unwrap_err();
        assert_eq!(
            err,
            DecodeError::Truncated {
                offset: 0,
                needed: 5,
                available: 1
            }
        );
    }

    #[test]
    fn nested_overrun_is_bad_length() {
        let err = DerReader::nested(&[0x04, 0x05, 0x01], 10)
            .read_tlv()
            .unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { offset: 10, .. }));
    }

    #[test]
    fn indefinite_length_is_rejected() {
        let err = DerReader::new(&[0x30, 0x80, 0x00, 0x00]).read_tlv().unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { .. }));
    }

    #[test]
    fn indefinite_length_is_followed_in_ber_mode() {
        // SEQUENCE (indefinite) { INTEGER 1, [0] (indefinite) { OCTET STRING "ab" } } 02 01 07
        let input = [
            0x30, 0x80, 0x02, 0x01, 0x01, 0xa0, 0x80, 0x04, 0x02, b'a', b'b', 0x00, 0x00, 0x00,
            0x00, 0x02, 0x01, 0x07,
        ];
        let mut reader = DerReader::new(&input);

        let outer = reader.read_ber_tlv().unwrap();
        assert!(outer.indefinite);
        assert_eq!(outer.tag, TAG_SEQUENCE);
        assert_eq!(outer.content, &input[2..13]);

        let mut children = outer.reader();
        assert_eq!(read_integer(&children.read_ber_tlv().unwrap()).unwrap(), 1);
        let explicit = children.read_ber_tlv().unwrap();
        assert_eq!(explicit.offset, 5);
        assert_eq!(explicit.reader().read_tlv().unwrap().content, b"ab");
        assert!(children.is_empty());

        assert_eq!(read_integer(&reader.read_tlv().unwrap()).unwrap(), 7);
        assert!(reader.is_empty());
    }

    #[test]
    fn missing_end_of_contents_is_truncated() {
        let err = DerReader::new(&[0x30, 0x80, 0x02, 0x01, 0x01, 0x00])
            .read_ber_tlv()
            .unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { .. }));
    }

    #[test]
    fn primitive_indefinite_length_is_bad_length() {
        let err = DerReader::new(&[0x04, 0x80, 0x00, 0x00])
            .read_ber_tlv()
            .unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { offset: 0, .. }));
    }

    #[test]
    fn deep_indefinite_nesting_is_refused() {
        let mut input = Vec::new();
        for _ in 0..64 {
            input.extend_from_slice(&[0x30, 0x80]);
        }
        input.extend(std::iter::repeat(0x00).take(128));
        let err = DerReader::new(&input).read_ber_tlv().unwrap_err();
        assert!(matches!(err, DecodeError::BadLength { .. }));
    }

    #[test]
    fn integers_are_sign_extended() {
        assert_eq!(decode_integer(&[0x01]), Some(1));
        assert_eq!(decode_integer(&[0x06, 0xa5]), Some(1701));
        assert_eq!(decode_integer(&[0xff]), Some(-1));
        assert_eq!(decode_integer(&[0x00, 0x80]), Some(128));
        assert_eq!(decode_integer(&[]), None);
        assert_eq!(decode_integer(&[0; 9]), None);
    }

    #[test]
    fn single_tlv_requires_exact_fit() {
        assert!(single_tlv(&[0x0c, 0x01, b'a']).is_some());
        assert!(single_tlv(&[0x0c, 0x01, b'a', 0x00]).is_none());
        assert!(single_tlv(&[0x0c, 0x05, b'a']).is_none());
    }
}
