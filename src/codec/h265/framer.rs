use crate::error::{DecodeError, Result};

/// Splits a length-prefixed access unit into NAL units.
///
/// Each unit is preceded by a big-endian length of `length_size` bytes.
/// Trailing data shorter than a length field is ignored. A length that runs
/// past the end of the buffer yields a single error and ends iteration.
pub struct LengthPrefixedNals<'a> {
    data: &'a [u8],
    offset: usize,
    length_size: usize,
    failed: bool,
}

impl<'a> LengthPrefixedNals<'a> {
    pub fn new(data: &'a [u8], length_size: u8) -> Self {
        Self {
            data,
            offset: 0,
            length_size: length_size as usize,
            failed: false,
        }
    }
}

impl<'a> Iterator for LengthPrefixedNals<'a> {
    type Item = Result<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.length_size == 0 {
            return None;
        }
        if self.offset + self.length_size > self.data.len() {
            return None;
        }

        let nal_size = self.data[self.offset..self.offset + self.length_size]
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | *byte as usize);
        let start = self.offset + self.length_size;

        if start + nal_size > self.data.len() {
            self.failed = true;
            return Some(Err(DecodeError::Format(format!(
                "Buffer underrun in NAL ({} > {})",
                start + nal_size,
                self.data.len()
            ))));
        }

        self.offset = start + nal_size;
        Some(Ok(&self.data[start..start + nal_size]))
    }
}

/// Prefixes every unit with its length, the inverse of [`LengthPrefixedNals`].
#[cfg(test)]
pub(crate) fn write_length_prefixed(nals: &[&[u8]], length_size: u8) -> Vec<u8> {
    let length_size = length_size as usize;
    let mut out = Vec::with_capacity(nals.iter().map(|nal| nal.len() + length_size).sum());
    for nal in nals {
        let len = (nal.len() as u32).to_be_bytes();
        out.extend_from_slice(&len[4 - length_size..]);
        out.extend_from_slice(nal);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn test_split_four_byte_lengths() {
        let data = [
            0x00, 0x00, 0x00, 0x03, 0x40, 0x01, 0x0C, //
            0x00, 0x00, 0x00, 0x02, 0x26, 0x01,
        ];
        let nals: Vec<&[u8]> = LengthPrefixedNals::new(&data, 4)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(nals, vec![&[0x40, 0x01, 0x0C][..], &[0x26, 0x01][..]]);
    }

    #[test]
    fn test_trailing_partial_length_is_ignored() {
        let data = [0x00, 0x02, 0x26, 0x01, 0x00];
        let nals: Vec<&[u8]> = LengthPrefixedNals::new(&data, 2)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(nals, vec![&[0x26, 0x01][..]]);
    }

    #[test]
    fn test_overflowing_length_is_an_error() {
        let data = [0x00, 0x00, 0x00, 0x10, 0x26, 0x01];
        let mut iter = LengthPrefixedNals::new(&data, 4);
        assert!(matches!(iter.next(), Some(Err(DecodeError::Format(_)))));
        assert!(iter.next().is_none());
    }

    #[quickcheck]
    fn prop_length_prefixed_round_trip(nals: Vec<Vec<u8>>, size: u8) -> bool {
        let length_size = size % 4 + 1;
        let limit = if length_size == 1 { 255 } else { 4096 };
        let nals: Vec<Vec<u8>> = nals
            .into_iter()
            .map(|mut nal| {
                nal.truncate(limit);
                nal
            })
            .collect();
        let refs: Vec<&[u8]> = nals.iter().map(|nal| nal.as_slice()).collect();
        let data = write_length_prefixed(&refs, length_size);

        let split: Result<Vec<&[u8]>> = LengthPrefixedNals::new(&data, length_size).collect();
        matches!(split, Ok(split) if split == refs)
    }

    #[quickcheck]
    fn prop_overflow_never_panics(data: Vec<u8>, size: u8) -> bool {
        let length_size = size % 4 + 1;
        let mut total = 0usize;
        for nal in LengthPrefixedNals::new(&data, length_size) {
            match nal {
                Ok(nal) => total += nal.len() + length_size as usize,
                Err(_) => return total < data.len(),
            }
        }
        total <= data.len()
    }
}
